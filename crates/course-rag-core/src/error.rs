//! Error taxonomy shared by every layer of Course RAG.
//!
//! | Variant | Raised by | Propagation |
//! |---------|-----------|-------------|
//! | [`RagError::Parse`] | document processor | per file, ingestion continues |
//! | [`RagError::NotFound`] | course-name resolution | distinguishable "no such course" |
//! | [`RagError::UnknownTool`] | tool registry | degraded answer |
//! | [`RagError::InvalidArguments`] | tool argument decoding | degraded answer |
//! | [`RagError::Embedding`] | embedding providers | fatal to the current operation |
//! | [`RagError::Generation`] | language-model providers | fatal to the current query |
//! | [`RagError::Storage`] | index backends | fatal to the current operation |

use thiserror::Error;

/// Result alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Course not found: {0}")]
    NotFound(String),

    #[error("Tool '{0}' not found")]
    UnknownTool(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    /// True for failures of an external service (embedding or generation).
    ///
    /// These abort a query instead of degrading it.
    pub fn is_external(&self) -> bool {
        matches!(self, RagError::Embedding(_) | RagError::Generation(_))
    }
}
