//! Folder ingestion.
//!
//! Walks a folder for `.txt` and `.md` course documents in sorted path
//! order, parses each one and loads it into the vector store. A file that
//! cannot be read, parsed or embedded is recorded as a failure and the walk
//! continues; reloading a course replaces its previous chunks.

use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use course_rag_core::document::DocumentProcessor;
use course_rag_core::vector_store::VectorStore;
use course_rag_core::{RagError, Result};

const EXTENSIONS: &[&str] = &["txt", "md"];

/// One file that could not be loaded.
#[derive(Debug, Clone, Serialize)]
pub struct IngestFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of [`load_folder`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub courses_added: usize,
    pub chunks_added: usize,
    pub failures: Vec<IngestFailure>,
}

/// Course documents under `root`, sorted.
pub fn discover(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(RagError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("course folder does not exist: {}", root.display()),
        )));
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// Load every course document under `root`.
///
/// With `clear_existing`, both indexes are emptied first.
///
/// # Errors
///
/// Only when `root` is not a folder or clearing the store fails; per-file
/// problems land in [`IngestReport::failures`].
pub async fn load_folder(
    store: &VectorStore,
    processor: &DocumentProcessor,
    root: &Path,
    clear_existing: bool,
) -> Result<IngestReport> {
    let paths = discover(root)?;

    if clear_existing {
        store.clear().await?;
        tracing::info!("cleared existing course data");
    }

    let mut report = IngestReport::default();
    for path in paths {
        match load_file(store, processor, &path).await {
            Ok((title, chunks)) => {
                tracing::debug!(path = %path.display(), course = %title, chunks, "loaded course");
                report.courses_added += 1;
                report.chunks_added += chunks;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping file");
                report.failures.push(IngestFailure {
                    path,
                    error: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        courses = report.courses_added,
        chunks = report.chunks_added,
        failures = report.failures.len(),
        "ingestion finished"
    );
    Ok(report)
}

async fn load_file(
    store: &VectorStore,
    processor: &DocumentProcessor,
    path: &Path,
) -> Result<(String, usize)> {
    let bytes = tokio::fs::read(path).await?;
    let text = String::from_utf8_lossy(&bytes);
    let parsed = processor.process(&text)?;
    let title = parsed.metadata.title.clone();
    let chunks = store.upsert_course(parsed.metadata, parsed.chunks).await?;
    Ok((title, chunks))
}
