//! The query-answering system as one explicitly constructed value.
//!
//! [`RagSystem`] owns the vector store, the tool registry, the session
//! store and the generator. Nothing lives in module-level state, so tests
//! and the server can build as many independent systems as they like.

use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use course_rag_core::document::DocumentProcessor;
use course_rag_core::embedding::Embedder;
use course_rag_core::models::{CatalogStats, CourseOutline, SourceRef};
use course_rag_core::session::SessionStore;
use course_rag_core::store::memory::MemoryIndexStore;
use course_rag_core::store::IndexStore;
use course_rag_core::vector_store::VectorStore;
use course_rag_core::Result;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::ingest::{self, IngestReport};
use crate::llm::{create_generator, Generator};
use crate::orchestrator::Orchestrator;
use crate::sqlite_store::SqliteIndexStore;
use crate::tools::ToolRegistry;

/// Response to one query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryAnswer {
    pub answer: String,
    /// Source labels, in citation order.
    pub sources: Vec<String>,
    /// Course and lesson links for each entry of `sources`.
    pub source_links: Vec<SourceRef>,
    pub session_id: String,
}

/// Open the index backend named in `[store]`.
pub async fn open_index_store(config: &Config) -> anyhow::Result<Arc<dyn IndexStore>> {
    match config.store.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryIndexStore::new())),
        _ => {
            let pool = crate::db::connect(&config.store.path).await?;
            Ok(Arc::new(SqliteIndexStore::new(pool)))
        }
    }
}

/// Vector store over `index`, tuned by `[retrieval]`.
pub fn vector_store(
    config: &Config,
    index: Arc<dyn IndexStore>,
    embedder: Arc<dyn Embedder>,
) -> VectorStore {
    VectorStore::new(index, embedder)
        .with_max_results(config.retrieval.max_results)
        .with_course_match_threshold(config.retrieval.course_match_threshold)
}

/// Open the configured index and embedder without a generator.
///
/// Enough for ingestion and catalog reads, which never call the model.
pub async fn open_vector_store(config: &Config) -> anyhow::Result<VectorStore> {
    let index = open_index_store(config).await?;
    let embedder = create_embedder(&config.embedding).context("Failed to create embedder")?;
    Ok(vector_store(config, index, embedder))
}

pub fn document_processor(config: &Config) -> DocumentProcessor {
    DocumentProcessor::new(config.chunking.chunk_size, config.chunking.chunk_overlap)
}

pub struct RagSystem {
    store: Arc<VectorStore>,
    sessions: SessionStore,
    orchestrator: Orchestrator,
    processor: DocumentProcessor,
}

impl RagSystem {
    /// Assemble a system from already-built parts.
    pub fn new(
        config: &Config,
        index: Arc<dyn IndexStore>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        let store = Arc::new(vector_store(config, index, embedder));
        let tools = Arc::new(ToolRegistry::with_builtins(store.clone()));
        Self {
            orchestrator: Orchestrator::new(
                generator,
                tools,
                Duration::from_secs(config.generation.timeout_secs),
            ),
            sessions: SessionStore::new(config.session.max_history),
            processor: document_processor(config),
            store,
        }
    }

    /// Build every part from configuration.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let index = open_index_store(config).await?;
        let embedder = create_embedder(&config.embedding).context("Failed to create embedder")?;
        let generator =
            create_generator(&config.generation).context("Failed to create generator")?;
        Ok(Self::new(config, index, embedder, generator))
    }

    pub fn vector_store(&self) -> &VectorStore {
        &self.store
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Answer `query` within a session.
    ///
    /// Without `session_id` a new session is allocated. The exchange is
    /// recorded only when an answer is produced; a failed query leaves the
    /// session as it was.
    pub async fn query(&self, query: &str, session_id: Option<&str>) -> Result<QueryAnswer> {
        let session_id = match session_id {
            Some(id) => id.to_string(),
            None => self.sessions.create_session(),
        };
        let history = self.sessions.history(&session_id);

        let answer = self.orchestrator.run(query, history.as_deref()).await?;

        self.sessions.add_exchange(&session_id, query, &answer.text);
        Ok(QueryAnswer {
            answer: answer.text,
            sources: answer.sources,
            source_links: answer.source_links,
            session_id,
        })
    }

    /// Load every course document under `path`.
    pub async fn load_folder(&self, path: &Path, clear_existing: bool) -> Result<IngestReport> {
        ingest::load_folder(&self.store, &self.processor, path, clear_existing).await
    }

    pub async fn catalog_stats(&self) -> Result<CatalogStats> {
        self.store.catalog_stats().await
    }

    pub async fn course_outline(&self, name: &str) -> Result<CourseOutline> {
        self.store.course_outline(name).await
    }
}
