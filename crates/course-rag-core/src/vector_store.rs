//! Dual-index semantic store.
//!
//! [`VectorStore`] combines an [`Embedder`] with an [`IndexStore`] and
//! implements the retrieval operations the rest of the system uses:
//! loading courses, fuzzy course-name resolution against the catalog,
//! and filtered semantic search over the content index.
//!
//! # Course-name resolution
//!
//! A partial name ("testing", "MCP course") is embedded and compared with
//! the catalog vectors (embeddings of course titles). The nearest title
//! wins if its cosine similarity reaches the configured threshold;
//! otherwise the name does not resolve.
//!
//! # Embedding model
//!
//! The first write records the embedder's model name and width in the
//! index. Every later operation checks the configured embedder against
//! that record and fails with [`RagError::Storage`] on a mismatch, since
//! vectors from different models cannot be compared. Clearing the index
//! forgets the record.

use std::collections::HashMap;
use std::sync::Arc;

use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::models::{
    CatalogEntry, CatalogStats, Chunk, ChunkEmbedding, CourseMetadata, CourseOutline, SearchHit,
};
use crate::store::{ContentFilter, IndexStore, IndexedModel};

/// Default number of hits returned by [`VectorStore::search`].
pub const DEFAULT_MAX_RESULTS: usize = 5;

/// Default minimum similarity for course-name resolution.
pub const DEFAULT_COURSE_MATCH_THRESHOLD: f32 = 0.35;

/// Result of a content search.
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    /// Ranked hits, possibly empty.
    Hits(Vec<SearchHit>),
    /// The course filter did not resolve to any catalog entry.
    CourseNotFound(String),
}

/// Parameters for [`VectorStore::search`].
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub course_name: Option<String>,
    pub lesson_number: Option<u32>,
    /// Falls back to the store's `max_results`.
    pub limit: Option<usize>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn course(mut self, name: impl Into<String>) -> Self {
        self.course_name = Some(name.into());
        self
    }

    pub fn lesson(mut self, number: u32) -> Self {
        self.lesson_number = Some(number);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

pub struct VectorStore {
    store: Arc<dyn IndexStore>,
    embedder: Arc<dyn Embedder>,
    max_results: usize,
    course_match_threshold: f32,
}

impl VectorStore {
    pub fn new(store: Arc<dyn IndexStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            max_results: DEFAULT_MAX_RESULTS,
            course_match_threshold: DEFAULT_COURSE_MATCH_THRESHOLD,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    pub fn with_course_match_threshold(mut self, threshold: f32) -> Self {
        self.course_match_threshold = threshold;
        self
    }

    fn configured_model(&self) -> IndexedModel {
        IndexedModel {
            model: self.embedder.model_name().to_string(),
            dims: self.embedder.dims(),
        }
    }

    /// Fail if the index was built with a different embedder.
    ///
    /// Returns `true` when the index has no recorded model yet.
    async fn check_indexed_model(&self) -> Result<bool> {
        let configured = self.configured_model();
        match self.store.indexed_model().await? {
            None => Ok(true),
            Some(recorded) if recorded == configured => Ok(false),
            Some(recorded) => Err(RagError::Storage(format!(
                "index was built with embedding model '{}' ({} dims) but '{}' ({} dims) is configured; \
                 re-ingest with --clear",
                recorded.model, recorded.dims, configured.model, configured.dims
            ))),
        }
    }

    fn check_width(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.embedder.dims() {
            return Err(RagError::Embedding(format!(
                "model '{}' returned a {}-dim vector, expected {}",
                self.embedder.model_name(),
                vector.len(),
                self.embedder.dims()
            )));
        }
        Ok(())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.embedder.embed_one(text).await?;
        self.check_width(&vector)?;
        Ok(vector)
    }

    /// Load one course into both indexes, replacing any previous version.
    ///
    /// All embeddings are computed before the store is touched, so an
    /// embedding failure leaves the previous state intact. Returns the
    /// number of chunks stored.
    pub async fn upsert_course(&self, metadata: CourseMetadata, chunks: Vec<Chunk>) -> Result<usize> {
        if let Some(stray) = chunks.iter().find(|c| c.course_title != metadata.title) {
            return Err(RagError::Storage(format!(
                "chunk belongs to '{}', not '{}'",
                stray.course_title, metadata.title
            )));
        }

        let unrecorded = self.check_indexed_model().await?;

        let mut texts = Vec::with_capacity(chunks.len() + 1);
        texts.push(metadata.title.clone());
        texts.extend(chunks.iter().map(|c| c.content.clone()));

        let mut vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "expected {} vectors, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        for v in &vectors {
            self.check_width(v)?;
        }

        let chunk_vectors = vectors.split_off(1);
        let title_vector = vectors.pop().unwrap_or_default();

        if unrecorded {
            self.store.set_indexed_model(&self.configured_model()).await?;
        }

        let count = chunks.len();
        let embedded = chunks
            .into_iter()
            .zip(chunk_vectors)
            .map(|(chunk, vector)| ChunkEmbedding { chunk, vector })
            .collect();

        self.store
            .replace_course(
                CatalogEntry {
                    metadata,
                    vector: title_vector,
                },
                embedded,
            )
            .await?;
        Ok(count)
    }

    /// Resolve a partial course name to a stored title.
    ///
    /// Returns [`RagError::NotFound`] for blank input (without calling the
    /// embedder), an empty catalog, or a best match below the threshold,
    /// and [`RagError::Storage`] when the index belongs to another embedder.
    pub async fn resolve_course_name(&self, partial: &str) -> Result<String> {
        let name = partial.trim();
        if name.is_empty() {
            return Err(RagError::NotFound(partial.to_string()));
        }

        self.check_indexed_model().await?;
        let query_vec = self.embed_query(name).await?;
        match self.store.nearest_course(&query_vec).await? {
            Some(m) if m.similarity >= self.course_match_threshold => Ok(m.metadata.title),
            _ => Err(RagError::NotFound(partial.to_string())),
        }
    }

    /// Semantic search over the content index.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchOutcome> {
        self.check_indexed_model().await?;
        let course_title = match request.course_name.as_deref() {
            Some(name) => match self.resolve_course_name(name).await {
                Ok(title) => Some(title),
                Err(RagError::NotFound(_)) => {
                    return Ok(SearchOutcome::CourseNotFound(name.to_string()))
                }
                Err(e) => return Err(e),
            },
            None => None,
        };

        let filter = ContentFilter {
            course_title,
            lesson_number: request.lesson_number,
        };
        let limit = request.limit.unwrap_or(self.max_results);

        let query_vec = self.embed_query(&request.query).await?;
        let scored = self.store.nearest_chunks(&query_vec, &filter, limit).await?;

        let mut courses: HashMap<String, Option<CourseMetadata>> = HashMap::new();
        let mut hits = Vec::with_capacity(scored.len());
        for s in scored {
            if !courses.contains_key(&s.chunk.course_title) {
                let meta = self.store.get_course(&s.chunk.course_title).await?;
                courses.insert(s.chunk.course_title.clone(), meta);
            }
            let meta = courses.get(&s.chunk.course_title).and_then(Option::as_ref);
            let lesson_link = meta
                .zip(s.chunk.lesson_number)
                .and_then(|(m, n)| m.lesson(n))
                .and_then(|l| l.link.clone());

            hits.push(SearchHit {
                course_link: meta.and_then(|m| m.link.clone()),
                lesson_link,
                content: s.chunk.content,
                course_title: s.chunk.course_title,
                lesson_number: s.chunk.lesson_number,
                chunk_index: s.chunk.chunk_index,
                distance: s.distance,
            });
        }

        Ok(SearchOutcome::Hits(hits))
    }

    /// Resolve `name` and return its outline.
    pub async fn course_outline(&self, name: &str) -> Result<CourseOutline> {
        let title = self.resolve_course_name(name).await?;
        self.store
            .get_course(&title)
            .await?
            .map(CourseOutline::from)
            .ok_or(RagError::NotFound(title))
    }

    pub async fn course_titles(&self) -> Result<Vec<String>> {
        self.store.course_titles().await
    }

    pub async fn catalog_stats(&self) -> Result<CatalogStats> {
        let course_titles = self.store.course_titles().await?;
        Ok(CatalogStats {
            total_courses: course_titles.len(),
            course_titles,
        })
    }

    pub async fn course_count(&self) -> Result<usize> {
        self.store.course_count().await
    }

    pub async fn chunk_count(&self) -> Result<usize> {
        self.store.chunk_count().await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }
}
