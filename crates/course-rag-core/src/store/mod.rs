//! Storage abstraction for the two retrieval indexes.
//!
//! The [`IndexStore`] trait holds the **catalog** index (one entry per
//! course, keyed by title) and the **content** index (one entry per
//! chunk). Backends: [`memory::MemoryIndexStore`] here, and the SQLite
//! store in the app crate.
//!
//! Implementations must be `Send + Sync` to be shared across requests.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CatalogEntry, Chunk, ChunkEmbedding, CourseMetadata};

/// Equality filters applied to a content search. Both filters AND together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentFilter {
    pub course_title: Option<String>,
    pub lesson_number: Option<u32>,
}

impl ContentFilter {
    pub fn matches(&self, chunk: &Chunk) -> bool {
        self.course_title
            .as_deref()
            .is_none_or(|t| t == chunk.course_title)
            && self
                .lesson_number
                .is_none_or(|n| chunk.lesson_number == Some(n))
    }
}

/// Best catalog match for a query vector.
#[derive(Debug, Clone)]
pub struct CatalogMatch {
    pub metadata: CourseMetadata,
    pub similarity: f32,
}

/// A content-index hit before link enrichment.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub distance: f32,
}

/// The embedding model an index was built with.
///
/// Vectors from different models (or widths) are not comparable, so the
/// store records the first model that writes to it until it is cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedModel {
    pub model: String,
    pub dims: usize,
}

/// Abstract storage backend for the catalog and content indexes.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`replace_course`](IndexStore::replace_course) | Atomically replace a course in both indexes |
/// | [`nearest_course`](IndexStore::nearest_course) | Best catalog match |
/// | [`nearest_chunks`](IndexStore::nearest_chunks) | Filtered, ranked content search |
/// | [`get_course`](IndexStore::get_course) | Catalog metadata by exact title |
/// | [`course_titles`](IndexStore::course_titles) | Sorted titles |
/// | [`indexed_model`](IndexStore::indexed_model) | Embedding model the vectors came from |
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Replace everything stored under `entry.metadata.title`.
    ///
    /// The old catalog entry and chunks disappear and the new ones appear
    /// in one step; readers never observe a mix.
    async fn replace_course(&self, entry: CatalogEntry, chunks: Vec<ChunkEmbedding>)
        -> Result<()>;

    /// Catalog entry with the highest cosine similarity to `query_vec`.
    async fn nearest_course(&self, query_vec: &[f32]) -> Result<Option<CatalogMatch>>;

    /// Up to `limit` chunks matching `filter`, by ascending cosine distance.
    async fn nearest_chunks(
        &self,
        query_vec: &[f32],
        filter: &ContentFilter,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>>;

    async fn get_course(&self, title: &str) -> Result<Option<CourseMetadata>>;

    /// All course titles, sorted.
    async fn course_titles(&self) -> Result<Vec<String>>;

    async fn course_count(&self) -> Result<usize>;

    async fn chunk_count(&self) -> Result<usize>;

    /// Model recorded by [`set_indexed_model`](IndexStore::set_indexed_model),
    /// or `None` for an index nothing has been written to.
    async fn indexed_model(&self) -> Result<Option<IndexedModel>>;

    async fn set_indexed_model(&self, model: &IndexedModel) -> Result<()>;

    /// Remove every course and chunk, and forget the indexed model.
    async fn clear(&self) -> Result<()>;
}

/// Sort scored chunks by distance, breaking ties by position in the course.
pub fn rank_chunks(hits: &mut [ScoredChunk]) {
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.course_title.cmp(&b.chunk.course_title))
            .then_with(|| a.chunk.lesson_number.cmp(&b.chunk.lesson_number))
            .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
    });
}
