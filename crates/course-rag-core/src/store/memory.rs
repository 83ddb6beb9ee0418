//! In-memory [`IndexStore`] implementation.
//!
//! Both indexes live in one `RwLock`-guarded state, so a course
//! replacement is a single write section. Searches are brute-force cosine
//! scans over every stored vector.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::{cosine_distance, cosine_similarity};
use crate::error::{RagError, Result};
use crate::models::{CatalogEntry, ChunkEmbedding, CourseMetadata};

use super::{rank_chunks, CatalogMatch, ContentFilter, IndexStore, IndexedModel, ScoredChunk};

#[derive(Default)]
struct Indexes {
    catalog: BTreeMap<String, CatalogEntry>,
    content: BTreeMap<String, Vec<ChunkEmbedding>>,
    model: Option<IndexedModel>,
}

/// In-memory store for tests and ephemeral runs (`[store] backend = "memory"`).
#[derive(Default)]
pub struct MemoryIndexStore {
    inner: RwLock<Indexes>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Indexes>> {
        self.inner
            .read()
            .map_err(|_| RagError::Storage("index lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Indexes>> {
        self.inner
            .write()
            .map_err(|_| RagError::Storage("index lock poisoned".to_string()))
    }
}

#[async_trait]
impl IndexStore for MemoryIndexStore {
    async fn replace_course(
        &self,
        entry: CatalogEntry,
        chunks: Vec<ChunkEmbedding>,
    ) -> Result<()> {
        let title = entry.metadata.title.clone();
        let mut indexes = self.write()?;
        indexes.catalog.insert(title.clone(), entry);
        indexes.content.insert(title, chunks);
        Ok(())
    }

    async fn nearest_course(&self, query_vec: &[f32]) -> Result<Option<CatalogMatch>> {
        let indexes = self.read()?;
        let best = indexes
            .catalog
            .values()
            .map(|e| (e, cosine_similarity(query_vec, &e.vector)))
            .fold(None::<(&CatalogEntry, f32)>, |best, (e, sim)| match best {
                Some((_, best_sim)) if best_sim >= sim => best,
                _ => Some((e, sim)),
            });
        Ok(best.map(|(e, similarity)| CatalogMatch {
            metadata: e.metadata.clone(),
            similarity,
        }))
    }

    async fn nearest_chunks(
        &self,
        query_vec: &[f32],
        filter: &ContentFilter,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let indexes = self.read()?;
        let mut hits: Vec<ScoredChunk> = indexes
            .content
            .values()
            .flatten()
            .filter(|ce| filter.matches(&ce.chunk))
            .map(|ce| ScoredChunk {
                chunk: ce.chunk.clone(),
                distance: cosine_distance(query_vec, &ce.vector),
            })
            .collect();
        rank_chunks(&mut hits);
        hits.truncate(limit);
        Ok(hits)
    }

    async fn get_course(&self, title: &str) -> Result<Option<CourseMetadata>> {
        Ok(self.read()?.catalog.get(title).map(|e| e.metadata.clone()))
    }

    async fn course_titles(&self) -> Result<Vec<String>> {
        Ok(self.read()?.catalog.keys().cloned().collect())
    }

    async fn course_count(&self) -> Result<usize> {
        Ok(self.read()?.catalog.len())
    }

    async fn chunk_count(&self) -> Result<usize> {
        Ok(self.read()?.content.values().map(Vec::len).sum())
    }

    async fn indexed_model(&self) -> Result<Option<IndexedModel>> {
        Ok(self.read()?.model.clone())
    }

    async fn set_indexed_model(&self, model: &IndexedModel) -> Result<()> {
        self.write()?.model = Some(model.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut indexes = self.write()?;
        indexes.catalog.clear();
        indexes.content.clear();
        indexes.model = None;
        Ok(())
    }
}
