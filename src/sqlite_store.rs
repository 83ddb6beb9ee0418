//! SQLite-backed [`IndexStore`].
//!
//! Vectors are stored as little-endian f32 BLOBs and scored in Rust with
//! a brute-force cosine scan. Filters are pushed down into SQL so only
//! candidate rows are decoded.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use course_rag_core::embedding::{blob_to_vec, cosine_distance, cosine_similarity, vec_to_blob};
use course_rag_core::models::{CatalogEntry, Chunk, ChunkEmbedding, CourseMetadata, LessonMetadata};
use course_rag_core::store::{
    rank_chunks, CatalogMatch, ContentFilter, IndexStore, IndexedModel, ScoredChunk,
};
use course_rag_core::{RagError, Result};

/// SQLite implementation of [`IndexStore`] over the `courses` and `chunks` tables.
pub struct SqliteIndexStore {
    pool: SqlitePool,
}

impl SqliteIndexStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn storage(e: impl std::fmt::Display) -> RagError {
    RagError::Storage(e.to_string())
}

fn course_from_row(row: &SqliteRow) -> Result<CourseMetadata> {
    let lessons_json: String = row.try_get("lessons_json").map_err(storage)?;
    let lessons: Vec<LessonMetadata> = serde_json::from_str(&lessons_json).map_err(storage)?;
    Ok(CourseMetadata {
        title: row.try_get("title").map_err(storage)?,
        instructor: row.try_get("instructor").map_err(storage)?,
        link: row.try_get("link").map_err(storage)?,
        lessons,
    })
}

#[async_trait]
impl IndexStore for SqliteIndexStore {
    async fn replace_course(
        &self,
        entry: CatalogEntry,
        chunks: Vec<ChunkEmbedding>,
    ) -> Result<()> {
        let meta = &entry.metadata;
        let lessons_json = serde_json::to_string(&meta.lessons).map_err(storage)?;

        let mut tx = self.pool.begin().await.map_err(storage)?;

        sqlx::query("DELETE FROM chunks WHERE course_title = ?")
            .bind(&meta.title)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        sqlx::query(
            r#"
            INSERT INTO courses (title, instructor, link, lessons_json, embedding)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(title) DO UPDATE SET
                instructor = excluded.instructor,
                link = excluded.link,
                lessons_json = excluded.lessons_json,
                embedding = excluded.embedding
            "#,
        )
        .bind(&meta.title)
        .bind(&meta.instructor)
        .bind(&meta.link)
        .bind(&lessons_json)
        .bind(vec_to_blob(&entry.vector))
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        for ce in &chunks {
            sqlx::query(
                "INSERT INTO chunks (course_title, lesson_number, chunk_index, content, embedding) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&ce.chunk.course_title)
            .bind(ce.chunk.lesson_number.map(i64::from))
            .bind(i64::from(ce.chunk.chunk_index))
            .bind(&ce.chunk.content)
            .bind(vec_to_blob(&ce.vector))
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn nearest_course(&self, query_vec: &[f32]) -> Result<Option<CatalogMatch>> {
        let rows = sqlx::query(
            "SELECT title, instructor, link, lessons_json, embedding FROM courses ORDER BY title",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let mut best: Option<CatalogMatch> = None;
        for row in &rows {
            let blob: Vec<u8> = row.try_get("embedding").map_err(storage)?;
            let similarity = cosine_similarity(query_vec, &blob_to_vec(&blob));
            if best.as_ref().is_none_or(|b| similarity > b.similarity) {
                best = Some(CatalogMatch {
                    metadata: course_from_row(row)?,
                    similarity,
                });
            }
        }
        Ok(best)
    }

    async fn nearest_chunks(
        &self,
        query_vec: &[f32],
        filter: &ContentFilter,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let lesson = filter.lesson_number.map(i64::from);
        let rows = sqlx::query(
            r#"
            SELECT course_title, lesson_number, chunk_index, content, embedding
            FROM chunks
            WHERE (? IS NULL OR course_title = ?)
              AND (? IS NULL OR lesson_number = ?)
            "#,
        )
        .bind(&filter.course_title)
        .bind(&filter.course_title)
        .bind(lesson)
        .bind(lesson)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.try_get("embedding").map_err(storage)?;
            let lesson_number: Option<i64> = row.try_get("lesson_number").map_err(storage)?;
            let chunk_index: i64 = row.try_get("chunk_index").map_err(storage)?;
            hits.push(ScoredChunk {
                chunk: Chunk {
                    course_title: row.try_get("course_title").map_err(storage)?,
                    lesson_number: lesson_number.map(|n| n as u32),
                    chunk_index: chunk_index as u32,
                    content: row.try_get("content").map_err(storage)?,
                },
                distance: cosine_distance(query_vec, &blob_to_vec(&blob)),
            });
        }

        rank_chunks(&mut hits);
        hits.truncate(limit);
        Ok(hits)
    }

    async fn get_course(&self, title: &str) -> Result<Option<CourseMetadata>> {
        let row = sqlx::query(
            "SELECT title, instructor, link, lessons_json FROM courses WHERE title = ?",
        )
        .bind(title)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.as_ref().map(course_from_row).transpose()
    }

    async fn course_titles(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT title FROM courses ORDER BY title")
            .fetch_all(&self.pool)
            .await
            .map_err(storage)
    }

    async fn course_count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(n as usize)
    }

    async fn chunk_count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(n as usize)
    }

    async fn indexed_model(&self) -> Result<Option<IndexedModel>> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT model, dims FROM index_model WHERE id = 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;
        Ok(row.map(|(model, dims)| IndexedModel {
            model,
            dims: dims as usize,
        }))
    }

    async fn set_indexed_model(&self, model: &IndexedModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO index_model (id, model, dims) VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET model = excluded.model, dims = excluded.dims
            "#,
        )
        .bind(&model.model)
        .bind(model.dims as i64)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        sqlx::query("DELETE FROM index_model")
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        sqlx::query("DELETE FROM chunks")
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        sqlx::query("DELETE FROM courses")
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        tx.commit().await.map_err(storage)?;
        Ok(())
    }
}
