//! Core data models used throughout Course RAG.
//!
//! These types represent the courses, lessons, chunks, and search hits
//! that flow through the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};

/// A lesson inside a course document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonMetadata {
    pub number: u32,
    pub title: String,
    pub link: Option<String>,
}

/// Course-level metadata parsed from a document header.
///
/// The title is the course's identity: reingesting a document with the
/// same title replaces everything previously stored for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseMetadata {
    pub title: String,
    pub instructor: Option<String>,
    pub link: Option<String>,
    pub lessons: Vec<LessonMetadata>,
}

impl CourseMetadata {
    /// Look up a lesson by number.
    pub fn lesson(&self, number: u32) -> Option<&LessonMetadata> {
        self.lessons.iter().find(|l| l.number == number)
    }
}

/// A bounded span of course text, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub course_title: String,
    /// `None` for text that precedes the first lesson marker.
    pub lesson_number: Option<u32>,
    /// Contiguous from 0 within `(course_title, lesson_number)`.
    pub chunk_index: u32,
    pub content: String,
}

/// A chunk together with its embedding vector, as held by the content index.
#[derive(Debug, Clone)]
pub struct ChunkEmbedding {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// One catalog index entry per course, keyed by title.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub metadata: CourseMetadata,
    /// Embedding of the course title.
    pub vector: Vec<f32>,
}

/// A ranked chunk returned by [`VectorStore::search`](crate::vector_store::VectorStore::search).
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub content: String,
    pub course_title: String,
    pub lesson_number: Option<u32>,
    pub chunk_index: u32,
    /// Cosine distance to the query (`1 - similarity`); lower is closer.
    pub distance: f32,
    pub course_link: Option<String>,
    pub lesson_link: Option<String>,
}

impl SearchHit {
    /// Human-readable source label for this hit.
    pub fn label(&self) -> String {
        source_label(&self.course_title, self.lesson_number)
    }
}

/// A source label with the links a client can render for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRef {
    pub label: String,
    pub course_link: Option<String>,
    pub lesson_link: Option<String>,
}

impl From<&SearchHit> for SourceRef {
    fn from(hit: &SearchHit) -> Self {
        Self {
            label: hit.label(),
            course_link: hit.course_link.clone(),
            lesson_link: hit.lesson_link.clone(),
        }
    }
}

/// Format `"<course> - Lesson <n>"`, or just the course title without a lesson.
pub fn source_label(course_title: &str, lesson_number: Option<u32>) -> String {
    match lesson_number {
        Some(n) => format!("{} - Lesson {}", course_title, n),
        None => course_title.to_string(),
    }
}

/// Structured course outline served by the outline tool and the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct CourseOutline {
    pub title: String,
    pub link: Option<String>,
    pub instructor: Option<String>,
    pub lessons: Vec<LessonMetadata>,
}

impl From<CourseMetadata> for CourseOutline {
    fn from(meta: CourseMetadata) -> Self {
        Self {
            title: meta.title,
            link: meta.link,
            instructor: meta.instructor,
            lessons: meta.lessons,
        }
    }
}

/// Catalog analytics: how many courses are loaded and their titles.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogStats {
    pub total_courses: usize,
    pub course_titles: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_with_lesson() {
        assert_eq!(
            source_label("Intro to Testing", Some(1)),
            "Intro to Testing - Lesson 1"
        );
    }

    #[test]
    fn test_label_without_lesson() {
        assert_eq!(source_label("Intro to Testing", None), "Intro to Testing");
    }
}
