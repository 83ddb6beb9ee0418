//! # Course RAG Core
//!
//! Pure retrieval logic for Course RAG: data models, document parsing and
//! chunking, the embedding trait, index storage abstraction, the dual-index
//! vector store, and session history.
//!
//! This crate contains no tokio runtime, sqlx, HTTP clients, or
//! filesystem walking. Those live in the `course-rag` app crate.

pub mod chunk;
pub mod document;
pub mod embedding;
pub mod error;
pub mod models;
pub mod session;
pub mod store;
pub mod vector_store;

pub use error::{RagError, Result};
