//! # Course RAG
//!
//! Question answering over course materials. Course documents are parsed
//! into lessons and chunks, embedded into two indexes (a course catalog and
//! the chunk content), and queried by a language model that decides for
//! itself when to call the search or outline tool.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌─────────────┐   ┌────────────────┐
//! │  Folder   │──▶│  Document   │──▶│  Vector Store  │
//! │ .txt/.md  │   │  Processor  │   │ catalog+chunks │
//! └───────────┘   └─────────────┘   └──────┬─────────┘
//!                                          │ tools
//!                 ┌─────────┐   ┌──────────┴───┐   ┌───────────┐
//!                 │ Session │◀─▶│ Orchestrator │◀─▶│ Generator │
//!                 └─────────┘   └──────┬───────┘   └───────────┘
//!                                ┌─────┴─────┐
//!                                ▼           ▼
//!                           ┌───────┐   ┌────────┐
//!                           │  CLI  │   │  HTTP  │
//!                           └───────┘   └────────┘
//! ```
//!
//! Storage-independent logic lives in the `course-rag-core` crate; this
//! crate adds SQLite persistence, the HTTP providers, the tools, the
//! orchestrator and the outer surfaces.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | SQLite connection and schema |
//! | [`sqlite_store`] | Persistent index backend |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Generative model providers |
//! | [`tools`] | Tool trait, registry, search and outline tools |
//! | [`orchestrator`] | Two-phase query protocol |
//! | [`ingest`] | Folder loading |
//! | [`rag`] | The assembled system |
//! | [`server`] | HTTP API |
//! | [`commands`] | CLI command runners |

pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod ingest;
pub mod llm;
pub mod orchestrator;
pub mod rag;
pub mod server;
pub mod sqlite_store;
pub mod tools;
