//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/query` | Answer a question within a session |
//! | `GET`  | `/api/courses` | Course count and titles |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! A query answer looks like:
//!
//! ```json
//! {
//!   "answer": "...",
//!   "sources": ["Intro to Testing - Lesson 1"],
//!   "source_links": [{ "label": "Intro to Testing - Lesson 1",
//!                      "course_link": "https://...", "lesson_link": "https://..." }],
//!   "session_id": "..."
//! }
//! ```
//!
//! # Error Contract
//!
//! All error responses share one envelope:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `upstream` (502),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser frontend
//! served from another origin can call the API.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use course_rag_core::models::CatalogStats;
use course_rag_core::RagError;

use crate::config::Config;
use crate::rag::{QueryAnswer, RagSystem};

/// Build the router over a shared system.
pub fn build_router(system: Arc<RagSystem>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/query", post(handle_query))
        .route("/api/courses", get(handle_courses))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(system)
}

/// Start the server on `[server].bind`.
///
/// When `[ingest].docs_path` names an existing folder it is loaded once
/// before the listener binds. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let system = Arc::new(RagSystem::from_config(config).await?);

    if let Some(docs) = config.ingest.docs_path.as_deref() {
        if docs.is_dir() {
            let report = system.load_folder(docs, false).await?;
            tracing::info!(
                path = %docs.display(),
                courses = report.courses_added,
                chunks = report.chunks_added,
                "loaded initial documents"
            );
        } else {
            tracing::warn!(path = %docs.display(), "docs_path does not exist; starting empty");
        }
    }

    let app = build_router(system);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"upstream"`).
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let (status, code) = match &err {
            RagError::Generation(_) | RagError::Embedding(_) => (StatusCode::BAD_GATEWAY, "upstream"),
            RagError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    session_id: Option<String>,
}

async fn handle_query(
    State(system): State<Arc<RagSystem>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryAnswer>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let answer = system.query(&req.query, req.session_id.as_deref()).await?;
    Ok(Json(answer))
}

// ============ GET /api/courses ============

async fn handle_courses(
    State(system): State<Arc<RagSystem>>,
) -> Result<Json<CatalogStats>, AppError> {
    Ok(Json(system.catalog_stats().await?))
}
