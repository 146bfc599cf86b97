//! HTTP server.
//!
//! Exposes uploads, question answering, and session management as a JSON
//! HTTP API built on axum.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload` | Raw body; `file-name` header required, `session-id` optional |
//! | `POST` | `/query` | `{"query": "..."}` → answer plus sources (alias `/rag`) |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/sessions/{id}` | Session files and expiry |
//! | `POST` | `/sessions/{id}/reindex` | Re-ingest every file of a session |
//! | `DELETE` | `/documents/{key}` | Delete a document and its index entries |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `no_context` (404),
//! `upstream_error` (502), `unavailable` (503), `timeout` (504).
//! Server-side failures carry a generic message; the detail is only logged.
//! A disabled embedding or completion provider is reported as `unavailable`.
//! Upload bodies over `server.max_upload_bytes` are refused with 413 by the
//! body-limit layer before any handler runs.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front ends
//! can upload and query directly.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use docrag_core::models::IngestResult;
use docrag_core::RagError;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::services::Services;
use crate::upload::UploadReceipt;

/// Header carrying the uploaded file's name.
pub const FILE_NAME_HEADER: &str = "file-name";
/// Header carrying the session to append an upload to.
pub const SESSION_ID_HEADER: &str = "session-id";

type AppState = Arc<Services>;

/// Build services from `config` and serve until Ctrl-C.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let services = Arc::new(Services::from_config(config).await?);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("docrag server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(services))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}

/// The application router over already-built services.
pub fn router(services: Arc<Services>) -> Router {
    let max_upload = services.config.server.max_upload_bytes;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/upload", post(handle_upload))
        .route("/query", post(handle_query))
        .route("/rag", post(handle_query))
        .route("/health", get(handle_health))
        .route("/sessions/{id}", get(handle_get_session))
        .route("/sessions/{id}/reindex", post(handle_reindex))
        .route("/documents/{key}", delete(handle_delete_document))
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(services)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
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
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::InvalidInput(_)
            | RagError::Decode { .. }
            | RagError::DimensionMismatch { .. } => bad_request(err.to_string()),
            RagError::NotFound(_) => AppError::new(StatusCode::NOT_FOUND, "not_found", err.to_string()),
            RagError::NoContext => {
                AppError::new(StatusCode::NOT_FOUND, "no_context", err.to_string())
            }
            RagError::ProviderTimeout { .. } => {
                tracing::error!(error = %err, "request failed");
                AppError::new(
                    StatusCode::GATEWAY_TIMEOUT,
                    "timeout",
                    "an upstream service timed out",
                )
            }
            RagError::InvalidConfiguration(_) => {
                tracing::error!(error = %err, "request failed");
                AppError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "unavailable",
                    "the server is not configured for this operation",
                )
            }
            RagError::StoreUnavailable(_) => {
                tracing::error!(error = %err, "request failed");
                AppError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "unavailable",
                    "storage is temporarily unavailable",
                )
            }
            RagError::Provider { .. }
            | RagError::EmbeddingFailed { .. }
            | RagError::CompletionFailed(_) => {
                tracing::error!(error = %err, "request failed");
                AppError::new(
                    StatusCode::BAD_GATEWAY,
                    "upstream_error",
                    "an upstream provider failed",
                )
            }
        }
    }
}

// ============ POST /upload ============

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, AppError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|s| Some(s.trim()))
            .map_err(|_| bad_request(format!("header '{}' is not valid text", name))),
    }
}

async fn handle_upload(
    State(services): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadReceipt>, AppError> {
    let file_name = header_str(&headers, FILE_NAME_HEADER)?
        .filter(|s| !s.is_empty())
        .ok_or_else(|| bad_request("missing 'file-name' header"))?;
    let session_id = header_str(&headers, SESSION_ID_HEADER)?.filter(|s| !s.is_empty());

    let receipt = services
        .uploads
        .upload(file_name, body.to_vec(), session_id)
        .await?;
    Ok(Json(receipt))
}

// ============ POST /query ============

#[derive(Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Serialize)]
pub struct QueryResponse {
    pub response: String,
    pub sources: Vec<SourceRef>,
}

#[derive(Serialize)]
pub struct SourceRef {
    pub document_key: Option<String>,
    pub chunk_index: Option<u64>,
    pub distance: f32,
}

async fn handle_query(
    State(services): State<AppState>,
    req: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError> {
    let Json(req) = req.map_err(|e| bad_request(e.body_text()))?;
    let result = services.queries.answer(&req.query).await?;
    Ok(Json(QueryResponse {
        response: result.text,
        sources: result
            .supporting_chunks
            .into_iter()
            .map(|c| SourceRef {
                document_key: c.document_key,
                chunk_index: c.chunk_index,
                distance: c.distance,
            })
            .collect(),
    }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ Sessions ============

#[derive(Serialize)]
struct SessionResponse {
    session_id: String,
    files: Vec<String>,
    uploaded_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    expired: bool,
}

async fn handle_get_session(
    State(services): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = services.uploads.session(&id).await?;
    let expired = session.is_expired(Utc::now());
    Ok(Json(SessionResponse {
        session_id: session.session_id,
        files: session.files,
        uploaded_at: session.uploaded_at,
        expires_at: session.expires_at,
        expired,
    }))
}

#[derive(Serialize)]
struct ReindexResponse {
    session_id: String,
    documents: Vec<IngestResult>,
}

async fn handle_reindex(
    State(services): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReindexResponse>, AppError> {
    let report = services.uploads.reindex_session(&id).await?;
    Ok(Json(ReindexResponse {
        session_id: report.session_id,
        documents: report.documents,
    }))
}

// ============ DELETE /documents/{key} ============

#[derive(Serialize)]
struct DeleteResponse {
    document_key: String,
    removed_entries: usize,
}

async fn handle_delete_document(
    State(services): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let removed_entries = services.uploads.remove_document(&key).await?;
    Ok(Json(DeleteResponse {
        document_key: key,
        removed_entries,
    }))
}
