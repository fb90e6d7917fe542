//! HTTP surface for the single-document session.
//!
//! - `POST /upload` – multipart field `pdf`; replaces the loaded document.
//! - `POST /ask` – `{ "question": "..." }`; answers from the loaded document.
//! - `GET /status` – whether a document is loaded and which one.
//! - `POST /clear` – drops the loaded document.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pdf_rag_core::{RagError, SessionController, SessionStatus};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub fn create_router(session: Arc<SessionController>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/upload", post(upload_pdf))
        .route("/ask", post(ask))
        .route("/status", get(status))
        .route("/clear", post(clear))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(session)
}

pub async fn serve(
    session: Arc<SessionController>,
    bind: SocketAddr,
    max_upload_bytes: usize,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, max_upload_bytes, "http server listening");

    axum::serve(listener, create_router(session, max_upload_bytes))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("http server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for ctrl-c");
    }
}

#[derive(Serialize)]
struct UploadResponse {
    success: bool,
    message: &'static str,
    filename: String,
    pages: usize,
    chunks: usize,
}

/// Validates the upload, spools it to a temporary `.pdf` file and loads it.
/// The temporary file is removed when this handler returns.
async fn upload_pdf(
    State(session): State<Arc<SessionController>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| ApiError::bad_request(format!("Invalid upload: {error}")))?
    {
        if field.name() != Some("pdf") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().trim().to_string();
        validate_pdf_filename(&filename)?;

        let bytes = field
            .bytes()
            .await
            .map_err(|error| ApiError::bad_request(format!("Invalid upload: {error}")))?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) = upload.ok_or_else(|| ApiError::bad_request("No file part"))?;

    let spool = tempfile::Builder::new()
        .prefix("pdf-rag-")
        .suffix(".pdf")
        .tempfile()
        .map_err(|error| ApiError::internal(format!("Failed to store upload: {error}")))?;
    tokio::fs::write(spool.path(), &bytes)
        .await
        .map_err(|error| ApiError::internal(format!("Failed to store upload: {error}")))?;

    let loaded = session.load(spool.path(), &filename).await;
    if let Err(error) = spool.close() {
        warn!(%error, "failed to remove temporary upload");
    }
    let summary = loaded?;

    Ok(Json(UploadResponse {
        success: true,
        message: "PDF processed successfully",
        filename: summary.filename,
        pages: summary.pages,
        chunks: summary.chunks,
    }))
}

fn validate_pdf_filename(filename: &str) -> Result<(), ApiError> {
    if filename.is_empty() {
        return Err(ApiError::bad_request("No file selected"));
    }
    if !filename.to_lowercase().ends_with(".pdf") {
        return Err(ApiError::bad_request("Only PDF files are allowed"));
    }
    Ok(())
}

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

#[derive(Serialize)]
struct AskResponse {
    success: bool,
    answer: String,
}

async fn ask(
    State(session): State<Arc<SessionController>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let Json(request) =
        payload.map_err(|_| ApiError::bad_request("Missing or invalid question"))?;

    let question = request.question.trim();
    if question.is_empty() {
        return Err(ApiError::bad_request("Question cannot be empty"));
    }

    let answer = session.query(question).await?;
    Ok(Json(AskResponse {
        success: true,
        answer: answer.into_text(),
    }))
}

async fn status(State(session): State<Arc<SessionController>>) -> Json<SessionStatus> {
    Json(session.status().await)
}

async fn clear(State(session): State<Arc<SessionController>>) -> Json<serde_json::Value> {
    session.clear().await;
    Json(json!({ "success": true, "message": "Current document cleared" }))
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<RagError> for ApiError {
    fn from(error: RagError) -> Self {
        if error.is_client_error() {
            Self::bad_request(error.to_string())
        } else {
            Self::internal(error.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "success": false, "error": self.message })),
        )
            .into_response()
    }
}
