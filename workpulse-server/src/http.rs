//! Workpulse HTTP API
//!
//! Axum server exposing the screenshot upload pipeline and the session list.
//!
//! Each endpoint has a thin axum handler that delegates to an inner function
//! returning `(StatusCode, serde_json::Value)`, so behaviour can be tested
//! without going through axum dispatch.
//!
//! Endpoints:
//! - POST /upload:   multipart batch of screenshots plus session metadata
//! - GET  /sessions: every stored session row
//! - GET  /health:   liveness and configured collaborators
//! - GET  /version:  server version info

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;
use workpulse_core::models::{ImageUpload, SessionMeta};
use workpulse_core::{
    InferenceBackend, ObjectStore, OpenAiChatClient, SessionStore, SupabaseSessionStore,
    SupabaseStorageClient, WorkpulseConfig, WorkpulseError,
};

use crate::subsystems::sessions::list_sessions;
use crate::subsystems::upload::{process_batch, validate_image_count, UploadBatch, UploadError};

/// Shared state for all HTTP handlers. Built once at startup, never mutated.
#[derive(Clone)]
pub struct HttpState {
    pub config: WorkpulseConfig,
    pub storage: Arc<dyn ObjectStore>,
    pub inference: Arc<dyn InferenceBackend>,
    pub sessions: Arc<dyn SessionStore>,
}

impl HttpState {
    /// Build the Supabase and inference clients described by `config`.
    pub fn from_config(config: WorkpulseConfig) -> Result<Self, WorkpulseError> {
        let storage = SupabaseStorageClient::from_config(&config)?;
        let sessions = SupabaseSessionStore::from_config(&config)?;
        let inference = OpenAiChatClient::from_config(&config)?;
        Ok(Self {
            config,
            storage: Arc::new(storage),
            inference: Arc::new(inference),
            sessions: Arc::new(sessions),
        })
    }
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    let body_limit = state.config.http.max_body_bytes;
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/upload", post(upload_handler))
        .route("/sessions", get(sessions_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Any origin, method and header.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<HttpState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);
    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Workpulse HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Multipart form
// ============================================================================

/// Raw `POST /upload` form before metadata checks.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub images: Vec<ImageUpload>,
    pub employee_name: Option<String>,
    pub employee_pfp: Option<String>,
    pub date: Option<String>,
}

impl UploadForm {
    pub fn into_batch(self) -> Result<UploadBatch, UploadError> {
        Ok(UploadBatch {
            images: self.images,
            meta: SessionMeta {
                employee_name: self
                    .employee_name
                    .ok_or(UploadError::MissingField("employee_name"))?,
                employee_pfp: self
                    .employee_pfp
                    .ok_or(UploadError::MissingField("employee_pfp"))?,
                date: self.date.ok_or(UploadError::MissingField("date"))?,
            },
        })
    }
}

/// Buffer every part of the form. Unknown fields are ignored.
pub async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, UploadError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| UploadError::Multipart(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "images" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let content = field
                    .bytes()
                    .await
                    .map_err(|e| UploadError::Multipart(e.to_string()))?;
                form.images.push(ImageUpload::new(file_name, content_type, content));
            }
            "employee_name" | "employee_pfp" | "date" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| UploadError::Multipart(e.to_string()))?;
                match name.as_str() {
                    "employee_name" => form.employee_name = Some(value),
                    "employee_pfp" => form.employee_pfp = Some(value),
                    _ => form.date = Some(value),
                }
            }
            other => tracing::debug!(field = %other, "Ignoring unknown form field"),
        }
    }

    Ok(form)
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

/// Map a pipeline error to its HTTP status and `{detail, kind}` body.
pub fn error_response(err: &UploadError) -> (StatusCode, serde_json::Value) {
    let status = if err.is_client_error() {
        tracing::warn!(error = %err, "Rejected upload request");
        StatusCode::BAD_REQUEST
    } else {
        tracing::error!(kind = err.kind(), error = %err, "Upload failed");
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (
        status,
        serde_json::json!({
            "detail": err.to_string(),
            "kind": err.kind(),
        }),
    )
}

/// Inner upload. Validates the form then runs the pipeline.
pub async fn upload_inner(state: &HttpState, form: UploadForm) -> (StatusCode, serde_json::Value) {
    if let Err(e) = validate_image_count(form.images.len(), state.config.upload.max_images) {
        return error_response(&e);
    }
    let batch = match form.into_batch() {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    let span = tracing::info_span!(
        "upload",
        batch_id = %Uuid::new_v4(),
        employee = %batch.meta.employee_name,
        images = batch.images.len()
    );

    let outcome = process_batch(
        batch,
        state.storage.as_ref(),
        state.inference.as_ref(),
        state.sessions.as_ref(),
        &state.config.upload,
    )
    .instrument(span)
    .await;

    match outcome {
        Ok(result) => (
            StatusCode::OK,
            serde_json::json!({
                "summary": result.summary,
                "verdict": result.verdict,
                "score": result.score,
                "image_urls": result.image_urls,
            }),
        ),
        Err(e) => error_response(&e),
    }
}

/// Inner sessions, always 200.
pub async fn sessions_inner(state: &HttpState) -> (StatusCode, serde_json::Value) {
    (StatusCode::OK, list_sessions(state.sessions.as_ref()).await)
}

/// Inner health (pure, no IO).
pub fn health_inner(config: &WorkpulseConfig) -> (StatusCode, serde_json::Value) {
    (
        StatusCode::OK,
        serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "model": config.inference.model,
            "structured_output": config.inference.structured_output,
            "bucket": config.supabase.bucket,
            "max_images": config.upload.max_images,
        }),
    )
}

/// Inner version (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "service": "workpulse",
    })
}

// ============================================================================
// Axum handler wrappers (thin, delegate to inner functions)
// ============================================================================

pub async fn upload_handler(
    State(state): State<Arc<HttpState>>,
    multipart: Multipart,
) -> impl IntoResponse {
    let (status, body) = match read_upload_form(multipart).await {
        Ok(form) => upload_inner(&state, form).await,
        Err(e) => error_response(&e),
    };
    (status, Json(body))
}

pub async fn sessions_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = sessions_inner(&state).await;
    (status, Json(body))
}

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.config);
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

// ============================================================================
// Unit Tests
// ============================================================================
