//! Upload subsystem: store screenshots, classify them, persist the session.
//!
//! One batch runs strictly in stages:
//! - count check (no network traffic when it fails)
//! - storage upload of every image, order-preserving, bounded by `concurrency`
//! - one inference call for the whole batch
//! - reply extraction
//! - one session insert
//!
//! Any failure aborts the remaining stages. Nothing is retried.

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use thiserror::Error;
use workpulse_core::config::UploadConfig;
use workpulse_core::models::{AnalysisResult, ImageUpload, NewSession, SessionMeta};
use workpulse_core::storage::object_name;
use workpulse_core::{
    parse_reply, InferenceBackend, InferenceError, ObjectStore, PersistError, ReplyError,
    SessionStore, StorageError,
};

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// A fully received upload request.
#[derive(Debug, Clone)]
pub struct UploadBatch {
    pub images: Vec<ImageUpload>,
    pub meta: SessionMeta,
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Please upload between 1 and {max} images.")]
    ImageCount { count: usize, max: usize },

    #[error("Missing form field: {0}")]
    MissingField(&'static str),

    #[error("Invalid multipart body: {0}")]
    Multipart(String),

    #[error("Failed to upload to Supabase Storage: {0}")]
    Storage(#[from] StorageError),

    #[error("OpenAI API error: {0}")]
    Inference(#[from] InferenceError),

    #[error("{0}")]
    Unparseable(#[from] ReplyError),

    #[error("Failed to insert session: {0}")]
    Persistence(#[from] PersistError),
}

impl UploadError {
    /// True for errors caused by the request itself rather than a collaborator.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            UploadError::ImageCount { .. } | UploadError::MissingField(_) | UploadError::Multipart(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::ImageCount { .. }
            | UploadError::MissingField(_)
            | UploadError::Multipart(_) => "invalid_request",
            UploadError::Storage(_) => "storage",
            UploadError::Inference(_) => "inference",
            UploadError::Unparseable(_) => "unparseable_response",
            UploadError::Persistence(_) => "persistence",
        }
    }
}

/// Reject batches outside `1..=max`.
pub fn validate_image_count(count: usize, max: usize) -> Result<(), UploadError> {
    if count == 0 || count > max {
        return Err(UploadError::ImageCount { count, max });
    }
    Ok(())
}

/// Upload one image under a fresh object name and return its public URL.
async fn store_one(image: &ImageUpload, storage: &dyn ObjectStore) -> Result<String, StorageError> {
    let name = object_name(Utc::now(), &image.file_name);
    let content_type = if image.content_type.is_empty() {
        FALLBACK_CONTENT_TYPE
    } else {
        image.content_type.as_str()
    };
    storage.put(&name, content_type, image.content.clone()).await?;
    Ok(storage.public_url(&name))
}

/// Upload every image and return the public URLs in input order.
pub async fn store_images(
    images: &[ImageUpload],
    storage: &dyn ObjectStore,
    concurrency: usize,
) -> Result<Vec<String>, StorageError> {
    // Futures are built eagerly so the stream holds no borrowing closure.
    let uploads: Vec<_> = images.iter().map(|image| store_one(image, storage)).collect();
    stream::iter(uploads)
        .buffered(concurrency.max(1))
        .try_collect()
        .await
}

/// Run one batch through storage, inference and persistence.
pub async fn process_batch(
    batch: UploadBatch,
    storage: &dyn ObjectStore,
    inference: &dyn InferenceBackend,
    sessions: &dyn SessionStore,
    limits: &UploadConfig,
) -> Result<AnalysisResult, UploadError> {
    let UploadBatch { images, meta } = batch;
    validate_image_count(images.len(), limits.max_images)?;

    let image_urls = store_images(&images, storage, limits.concurrency).await?;
    tracing::info!(images = image_urls.len(), "Screenshots stored");

    let reply = inference.classify(&images).await.map_err(|e| {
        tracing::error!(backend = inference.name(), error = %e, "Inference call failed");
        e
    })?;

    let parsed = parse_reply(&reply).map_err(|e| {
        tracing::error!(error = %e, "Could not extract a verdict from the model reply");
        e
    })?;

    let result = AnalysisResult {
        summary: parsed.summary,
        verdict: parsed.verdict,
        score: parsed.score,
        image_urls,
    };

    sessions.insert(&NewSession::new(meta, &result)).await?;

    tracing::info!(
        verdict = result.verdict.as_deref().unwrap_or("-"),
        score = ?result.score,
        "Batch analysed"
    );
    Ok(result)
}
