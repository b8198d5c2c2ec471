//! Object storage for uploaded screenshots.
//!
//! Provides an `ObjectStore` trait with a Supabase Storage implementation.
//! Objects are written with `PUT {base}/storage/v1/object/{bucket}/{name}`
//! and addressed afterwards through the bucket's public URL.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

use crate::config::WorkpulseConfig;

/// Abstraction over blob storage backends.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `content` under `name`, replacing any existing object.
    async fn put(&self, name: &str, content_type: &str, content: Bytes)
        -> Result<(), StorageError>;

    /// Publicly readable URL of an object stored under `name`.
    fn public_url(&self, name: &str) -> String;
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("storage rejected upload ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Object name for an upload: ISO-8601 UTC timestamp, `_`, then the client's
/// file name with anything outside `[A-Za-z0-9._-]` replaced by `_`.
///
/// The name is used verbatim as a URL path segment for both the upload and
/// the public URL, so it must never need percent-encoding.
pub fn object_name(at: DateTime<Utc>, original: &str) -> String {
    let original = if original.trim().is_empty() {
        "image"
    } else {
        original
    };
    let cleaned: String = original
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{}", at.format("%Y-%m-%dT%H:%M:%S%.6f"), cleaned)
}

/// Supabase Storage client authenticated with the service-role key.
#[derive(Debug, Clone)]
pub struct SupabaseStorageClient {
    client: Client,
    base_url: String,
    bucket: String,
    service_key: String,
}

impl SupabaseStorageClient {
    pub fn new(
        base_url: impl Into<String>,
        bucket: impl Into<String>,
        service_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StorageError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            service_key: service_key.into(),
        })
    }

    pub fn from_config(config: &WorkpulseConfig) -> Result<Self, StorageError> {
        Self::new(
            config.supabase_base(),
            config.supabase.bucket.clone(),
            config.supabase.service_role_key.clone(),
            Duration::from_secs(config.supabase.timeout_seconds),
        )
    }

    fn upload_url(&self, name: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, name)
    }
}

#[async_trait]
impl ObjectStore for SupabaseStorageClient {
    async fn put(
        &self,
        name: &str,
        content_type: &str,
        content: Bytes,
    ) -> Result<(), StorageError> {
        let size = content.len();
        let response = self
            .client
            .put(self.upload_url(name))
            .bearer_auth(&self.service_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(content)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK && status != reqwest::StatusCode::CREATED {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                object = %name,
                message = %message,
                "Failed to upload to Supabase Storage"
            );
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        tracing::debug!(object = %name, bytes = size, "Stored screenshot");
        Ok(())
    }

    fn public_url(&self, name: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, name
        )
    }
}
