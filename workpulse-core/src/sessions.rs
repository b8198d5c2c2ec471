//! Session persistence through the Supabase REST data API.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

use crate::config::WorkpulseConfig;
use crate::models::NewSession;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert one session row.
    async fn insert(&self, session: &NewSession) -> Result<(), PersistError>;

    /// Every stored row, verbatim. Upstream failures yield an empty list.
    async fn list(&self) -> Vec<serde_json::Value>;
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("data API returned {status}: {message}")]
    Rejected { status: u16, message: String },
}

#[derive(Debug, Clone)]
pub struct SupabaseSessionStore {
    client: Client,
    table_url: String,
    service_key: String,
}

impl SupabaseSessionStore {
    pub fn new(
        base_url: &str,
        table: &str,
        service_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PersistError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            table_url: format!("{}/rest/v1/{}", base_url.trim_end_matches('/'), table),
            service_key: service_key.into(),
        })
    }

    pub fn from_config(config: &WorkpulseConfig) -> Result<Self, PersistError> {
        Self::new(
            config.supabase_base(),
            &config.supabase.sessions_table,
            config.supabase.service_role_key.clone(),
            Duration::from_secs(config.supabase.timeout_seconds),
        )
    }

    async fn fetch_all(&self) -> Result<Vec<serde_json::Value>, PersistError> {
        let response = self
            .client
            .get(&self.table_url)
            .query(&[("select", "*")])
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PersistError::Rejected {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl SessionStore for SupabaseSessionStore {
    async fn insert(&self, session: &NewSession) -> Result<(), PersistError> {
        let response = self
            .client
            .post(&self.table_url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .json(session)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK && status != reqwest::StatusCode::CREATED {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), message = %message, "Failed to insert session");
            return Err(PersistError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        tracing::info!(
            employee = %session.employee_name,
            date = %session.date,
            images = session.image_urls.len(),
            "Session stored"
        );
        Ok(())
    }

    async fn list(&self) -> Vec<serde_json::Value> {
        // Callers cannot tell an empty table from an unreachable data API.
        match self.fetch_all().await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "Session listing failed, returning empty list");
                Vec::new()
            }
        }
    }
}
