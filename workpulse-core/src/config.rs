use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct WorkpulseConfig {
    #[serde(default)]
    pub http: HttpConfig,
    pub supabase: SupabaseConfig,
    pub inference: InferenceConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_body_bytes: 256 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_role_key: String,
    pub bucket: String,
    pub sessions_table: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub structured_output: bool,
    pub timeout_seconds: u64,
}

/// Hard ceiling on screenshots per batch. `upload.max_images` may only lower it.
pub const MAX_BATCH_IMAGES: usize = 18;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UploadConfig {
    pub max_images: usize,
    /// Number of storage uploads in flight at once. 1 keeps them sequential.
    pub concurrency: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_images: MAX_BATCH_IMAGES,
            concurrency: 1,
        }
    }
}

impl WorkpulseConfig {
    /// Load from an optional TOML file, then `WORKPULSE__*` variables, then the
    /// conventional `OPENAI_API_KEY` / `SUPABASE_*` variables.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config = Self::builder(path)?.build()?.try_deserialize::<Self>()?;
        config.validate()?;
        Ok(config)
    }

    fn builder(
        path: &str,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("supabase.url", "")?
            .set_default("supabase.service_role_key", "")?
            .set_default("supabase.bucket", "images")?
            .set_default("supabase.sessions_table", "sessions")?
            .set_default("supabase.timeout_seconds", 30)?
            .set_default("inference.api_key", "")?
            .set_default("inference.base_url", "https://api.openai.com/v1")?
            .set_default("inference.model", "gpt-4o")?
            .set_default("inference.max_tokens", 800)?
            .set_default("inference.structured_output", true)?
            .set_default("inference.timeout_seconds", 120)?
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("WORKPULSE").separator("__"))
            .set_override_option("inference.api_key", std::env::var("OPENAI_API_KEY").ok())?
            .set_override_option("supabase.url", std::env::var("SUPABASE_URL").ok())?
            .set_override_option(
                "supabase.service_role_key",
                std::env::var("SUPABASE_SERVICE_ROLE_KEY").ok(),
            )?
            .set_override_option("supabase.bucket", std::env::var("SUPABASE_BUCKET").ok())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("supabase.url", &self.supabase.url),
            ("supabase.service_role_key", &self.supabase.service_role_key),
            ("supabase.bucket", &self.supabase.bucket),
            ("supabase.sessions_table", &self.supabase.sessions_table),
            ("inference.api_key", &self.inference.api_key),
            ("inference.base_url", &self.inference.base_url),
            ("inference.model", &self.inference.model),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Message(format!("{} must be set", key)));
            }
        }
        if self.upload.max_images == 0 || self.upload.max_images > MAX_BATCH_IMAGES {
            return Err(ConfigError::Message(format!(
                "upload.max_images must be between 1 and {}",
                MAX_BATCH_IMAGES
            )));
        }
        if self.upload.concurrency == 0 {
            return Err(ConfigError::Message("upload.concurrency must be at least 1".into()));
        }
        Ok(())
    }

    /// Storage/data-API base URL without a trailing slash.
    pub fn supabase_base(&self) -> &str {
        self.supabase.url.trim_end_matches('/')
    }
}
