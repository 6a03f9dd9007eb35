//! Configuration module
//!
//! Settings for the ingestion pipeline, the remote API connection and the content
//! library, loaded from environment variables (a `.env` file is honoured).

use std::env;

use crate::constants::{
    DEFAULT_ALLOWED_CONTENT_TYPES, DEFAULT_API_URL, DEFAULT_API_VERSION, LIBRARY_PAGE_SIZE,
    MAX_UPLOAD_SIZE_MB, MBOX_MAX_MESSAGE_MB, MBOX_READ_CHUNK_MB, MBOX_SUBMIT_BATCH_SIZE, MIB,
    UPLOAD_CHUNK_SIZE_MB,
};

#[derive(Clone, Debug)]
pub struct IngestConfig {
    pub environment: String,
    // Remote API
    pub api_url: String,
    pub api_key: Option<String>,
    pub api_version: String,
    // Validation
    pub max_upload_size_bytes: u64,
    pub allowed_content_types: Vec<String>,
    // Transfer
    pub upload_chunk_size_bytes: u64,
    // Mail archives
    pub mbox_read_chunk_bytes: usize,
    pub mbox_max_message_bytes: usize,
    /// Addresses of the account owner; only mail sent from these is kept.
    pub mbox_self_addresses: Vec<String>,
    pub mbox_submit_batch_size: usize,
    // Content library
    pub library_page_size: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            api_version: DEFAULT_API_VERSION.to_string(),
            max_upload_size_bytes: MAX_UPLOAD_SIZE_MB * MIB,
            allowed_content_types: DEFAULT_ALLOWED_CONTENT_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            upload_chunk_size_bytes: UPLOAD_CHUNK_SIZE_MB * MIB,
            mbox_read_chunk_bytes: (MBOX_READ_CHUNK_MB * MIB) as usize,
            mbox_max_message_bytes: (MBOX_MAX_MESSAGE_MB * MIB) as usize,
            mbox_self_addresses: Vec::new(),
            mbox_submit_batch_size: MBOX_SUBMIT_BATCH_SIZE,
            library_page_size: LIBRARY_PAGE_SIZE,
        }
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl IngestConfig {
    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let config = IngestConfig {
            environment: env::var("ENVIRONMENT")
                .or_else(|_| env::var("APP_ENV"))
                .unwrap_or(defaults.environment),
            api_url: env::var("KBFORGE_API_URL")
                .or_else(|_| env::var("API_URL"))
                .unwrap_or(defaults.api_url)
                .trim_end_matches('/')
                .to_string(),
            api_key: env::var("KBFORGE_API_KEY")
                .or_else(|_| env::var("API_KEY"))
                .ok()
                .filter(|s| !s.is_empty()),
            api_version: env::var("KBFORGE_API_VERSION").unwrap_or(defaults.api_version),
            max_upload_size_bytes: env::var("MAX_UPLOAD_SIZE_MB")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(MAX_UPLOAD_SIZE_MB)
                * MIB,
            allowed_content_types: env::var("ALLOWED_CONTENT_TYPES")
                .map(|s| parse_list(&s))
                .unwrap_or(defaults.allowed_content_types),
            upload_chunk_size_bytes: env::var("UPLOAD_CHUNK_SIZE_MB")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(UPLOAD_CHUNK_SIZE_MB)
                * MIB,
            mbox_read_chunk_bytes: (env::var("MBOX_READ_CHUNK_MB")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(MBOX_READ_CHUNK_MB)
                * MIB) as usize,
            mbox_max_message_bytes: (env::var("MBOX_MAX_MESSAGE_MB")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(MBOX_MAX_MESSAGE_MB)
                * MIB) as usize,
            mbox_self_addresses: env::var("MBOX_SELF_ADDRESSES")
                .map(|s| parse_list(&s))
                .unwrap_or_default(),
            mbox_submit_batch_size: env::var("MBOX_SUBMIT_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(MBOX_SUBMIT_BATCH_SIZE),
            library_page_size: env::var("LIBRARY_PAGE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(LIBRARY_PAGE_SIZE),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(anyhow::anyhow!(
                "KBFORGE_API_URL must be an http(s) URL, got {}",
                self.api_url
            ));
        }

        if self.is_production() && self.api_url.starts_with("http://") {
            return Err(anyhow::anyhow!(
                "KBFORGE_API_URL must use https in production"
            ));
        }

        if self.upload_chunk_size_bytes == 0 {
            return Err(anyhow::anyhow!("UPLOAD_CHUNK_SIZE_MB must be greater than 0"));
        }

        if self.mbox_read_chunk_bytes == 0 {
            return Err(anyhow::anyhow!("MBOX_READ_CHUNK_MB must be greater than 0"));
        }

        if self.mbox_max_message_bytes == 0 {
            return Err(anyhow::anyhow!("MBOX_MAX_MESSAGE_MB must be greater than 0"));
        }

        if self.mbox_submit_batch_size == 0 {
            return Err(anyhow::anyhow!(
                "MBOX_SUBMIT_BATCH_SIZE must be greater than 0"
            ));
        }

        if self.library_page_size == 0 {
            return Err(anyhow::anyhow!("LIBRARY_PAGE_SIZE must be greater than 0"));
        }

        if let Some(bad) = self
            .mbox_self_addresses
            .iter()
            .find(|addr| !addr.contains('@') || addr.starts_with('@') || addr.ends_with('@'))
        {
            return Err(anyhow::anyhow!(
                "MBOX_SELF_ADDRESSES contains an invalid address: {}",
                bad
            ));
        }

        Ok(())
    }

    /// API version prefix (e.g. "/api/v1").
    pub fn api_prefix(&self) -> String {
        format!("/api/{}", self.api_version)
    }
}
