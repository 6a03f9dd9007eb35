//! HTTP client for the KBForge knowledge-base service.
//!
//! Provides a minimal client with configurable auth (Bearer token or X-API-Key),
//! generic request helpers, and implementations of the pipeline seams
//! (`UploadTransport`, `KitFetcher`, `FeedbackSink`) on top of them.

pub mod api;

use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

use kbforge_core::constants::{DEFAULT_API_VERSION, MIB, UPLOAD_CHUNK_SIZE_MB};
use kbforge_core::IngestConfig;

/// Authentication strategy for the API.
#[derive(Clone, Debug)]
pub enum Auth {
    /// `Authorization: Bearer {token}`
    Bearer(String),
    /// `X-API-Key: {key}`
    XApiKey(String),
}

/// Non-success HTTP status returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("API request failed with status {status}: {body}")]
pub struct ApiStatusError {
    pub status: u16,
    pub body: String,
}

/// HTTP client for the KBForge API with configurable auth.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    prefix: String,
    auth: Auth,
    upload_chunk_size: usize,
}

impl ApiClient {
    pub fn new(base_url: String, auth: Auth) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            prefix: format!("/api/{}", DEFAULT_API_VERSION),
            auth,
            upload_chunk_size: (UPLOAD_CHUNK_SIZE_MB * MIB) as usize,
        })
    }

    /// Build a client from loaded configuration. Uses X-API-Key auth.
    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .context("Missing API key. Set KBFORGE_API_KEY or API_KEY")?;

        let mut client = Self::new(config.api_url.clone(), Auth::XApiKey(api_key))?;
        client.prefix = config.api_prefix();
        client.upload_chunk_size = (config.upload_chunk_size_bytes as usize).max(1);
        Ok(client)
    }

    /// Create client from environment (see [`IngestConfig::from_env`]).
    pub fn from_env() -> Result<Self> {
        let config = IngestConfig::from_env()?;
        Self::from_config(&config)
    }

    pub fn with_upload_chunk_size(mut self, bytes: usize) -> Self {
        self.upload_chunk_size = bytes.max(1);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// API version prefix, e.g. "/api/v1".
    pub fn api_prefix(&self) -> &str {
        &self.prefix
    }

    pub fn upload_chunk_size(&self) -> usize {
        self.upload_chunk_size
    }

    pub fn build_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, self.prefix, path)
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Auth::Bearer(token) => request.header("Authorization", format!("Bearer {}", token)),
            Auth::XApiKey(key) => request.header("X-API-Key", key.as_str()),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response> {
        let response = self
            .apply_auth(request)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ApiStatusError {
                status: status.as_u16(),
                body: error_text,
            }
            .into());
        }

        Ok(response)
    }

    /// GET request with optional query parameters. Deserializes JSON response.
    /// `path` is relative to the API prefix.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let mut request = self.client.get(self.build_url(path));
        if !query.is_empty() {
            request = request.query(query);
        }

        self.send(request)
            .await?
            .json()
            .await
            .context("Failed to parse response as JSON")
    }

    /// POST JSON body and deserialize response.
    pub async fn post_json<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let request = self.client.post(self.build_url(path)).json(body);

        self.send(request)
            .await?
            .json()
            .await
            .context("Failed to parse response as JSON")
    }

    /// POST JSON body, ignoring any response body.
    pub async fn post_json_unit<B: serde::Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let request = self.client.post(self.build_url(path)).json(body);
        self.send(request).await?;
        Ok(())
    }

    /// PUT raw bytes as `application/octet-stream`.
    pub async fn put_bytes(&self, path: &str, body: Bytes) -> Result<()> {
        let request = self
            .client
            .put(self.build_url(path))
            .header("Content-Type", "application/octet-stream")
            .body(body);
        self.send(request).await?;
        Ok(())
    }

    /// DELETE request. Returns Ok(()) on success.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let request = self.client.delete(self.build_url(path));
        self.send(request).await?;
        Ok(())
    }

    /// Raw client for custom requests. Caller must apply auth via build_url and headers.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

pub use api::{CompletedUpload, CreateUploadRequest, FeedbackRequest, UploadSession};
