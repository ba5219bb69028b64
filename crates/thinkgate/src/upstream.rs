//! Typed client for the upstream inference server
//!
//! Covers the calls thinkgate makes on its own behalf: listing loaded
//! models, unloading a model, and one-shot generation. Proxied client
//! traffic goes through [`crate::proxy`] instead and is never decoded here.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::config::UpstreamConfig;
use crate::error::{Result, ThinkgateError};
use crate::lifecycle::ModelBackend;

/// A model currently resident on the upstream server (`/api/ps` entry)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadedModel {
    pub name: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub size_vram: Option<u64>,
    #[serde(default)]
    pub expires_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProcessList {
    #[serde(default)]
    models: Vec<LoadedModel>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Append a request path (and optional raw query) to an upstream base URL.
///
/// The path is always appended to the base path, never resolved as a
/// reference, so a request path can not name another host. The base must
/// end in `/` (see [`UpstreamConfig::base_url`]).
pub fn upstream_url(base: &Url, path: &str, query: Option<&str>) -> Url {
    let mut url = base.clone();
    url.set_path(&format!("{}{}", base.path(), path.trim_start_matches('/')));
    url.set_query(query.filter(|q| !q.is_empty()));
    url
}

/// HTTP client for the upstream server
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: Url,
}

impl OllamaClient {
    /// Build a client from configuration.
    ///
    /// No overall request timeout is set on the underlying client, because
    /// proxied streams may legitimately run for minutes. Callers bound the
    /// wait for a response head with [`UpstreamConfig::timeout`].
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let base_url = config.base_url()?;
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| ThinkgateError::Upstream(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The underlying HTTP client, shared with the proxy handlers
    pub fn http(&self) -> &Client {
        &self.client
    }

    pub fn endpoint(&self, path: &str) -> Url {
        upstream_url(&self.base_url, path, None)
    }

    /// Models currently loaded on the upstream server
    pub async fn loaded_models(&self) -> Result<Vec<LoadedModel>> {
        let url = self.endpoint("api/ps");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ThinkgateError::Upstream(format!("Failed to list loaded models: {e}")))?;

        let response = error_for_status(response, "list loaded models").await?;
        let list: ProcessList = response
            .json()
            .await
            .map_err(|e| ThinkgateError::Serialization(format!("Invalid /api/ps response: {e}")))?;

        Ok(list.models)
    }

    /// Ask the upstream server to release a model immediately
    pub async fn unload_model(&self, model: &str) -> Result<()> {
        let url = self.endpoint("api/generate");
        let response = self
            .client
            .post(url)
            .json(&json!({"model": model, "keep_alive": 0}))
            .send()
            .await
            .map_err(|e| ThinkgateError::Upstream(format!("Failed to unload {model}: {e}")))?;

        error_for_status(response, "unload model").await?;
        Ok(())
    }

    /// Non-streaming generation, returning the raw `response` text
    pub async fn generate_text(&self, model: &str, prompt: &str) -> Result<String> {
        let url = self.endpoint("api/generate");
        let response = self
            .client
            .post(url)
            .json(&json!({"model": model, "prompt": prompt, "stream": false}))
            .send()
            .await
            .map_err(|e| ThinkgateError::Upstream(format!("Generation request failed: {e}")))?;

        let response = error_for_status(response, "generate").await?;
        let body: GenerateResponse = response.json().await.map_err(|e| {
            ThinkgateError::Serialization(format!("Invalid generate response: {e}"))
        })?;

        Ok(body.response)
    }
}

async fn error_for_status(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ThinkgateError::Upstream(format!(
        "Upstream refused to {action}: {status} {body}"
    )))
}

#[async_trait]
impl ModelBackend for OllamaClient {
    async fn list_loaded(&self) -> Result<Vec<String>> {
        Ok(self
            .loaded_models()
            .await?
            .into_iter()
            .map(|m| m.name)
            .collect())
    }

    async fn unload(&self, model: &str) -> Result<()> {
        self.unload_model(model).await
    }

    async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        self.generate_text(model, prompt).await
    }
}
