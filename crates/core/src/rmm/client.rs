//! Tactical RMM REST API client.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::request::RmmRequest;
use crate::errors::RmmError;
use crate::retry::{is_transient, with_retry, RetryError, RetryPolicy};

/// One entry of `GET /scripts/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RmmScript {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub script_type: String,
    #[serde(default)]
    pub hidden: Option<bool>,
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default)]
    pub default_timeout: Option<u64>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub run_as_user: Option<bool>,
    #[serde(default)]
    pub env_vars: Option<Vec<String>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub supported_platforms: Option<Vec<String>>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Body of `GET /scripts/{id}/download/`.
#[derive(Debug, Clone, Deserialize)]
pub struct RmmScriptContent {
    pub code: String,
}

/// Body of `POST /scripts/` and `PUT /scripts/{id}/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptPayload {
    pub name: String,
    pub shell: String,
    pub default_timeout: u64,
    pub args: Vec<String>,
    pub script_body: String,
    pub run_as_user: bool,
    pub env_vars: Vec<String>,
    pub description: String,
    pub supported_platforms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Asynchronous Tactical RMM client.
#[derive(Clone)]
pub struct RmmClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl RmmClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: &str,
        retry: RetryPolicy,
    ) -> Result<Self, RmmError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let mut key = HeaderValue::from_str(api_key)
            .map_err(|e| RmmError::InvalidApiKey(e.to_string()))?;
        key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("scriptsync/0.1"));
        headers.insert("X-API-KEY", key);
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        info!(base_url = %base_url, "created RmmClient");
        Ok(Self {
            http,
            base_url,
            retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[instrument(skip(self))]
    pub async fn list_scripts(&self) -> Result<Vec<RmmScript>, RmmError> {
        let resp = self.execute(RmmRequest::ListScripts).await?;
        let scripts: Vec<RmmScript> = resp
            .json()
            .await
            .map_err(|e| RmmError::ParseError(e.to_string()))?;
        debug!(count = scripts.len(), "fetched script listing");
        Ok(scripts)
    }

    #[instrument(skip(self))]
    pub async fn get_script_content(&self, id: u64) -> Result<String, RmmError> {
        let resp = self.execute(RmmRequest::ScriptContent { id }).await?;
        let content: RmmScriptContent = resp
            .json()
            .await
            .map_err(|e| RmmError::ParseError(e.to_string()))?;
        debug!(id, len = content.code.len(), "fetched script content");
        Ok(content.code)
    }

    #[instrument(skip(self, payload), fields(name = %payload.name))]
    pub async fn create_script(&self, payload: &ScriptPayload) -> Result<(), RmmError> {
        self.execute(RmmRequest::CreateScript { payload }).await?;
        info!("created script");
        Ok(())
    }

    #[instrument(skip(self, payload), fields(name = %payload.name))]
    pub async fn update_script(&self, id: u64, payload: &ScriptPayload) -> Result<(), RmmError> {
        self.execute(RmmRequest::UpdateScript { id, payload }).await?;
        info!("updated script");
        Ok(())
    }

    /// Send with retry on connection failure, then reject non-2xx.
    async fn execute(&self, request: RmmRequest<'_>) -> Result<reqwest::Response, RmmError> {
        let url = request.url(&self.base_url)?;
        let operation = request.operation();
        let resp = with_retry(self.retry, operation, is_transient, || {
            request.builder(&self.http, url.clone()).send()
        })
        .await
        .map_err(|e| match e {
            RetryError::Exhausted { attempts, last } => RmmError::Unavailable {
                attempts,
                detail: last.to_string(),
            },
            RetryError::Failed(e) => RmmError::HttpError(e),
        })?;

        let status = resp.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), operation, "RMM returned error status");
            return Err(RmmError::Status {
                status: status.as_u16(),
                operation: operation.to_string(),
            });
        }
        Ok(resp)
    }
}
