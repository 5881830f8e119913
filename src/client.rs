//! HTTP client for the local RAG backend.
//!
//! | Method | Endpoint | Response |
//! |--------|----------|----------|
//! | [`BackendClient::health`] | `GET /health` | JSON object |
//! | [`BackendClient::setup_status`] | `GET /setup/status` | JSON object |
//! | [`BackendClient::list_models`] | `GET /models` | JSON object |
//! | [`BackendClient::index_folder`] | `POST /index` | event stream |
//! | [`BackendClient::query`] | `POST /query` | event stream |
//! | [`BackendClient::pull_model`] | `POST /setup/pull-model` | event stream |
//! | [`BackendClient::delete_folder`] | `DELETE /folders/{path}` | ignored |
//!
//! Single-response endpoints are bounded by `backend.request_timeout_secs`.
//! Streaming endpoints only have a connect timeout: an indexing run or a
//! long answer can legitimately take minutes.

use std::time::Duration;

use mnemora_core::connectivity::HealthReport;
use mnemora_core::events::{IndexEvent, PullEvent, QueryEvent};
use mnemora_core::models::{ModelList, SetupStatus};
use reqwest::header::ACCEPT;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::config::BackendConfig;
use crate::stream::{frame_stream, EventStream};

const EVENT_STREAM: &str = "text/event-stream";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid backend URL: {0}")]
    InvalidUrl(String),
    #[error("request cancelled")]
    Cancelled,
}

impl ClientError {
    /// Short text for a user-facing notice.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Status { status, body } if body.trim().is_empty() => {
                format!("backend returned {}", status)
            }
            ClientError::Status { status, body } => {
                format!("backend returned {}: {}", status, detail(body))
            }
            ClientError::Http(e) if e.is_connect() => "backend is not reachable".to_string(),
            ClientError::Http(e) if e.is_timeout() => "backend did not respond in time".to_string(),
            other => other.to_string(),
        }
    }
}

/// Pull `detail` out of a FastAPI-style error body, else return it as is.
fn detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base: Url,
    request_timeout: Duration,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self, ClientError> {
        let base = Url::parse(config.base_url.trim())
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(config.base_url.clone()));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub async fn health(&self) -> Result<HealthReport, ClientError> {
        self.get_json(&["health"]).await
    }

    pub async fn setup_status(&self) -> Result<SetupStatus, ClientError> {
        self.get_json(&["setup", "status"]).await
    }

    pub async fn list_models(&self) -> Result<ModelList, ClientError> {
        self.get_json(&["models"]).await
    }

    pub async fn index_folder(
        &self,
        folder_path: &str,
        cancel: CancellationToken,
    ) -> Result<EventStream<IndexEvent>, ClientError> {
        let body = serde_json::json!({ "folder_path": folder_path });
        self.open_stream(&["index"], &body, cancel).await
    }

    pub async fn query(
        &self,
        query: &str,
        model: &str,
        cancel: CancellationToken,
    ) -> Result<EventStream<QueryEvent>, ClientError> {
        let body = serde_json::json!({ "query": query, "model": model });
        self.open_stream(&["query"], &body, cancel).await
    }

    pub async fn pull_model(
        &self,
        model: &str,
        cancel: CancellationToken,
    ) -> Result<EventStream<PullEvent>, ClientError> {
        let body = serde_json::json!({ "model_name": model });
        self.open_stream(&["setup", "pull-model"], &body, cancel).await
    }

    /// `DELETE /folders/{path}` with the whole path as one encoded segment.
    pub async fn delete_folder(&self, folder_path: &str) -> Result<(), ClientError> {
        let url = self.endpoint(&["folders", folder_path])?;
        tracing::debug!(%url, "delete folder");
        let resp = self
            .http
            .delete(url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ClientError> {
        let url = self.endpoint(segments)?;
        let resp = self
            .http
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        let resp = check_status(resp).await?;
        Ok(resp.json::<T>().await?)
    }

    async fn open_stream<T>(
        &self,
        segments: &[&str],
        body: &serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<EventStream<T>, ClientError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let url = self.endpoint(segments)?;
        tracing::debug!(%url, "open event stream");

        let request = self
            .http
            .post(url)
            .header(ACCEPT, EVENT_STREAM)
            .json(body)
            .send();

        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            resp = request => resp?,
        };
        let resp = check_status(resp).await?;

        Ok(frame_stream(resp.bytes_stream(), cancel))
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    tracing::debug!(%status, %body, "backend error response");
    Err(ClientError::Status { status, body })
}
