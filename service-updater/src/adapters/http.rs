//! JSON-over-HTTP adapters for the generation and batch services.
//!
//! Routes:
//! - `POST {base}/generate/{stage}` returns the generated document
//! - `POST {base}/batches` returns `{"batch_id": ...}`
//! - `GET {base}/batches/{id}` returns a [`BatchStatusReport`]

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::errors::{BatchServiceError, GenerationError, UpdaterError};
use crate::ports::{
    BackgroundBatchService, BatchStatusReport, BatchSubmission, GenerationRequest,
    GenerationService,
};

/// Base URL, credentials and timeout of one HTTP collaborator.
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpEndpoint {
    /// Creates an endpoint. A trailing slash on `base_url` is ignored.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            timeout: Duration::from_secs(120),
        }
    }

    /// Sends `Authorization: Bearer {api_key}` on every request.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Joins `path` onto the base URL.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn client(&self) -> Result<Client, UpdaterError> {
        Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| UpdaterError::Config(format!("failed to build HTTP client: {e}")))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

/// Generation service reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpGenerationService {
    endpoint: HttpEndpoint,
    client: Client,
}

impl HttpGenerationService {
    /// Creates the adapter.
    pub fn new(endpoint: HttpEndpoint) -> Result<Self, UpdaterError> {
        let client = endpoint.client()?;
        Ok(Self { endpoint, client })
    }

    async fn call(&self, request: &GenerationRequest) -> anyhow::Result<serde_json::Value> {
        let url = self.endpoint.url(&format!("generate/{}", request.stage));
        debug!(url = %url, entity_id = %request.service.id, "Calling generation service");

        let response = self
            .endpoint
            .authorize(self.client.post(&url).json(request))
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("{status}: {body}"));
        }
        response
            .json()
            .await
            .with_context(|| format!("invalid JSON from {url}"))
    }
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<serde_json::Value, GenerationError> {
        self.call(request)
            .await
            .map_err(|e| GenerationError::Transport {
                stage: request.stage,
                message: format!("{e:#}"),
            })
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    batch_id: String,
}

/// Background batch service reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBatchService {
    endpoint: HttpEndpoint,
    client: Client,
}

impl HttpBatchService {
    /// Creates the adapter.
    pub fn new(endpoint: HttpEndpoint) -> Result<Self, UpdaterError> {
        let client = endpoint.client()?;
        Ok(Self { endpoint, client })
    }
}

#[async_trait]
impl BackgroundBatchService for HttpBatchService {
    async fn submit_batch(&self, submission: &BatchSubmission) -> Result<String, BatchServiceError> {
        let url = self.endpoint.url("batches");
        let response = self
            .endpoint
            .authorize(self.client.post(&url).json(submission))
            .send()
            .await
            .map_err(|e| BatchServiceError::Transport(format!("POST {url}: {e}")))?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(BatchServiceError::Rejected(format!("{status}: {body}")));
        }
        if !status.is_success() {
            return Err(BatchServiceError::Transport(format!("POST {url}: {status}")));
        }
        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| BatchServiceError::Transport(format!("invalid submit response: {e}")))?;
        Ok(body.batch_id)
    }

    async fn poll_status(&self, batch_id: &str) -> Result<BatchStatusReport, BatchServiceError> {
        let url = self.endpoint.url(&format!("batches/{batch_id}"));
        let response = self
            .endpoint
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| BatchServiceError::Transport(format!("GET {url}: {e}")))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(BatchServiceError::UnknownBatch(batch_id.to_string())),
            status if !status.is_success() => {
                Err(BatchServiceError::Transport(format!("GET {url}: {status}")))
            }
            _ => response
                .json()
                .await
                .map_err(|e| BatchServiceError::Transport(format!("invalid status response: {e}"))),
        }
    }
}
