//! HTTP client for the backend progress endpoint.
//!
//! Wraps `POST /internal/progress` using [`reqwest`] and classifies
//! failures into [`ProgressApiError`] variants.

use std::time::Duration;

use crate::snapshot::{parse_snapshot, ProgressRequest, ProgressSnapshot};
use crate::source::{ProgressApiError, ProgressSource};

/// Path of the progress endpoint relative to the backend base URL.
pub const PROGRESS_PATH: &str = "/internal/progress";

/// Per-request timeout used by [`ProgressApi::new`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for one backend.
#[derive(Debug, Clone)]
pub struct ProgressApi {
    client: reqwest::Client,
    api_url: String,
}

impl ProgressApi {
    /// Create a new API client with [`DEFAULT_REQUEST_TIMEOUT`].
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:7860`.
    pub fn new(api_url: impl Into<String>) -> Result<Self, ProgressApiError> {
        Self::with_timeout(api_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a new API client whose requests fail after `timeout`.
    ///
    /// A request that times out counts as a network failure.
    pub fn with_timeout(
        api_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProgressApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProgressApiError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, api_url))
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (useful for sharing timeouts and connection pools).
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Full URL of the progress endpoint.
    pub fn progress_url(&self) -> String {
        format!("{}{PROGRESS_PATH}", self.api_url)
    }

    /// Query the status of one job.
    pub async fn fetch_progress(
        &self,
        request: &ProgressRequest,
    ) -> Result<ProgressSnapshot, ProgressApiError> {
        let response = self
            .client
            .post(self.progress_url())
            .json(request)
            .send()
            .await
            .map_err(|e| ProgressApiError::Transport(e.to_string()))?;

        let response = Self::ensure_success(response).await?;
        let body = response.text().await?;
        Ok(parse_snapshot(&body)?)
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code, returning a
    /// [`ProgressApiError::Status`] with the body text otherwise.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ProgressApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProgressApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

impl ProgressSource for ProgressApi {
    async fn fetch_progress(
        &self,
        request: &ProgressRequest,
    ) -> Result<ProgressSnapshot, ProgressApiError> {
        ProgressApi::fetch_progress(self, request).await
    }
}
