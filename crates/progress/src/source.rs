//! Where progress snapshots come from.
//!
//! The poller only needs "ask about this job, get a snapshot or a
//! classified failure". [`ProgressApi`](crate::api::ProgressApi) is the
//! HTTP implementation; tests drive the poller with scripted sources.

use std::future::Future;

use serde::Serialize;

use crate::snapshot::{ProgressRequest, ProgressSnapshot};

/// How a failed poll attempt is classified for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The request never got an HTTP response (connection refused, DNS,
    /// timeout). Retried for a long time: the server may be restarting.
    Network,
    /// The server answered, but with an error status or a body that is
    /// not a snapshot. Retried only briefly.
    Server,
}

/// Errors from a single progress query.
#[derive(Debug, thiserror::Error)]
pub enum ProgressApiError {
    /// The request never got an answer.
    #[error("Progress request failed: {0}")]
    Transport(String),

    /// The server returned a non-2xx status code.
    #[error("Progress API error ({status}): {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The body could not be parsed as a snapshot.
    #[error("Malformed progress response: {0}")]
    Malformed(String),
}

impl ProgressApiError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transport(_) => FailureKind::Network,
            Self::Status { .. } | Self::Malformed(_) => FailureKind::Server,
        }
    }
}

impl From<reqwest::Error> for ProgressApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            Self::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ProgressApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

/// A backend that can report job progress.
pub trait ProgressSource: Send + Sync {
    /// Query the status of `request.job_id` once.
    fn fetch_progress(
        &self,
        request: &ProgressRequest,
    ) -> impl Future<Output = Result<ProgressSnapshot, ProgressApiError>> + Send;
}
