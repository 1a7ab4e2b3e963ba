//! Progress endpoint request and response types.
//!
//! The backend answers `POST /internal/progress` with a flat JSON object.
//! Every field may be missing or `null` depending on whether the job is
//! queued, running or finished, so all of them default.

use serde::{Deserialize, Deserializer, Serialize};

use sdui_core::job_id::JobId;

/// Cursor sent with the first request of a session.
pub const INITIAL_PREVIEW_CURSOR: i64 = 0;

/// Body of one progress query.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressRequest {
    #[serde(rename = "id_task")]
    pub job_id: JobId,
    /// Last preview id received, so the server only sends newer previews.
    #[serde(rename = "id_live_preview")]
    pub live_preview_cursor: i64,
}

/// Server-reported job status at one poll instant.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProgressSnapshot {
    /// The job finished and its output is ready.
    #[serde(default, deserialize_with = "null_as_false")]
    pub completed: bool,
    /// The job is executing right now.
    #[serde(default, deserialize_with = "null_as_false")]
    pub active: bool,
    /// The job is waiting for a worker.
    #[serde(default, deserialize_with = "null_as_false")]
    pub queued: bool,
    /// Fraction complete, 0 to 1.
    #[serde(default)]
    pub progress: Option<f64>,
    /// Estimated seconds remaining.
    #[serde(default)]
    pub eta: Option<f64>,
    /// Human-readable status line.
    #[serde(default)]
    pub textinfo: Option<String>,
    /// Current live preview, a URL or `data:` URI.
    #[serde(default)]
    pub live_preview: Option<String>,
    /// Cursor to echo back with the next request.
    #[serde(default)]
    pub id_live_preview: Option<i64>,
}

impl ProgressSnapshot {
    /// `progress` if it is a positive number.
    pub fn positive_progress(&self) -> Option<f64> {
        self.progress.filter(|p| *p > 0.0)
    }
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

/// Parse a progress response body.
pub fn parse_snapshot(body: &str) -> Result<ProgressSnapshot, serde_json::Error> {
    serde_json::from_str(body)
}
