//! How a polling session ended.

use serde::Serialize;

use crate::source::FailureKind;

/// Reason a session stopped. Delivered once, to `on_end` and to
/// [`PollSession::wait`](crate::poller::PollSession::wait).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PollOutcome {
    /// The server reported the job as completed.
    Completed,
    /// The job was running and then stopped without being reported
    /// complete (finished between polls, interrupted or skipped).
    Aborted,
    /// The job never started within the inactivity timeout.
    TimedOut,
    /// Polling failed for longer than the retry budget allows.
    Failed { kind: FailureKind },
    /// The caller cancelled the session.
    Cancelled,
}

impl PollOutcome {
    /// Whether the job is known to have produced its output.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}
