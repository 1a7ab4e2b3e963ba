//! Poller configuration.
//!
//! Passed explicitly to [`ProgressPoller`](crate::poller::ProgressPoller);
//! the poller never reads ambient settings.

use std::time::Duration;

use crate::retry::RetryPolicy;

/// Settings shared by every session a poller starts.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Mirror the progress text into the window title.
    pub show_progress_in_title: bool,
    /// Display the progress bar (it is still updated when hidden).
    pub show_progress_bar: bool,
    /// Wait between successful polls.
    pub live_preview_refresh_period: Duration,
    /// Give up on a job that was never seen running after this long.
    pub inactivity_timeout: Duration,
    /// Maximum number of live previews kept in the preview sink.
    pub preview_capacity: usize,
    pub retry: RetryPolicy,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            show_progress_in_title: true,
            show_progress_bar: true,
            live_preview_refresh_period: Duration::from_millis(500),
            inactivity_timeout: Duration::from_secs(60),
            preview_capacity: 2,
            retry: RetryPolicy::default(),
        }
    }
}
