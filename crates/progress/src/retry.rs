//! Backoff and give-up rules for failed progress queries.
//!
//! Consecutive failures are measured from the first one in the streak.
//! The wait before the next attempt grows with the length of the streak
//! (clamped to `[min_delay, max_delay]`) until the streak outlasts the
//! budget for its [`FailureKind`], at which point the session gives up.

use std::time::Duration;

use crate::source::FailureKind;

/// Tunable parameters for retrying failed polls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// How long to keep retrying while the server is unreachable.
    pub network_budget: Duration,
    /// How long to keep retrying while the server answers with errors.
    pub server_budget: Duration,
    /// Lower bound on the delay between attempts.
    pub min_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            network_budget: Duration::from_secs(5 * 60),
            server_budget: Duration::from_secs(30),
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(15),
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after the given delay.
    RetryAfter(Duration),
    /// The failure streak exceeded its budget.
    GiveUp,
}

impl RetryPolicy {
    /// Retry budget for a failure class.
    pub fn budget(&self, kind: FailureKind) -> Duration {
        match kind {
            FailureKind::Network => self.network_budget,
            FailureKind::Server => self.server_budget,
        }
    }

    /// Delay before the next attempt, given how long the current failure
    /// streak has lasted.
    pub fn delay_for(&self, failed_for: Duration) -> Duration {
        failed_for.clamp(self.min_delay, self.max_delay.max(self.min_delay))
    }

    /// Decide whether a failure streak of `failed_for` is still retried.
    pub fn decide(&self, kind: FailureKind, failed_for: Duration) -> RetryDecision {
        if failed_for < self.budget(kind) {
            RetryDecision::RetryAfter(self.delay_for(failed_for))
        } else {
            RetryDecision::GiveUp
        }
    }
}
