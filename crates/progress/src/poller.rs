//! Progress polling sessions.
//!
//! [`ProgressPoller::start`] spawns one task per job. The task issues a
//! single progress query at a time, waits for it to resolve, feeds the
//! snapshot to the sinks and hooks, and sleeps until the next query. It
//! stops when the job completes, stops running, never starts within the
//! inactivity timeout, or keeps failing past the retry budget.
//!
//! Sinks and hooks live behind one mutex together with the `ended` flag.
//! Ending a session flips the flag, tears the sinks down and fires
//! `on_end` exactly once; anything that arrives afterwards (a response
//! to a request that was in flight when the session was cancelled, a
//! second cancel) sees the flag and does nothing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use sdui_core::job_id::JobId;

use crate::config::PollConfig;
use crate::outcome::PollOutcome;
use crate::render::{window_title, ProgressView, BASE_TITLE};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::sink::{PreviewSink, PreviewStrip, ProgressSink};
use crate::snapshot::{ProgressRequest, ProgressSnapshot, INITIAL_PREVIEW_CURSOR};
use crate::source::{FailureKind, ProgressSource};

/// Called once when a session ends.
pub type EndHook = Box<dyn FnOnce(PollOutcome) + Send>;

/// Called with every snapshot a session receives.
pub type ProgressHook = Box<dyn FnMut(&ProgressSnapshot) + Send>;

/// Optional callbacks for one session.
#[derive(Default)]
pub struct SessionHooks {
    on_end: Option<EndHook>,
    on_progress: Option<ProgressHook>,
}

impl SessionHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_end(mut self, hook: impl FnOnce(PollOutcome) + Send + 'static) -> Self {
        self.on_end = Some(Box::new(hook));
        self
    }

    pub fn on_progress(mut self, hook: impl FnMut(&ProgressSnapshot) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(hook));
        self
    }
}

// ---------------------------------------------------------------------------
// Session state machine
// ---------------------------------------------------------------------------

/// Result of looking at one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    End(PollOutcome),
}

/// Per-session polling state, independent of I/O and sinks.
#[derive(Debug)]
pub struct PollState {
    /// Logical start; moved forward whenever a retry fires.
    started_at: Instant,
    was_active: bool,
    /// First failure of the current streak, `None` after a success.
    failing_since: Option<Instant>,
    cursor: i64,
    inactivity_timeout: Duration,
}

impl PollState {
    pub fn new(now: Instant, inactivity_timeout: Duration) -> Self {
        Self {
            started_at: now,
            was_active: false,
            failing_since: None,
            cursor: INITIAL_PREVIEW_CURSOR,
            inactivity_timeout,
        }
    }

    /// Preview cursor to send with the next request.
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    pub fn was_active(&self) -> bool {
        self.was_active
    }

    pub fn is_failing(&self) -> bool {
        self.failing_since.is_some()
    }

    /// Fold a successful snapshot into the state and decide whether to
    /// keep polling.
    pub fn observe(&mut self, snapshot: &ProgressSnapshot, now: Instant) -> Verdict {
        self.failing_since = None;
        if let Some(cursor) = snapshot.id_live_preview {
            self.cursor = cursor;
        }

        if snapshot.completed {
            return Verdict::End(PollOutcome::Completed);
        }

        if snapshot.active {
            self.was_active = true;
        } else if self.was_active {
            return Verdict::End(PollOutcome::Aborted);
        }

        let elapsed = now.duration_since(self.started_at);
        if elapsed > self.inactivity_timeout && !snapshot.queued && !snapshot.active {
            return Verdict::End(PollOutcome::TimedOut);
        }

        Verdict::Continue
    }

    /// Record a failed attempt and decide whether to retry.
    pub fn record_failure(
        &mut self,
        kind: FailureKind,
        now: Instant,
        policy: &RetryPolicy,
    ) -> RetryDecision {
        let since = *self.failing_since.get_or_insert(now);
        policy.decide(kind, now.duration_since(since))
    }

    /// Reset the logical start so transient errors do not count towards
    /// the inactivity timeout.
    pub fn restart_clock(&mut self, now: Instant) {
        self.started_at = now;
    }
}

// ---------------------------------------------------------------------------
// Shared session state (sinks + hooks)
// ---------------------------------------------------------------------------

struct SessionInner {
    ended: bool,
    progress: Box<dyn ProgressSink>,
    preview: Option<PreviewStrip>,
    on_end: Option<EndHook>,
    on_progress: Option<ProgressHook>,
    /// Last title pushed to the progress sink.
    title: Option<String>,
    show_progress_in_title: bool,
    show_progress_bar: bool,
}

impl SessionInner {
    fn render(&mut self, snapshot: &ProgressSnapshot) {
        let view = ProgressView::from_snapshot(snapshot, self.show_progress_bar);
        self.progress.render_progress(&view);

        if self.show_progress_in_title {
            let title = window_title(&view.title_text, true);
            if self.title.as_deref() != Some(title.as_str()) {
                self.progress.set_title(&title);
                self.title = Some(title);
            }
        }
    }

    fn teardown(&mut self) {
        if self.title.as_deref().is_some_and(|t| t != BASE_TITLE) {
            self.progress.set_title(BASE_TITLE);
        }
        self.title = None;
        self.progress.teardown();
        if let Some(preview) = self.preview.as_mut() {
            preview.teardown();
        }
    }
}

struct Shared {
    inner: Mutex<SessionInner>,
    outcome: watch::Sender<Option<PollOutcome>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_ended(&self) -> bool {
        self.lock().ended
    }

    /// Hand a snapshot to `on_progress`, then draw it. Previews are only
    /// shown while the session continues. Returns `false` if the session
    /// ended before or during delivery.
    fn deliver(&self, snapshot: &ProgressSnapshot, verdict: Verdict) -> bool {
        // The hook runs without the lock so it may call back into the session.
        let hook = {
            let mut inner = self.lock();
            if inner.ended {
                return false;
            }
            inner.on_progress.take()
        };
        if let Some(mut hook) = hook {
            hook(snapshot);
            self.lock().on_progress = Some(hook);
        }

        let mut inner = self.lock();
        if inner.ended {
            return false;
        }
        if !snapshot.completed {
            inner.render(snapshot);
        }
        if verdict == Verdict::Continue {
            if let Some(image) = snapshot.live_preview.as_deref() {
                if let Some(preview) = inner.preview.as_mut() {
                    preview.push(image);
                }
            }
        }
        true
    }

    /// End the session. Returns `false` if it had already ended.
    fn finish(&self, outcome: PollOutcome) -> bool {
        let on_end = {
            let mut inner = self.lock();
            if inner.ended {
                return false;
            }
            inner.ended = true;
            inner.teardown();
            inner.on_end.take()
        };
        if let Some(hook) = on_end {
            hook(outcome);
        }
        self.outcome.send_replace(Some(outcome));
        true
    }
}

// ---------------------------------------------------------------------------
// Poller and session handle
// ---------------------------------------------------------------------------

/// Starts polling sessions against one progress source.
pub struct ProgressPoller<S> {
    source: Arc<S>,
    config: PollConfig,
}

impl<S> Clone for ProgressPoller<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            config: self.config.clone(),
        }
    }
}

impl<S: ProgressSource + 'static> ProgressPoller<S> {
    pub fn new(source: S, config: PollConfig) -> Self {
        Self::with_shared_source(Arc::new(source), config)
    }

    pub fn with_shared_source(source: Arc<S>, config: PollConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Start polling `job_id` with the configured inactivity timeout.
    ///
    /// Returns immediately; the first query is issued from a spawned
    /// task, so this must be called inside a tokio runtime.
    pub fn start(
        &self,
        job_id: JobId,
        progress: impl ProgressSink + 'static,
        preview: Option<Box<dyn PreviewSink>>,
        hooks: SessionHooks,
    ) -> PollSession {
        let timeout = self.config.inactivity_timeout;
        self.start_with_timeout(job_id, progress, preview, hooks, timeout)
    }

    /// Start polling `job_id`, ending the session if the job has not
    /// been seen running or queued after `inactivity_timeout`.
    pub fn start_with_timeout(
        &self,
        job_id: JobId,
        progress: impl ProgressSink + 'static,
        preview: Option<Box<dyn PreviewSink>>,
        hooks: SessionHooks,
        inactivity_timeout: Duration,
    ) -> PollSession {
        let inner = SessionInner {
            ended: false,
            progress: Box::new(progress),
            preview: preview.map(|sink| PreviewStrip::new(sink, self.config.preview_capacity)),
            on_end: hooks.on_end,
            on_progress: hooks.on_progress,
            title: None,
            show_progress_in_title: self.config.show_progress_in_title,
            show_progress_bar: self.config.show_progress_bar,
        };
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let shared = Arc::new(Shared {
            inner: Mutex::new(inner),
            outcome: outcome_tx,
        });
        let cancel = CancellationToken::new();

        tracing::info!(
            job_id = %job_id,
            inactivity_timeout_ms = inactivity_timeout.as_millis() as u64,
            "Starting progress polling",
        );

        let session = SessionTask {
            source: Arc::clone(&self.source),
            job_id: job_id.clone(),
            shared: Arc::clone(&shared),
            refresh_period: self.config.live_preview_refresh_period,
            retry: self.config.retry.clone(),
            inactivity_timeout,
            cancel: cancel.clone(),
        };
        tokio::spawn(session.run());

        PollSession {
            job_id,
            shared,
            cancel,
            outcome: outcome_rx,
        }
    }
}

/// Handle to one running (or finished) polling session.
///
/// Dropping the handle cancels the session.
pub struct PollSession {
    job_id: JobId,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    outcome: watch::Receiver<Option<PollOutcome>>,
}

impl PollSession {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn is_ended(&self) -> bool {
        self.shared.is_ended()
    }

    /// The outcome, once the session has ended.
    pub fn outcome(&self) -> Option<PollOutcome> {
        *self.outcome.borrow()
    }

    /// Stop polling now: the pending timer or in-flight request is
    /// abandoned, sinks are torn down and `on_end` fires with
    /// [`PollOutcome::Cancelled`]. Returns `false` if the session had
    /// already ended, in which case nothing happens.
    pub fn cancel(&self) -> bool {
        self.cancel.cancel();
        let ended_now = self.shared.finish(PollOutcome::Cancelled);
        if ended_now {
            tracing::info!(job_id = %self.job_id, "Progress polling cancelled");
        }
        ended_now
    }

    /// Wait for the session to end and return its outcome.
    pub async fn wait(&self) -> PollOutcome {
        let mut rx = self.outcome.clone();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => *outcome,
            Err(_) => None,
        };
        outcome.unwrap_or(PollOutcome::Cancelled)
    }
}

impl Drop for PollSession {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ---------------------------------------------------------------------------
// Polling task
// ---------------------------------------------------------------------------

struct SessionTask<S> {
    source: Arc<S>,
    job_id: JobId,
    shared: Arc<Shared>,
    refresh_period: Duration,
    retry: RetryPolicy,
    inactivity_timeout: Duration,
    cancel: CancellationToken,
}

impl<S: ProgressSource> SessionTask<S> {
    /// Poll until the session ends or is cancelled.
    async fn run(self) {
        let mut state = PollState::new(Instant::now(), self.inactivity_timeout);
        let mut failures = 0u32;

        loop {
            let request = ProgressRequest {
                job_id: self.job_id.clone(),
                live_preview_cursor: state.cursor(),
            };

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                result = self.source.fetch_progress(&request) => result,
            };

            let (delay, retrying) = match result {
                Ok(snapshot) => {
                    if failures > 0 {
                        tracing::info!(job_id = %self.job_id, failures, "Progress polling recovered");
                    }
                    failures = 0;

                    let verdict = state.observe(&snapshot, Instant::now());
                    if !self.shared.deliver(&snapshot, verdict) {
                        return;
                    }
                    if let Verdict::End(outcome) = verdict {
                        tracing::info!(job_id = %self.job_id, ?outcome, "Progress polling finished");
                        self.shared.finish(outcome);
                        return;
                    }
                    (self.refresh_period, false)
                }
                Err(e) => {
                    failures += 1;
                    let kind = e.kind();
                    match state.record_failure(kind, Instant::now(), &self.retry) {
                        RetryDecision::RetryAfter(delay) => {
                            tracing::warn!(
                                job_id = %self.job_id,
                                attempt = failures,
                                delay_ms = delay.as_millis() as u64,
                                error = %e,
                                "Progress request failed, retrying",
                            );
                            (delay, true)
                        }
                        RetryDecision::GiveUp => {
                            tracing::error!(
                                job_id = %self.job_id,
                                attempts = failures,
                                error = %e,
                                "Progress request keeps failing, giving up",
                            );
                            self.shared.finish(PollOutcome::Failed { kind });
                            return;
                        }
                    }
                }
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            if retrying {
                state.restart_clock(Instant::now());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(active: bool, queued: bool) -> ProgressSnapshot {
        ProgressSnapshot {
            active,
            queued,
            ..Default::default()
        }
    }

    #[test]
    fn completed_ends_immediately() {
        let t0 = Instant::now();
        let mut state = PollState::new(t0, Duration::from_secs(60));
        let done = ProgressSnapshot {
            completed: true,
            ..Default::default()
        };
        assert_eq!(state.observe(&done, t0), Verdict::End(PollOutcome::Completed));
    }

    #[test]
    fn active_then_inactive_ends() {
        let t0 = Instant::now();
        let mut state = PollState::new(t0, Duration::from_secs(60));
        assert_eq!(state.observe(&snap(true, false), t0), Verdict::Continue);
        assert!(state.was_active());
        assert_eq!(
            state.observe(&snap(false, false), t0 + Duration::from_secs(1)),
            Verdict::End(PollOutcome::Aborted)
        );
    }

    #[test]
    fn inactive_job_times_out_only_after_timeout() {
        let t0 = Instant::now();
        let mut state = PollState::new(t0, Duration::from_secs(5));
        assert_eq!(
            state.observe(&snap(false, false), t0 + Duration::from_secs(5)),
            Verdict::Continue
        );
        assert_eq!(
            state.observe(&snap(false, false), t0 + Duration::from_millis(5_001)),
            Verdict::End(PollOutcome::TimedOut)
        );
    }

    #[test]
    fn queued_job_never_times_out() {
        let t0 = Instant::now();
        let mut state = PollState::new(t0, Duration::from_secs(5));
        assert_eq!(
            state.observe(&snap(false, true), t0 + Duration::from_secs(3600)),
            Verdict::Continue
        );
    }

    #[test]
    fn zero_timeout_ends_unknown_job_at_once() {
        let t0 = Instant::now();
        let mut state = PollState::new(t0, Duration::ZERO);
        assert_eq!(
            state.observe(&snap(false, false), t0 + Duration::from_millis(1)),
            Verdict::End(PollOutcome::TimedOut)
        );
    }

    #[test]
    fn cursor_follows_snapshots() {
        let t0 = Instant::now();
        let mut state = PollState::new(t0, Duration::from_secs(60));
        assert_eq!(state.cursor(), INITIAL_PREVIEW_CURSOR);

        let with_cursor = ProgressSnapshot {
            active: true,
            id_live_preview: Some(4),
            ..Default::default()
        };
        state.observe(&with_cursor, t0);
        assert_eq!(state.cursor(), 4);

        state.observe(&snap(true, false), t0);
        assert_eq!(state.cursor(), 4, "missing cursor keeps the previous one");
    }

    #[test]
    fn failure_streak_is_measured_from_first_failure() {
        let t0 = Instant::now();
        let policy = RetryPolicy::default();
        let mut state = PollState::new(t0, Duration::from_secs(60));

        assert_eq!(
            state.record_failure(FailureKind::Server, t0, &policy),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
        assert_eq!(
            state.record_failure(FailureKind::Server, t0 + Duration::from_secs(10), &policy),
            RetryDecision::RetryAfter(Duration::from_secs(10))
        );
        assert_eq!(
            state.record_failure(FailureKind::Server, t0 + Duration::from_secs(30), &policy),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn success_resets_failure_streak() {
        let t0 = Instant::now();
        let policy = RetryPolicy::default();
        let mut state = PollState::new(t0, Duration::from_secs(600));

        state.record_failure(FailureKind::Server, t0, &policy);
        assert!(state.is_failing());

        state.observe(&snap(false, true), t0 + Duration::from_secs(20));
        assert!(!state.is_failing());

        assert_eq!(
            state.record_failure(FailureKind::Server, t0 + Duration::from_secs(40), &policy),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
    }

    #[test]
    fn restart_clock_postpones_timeout() {
        let t0 = Instant::now();
        let mut state = PollState::new(t0, Duration::from_secs(5));
        state.restart_clock(t0 + Duration::from_secs(10));
        assert_eq!(
            state.observe(&snap(false, false), t0 + Duration::from_secs(12)),
            Verdict::Continue
        );
    }
}
