//! `sdui-watch` subcommands.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use sdui_core::error::CoreError;
use sdui_core::hashing::{sha256_file, DEFAULT_CHUNK_SIZE};
use sdui_core::job_id::JobId;
use sdui_core::task_store::TaskIdStore;
use sdui_progress::api::ProgressApi;
use sdui_progress::outcome::PollOutcome;
use sdui_progress::poller::{ProgressPoller, SessionHooks};
use sdui_progress::sink::PreviewSink;

use crate::config::WatchConfig;
use crate::sinks::{LogSink, PreviewDir};

pub const USAGE: &str = "usage: sdui-watch <new-id | track <job-id> | restore | hash <path>...>";

/// A parsed command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Generate a job id and store it for the configured tab.
    NewId,
    /// Store `job-id` for the tab, then watch it until it ends.
    Track(JobId),
    /// Reattach to the job stored for the tab.
    Restore,
    /// Print the SHA-256 of each file.
    Hash(Vec<PathBuf>),
}

impl Command {
    /// Parse the arguments that follow the program name.
    pub fn parse<I, A>(args: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        let mut args = args.into_iter().map(Into::into);
        let name = args
            .next()
            .ok_or_else(|| CoreError::Validation(USAGE.to_string()))?;
        let rest: Vec<String> = args.collect();

        match (name.as_str(), rest.as_slice()) {
            ("new-id", []) => Ok(Self::NewId),
            ("track", [id]) => Ok(Self::Track(JobId::parse(id)?)),
            ("restore", []) => Ok(Self::Restore),
            ("hash", paths) if !paths.is_empty() => {
                Ok(Self::Hash(paths.iter().map(PathBuf::from).collect()))
            }
            _ => Err(CoreError::Validation(USAGE.to_string())),
        }
    }
}

/// What a command produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    NewId(JobId),
    Watched { job_id: JobId, outcome: PollOutcome },
    Hashes(Vec<(PathBuf, String)>),
}

impl Report {
    /// Process exit code: non-zero when a watched job did not complete.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Watched { outcome, .. } if !outcome.is_completed() => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewId(id) => write!(f, "{id}"),
            Self::Watched { job_id, outcome } => {
                let outcome = match outcome {
                    PollOutcome::Completed => "completed".to_string(),
                    PollOutcome::Aborted => "aborted".to_string(),
                    PollOutcome::TimedOut => "timed out".to_string(),
                    PollOutcome::Failed { kind } => format!("failed ({kind:?} error)"),
                    PollOutcome::Cancelled => "cancelled".to_string(),
                };
                write!(f, "{job_id}: {outcome}")
            }
            Self::Hashes(hashes) => {
                for (i, (path, digest)) in hashes.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{digest}  {}", path.display())?;
                }
                Ok(())
            }
        }
    }
}

/// Run `command` against `config`, stopping a watch on Ctrl-C.
pub async fn run(command: Command, config: &WatchConfig) -> Result<Report, CoreError> {
    run_until(command, config, ctrl_c()).await
}

/// Run `command` against `config`. A watch still running when `interrupt`
/// resolves is cancelled.
pub async fn run_until(
    command: Command,
    config: &WatchConfig,
    interrupt: impl Future<Output = ()>,
) -> Result<Report, CoreError> {
    match command {
        Command::NewId => new_id(config).await.map(Report::NewId),
        Command::Track(job_id) => track(config, job_id, interrupt).await,
        Command::Restore => restore(config, interrupt).await,
        Command::Hash(paths) => hash_files(&paths).await.map(Report::Hashes),
    }
}

pub async fn new_id(config: &WatchConfig) -> Result<JobId, CoreError> {
    let mut store = TaskIdStore::open(&config.state_file).await?;
    let job_id = JobId::generate();
    store.set(&config.tab, job_id.clone()).await?;
    tracing::info!(tab = %config.tab, job_id = %job_id, "Stored new job id");
    Ok(job_id)
}

/// Store `job_id` for the tab, watch it, and forget it once it ends.
///
/// An interrupted watch keeps the id so `restore` can pick the job up.
pub async fn track(
    config: &WatchConfig,
    job_id: JobId,
    interrupt: impl Future<Output = ()>,
) -> Result<Report, CoreError> {
    let mut store = TaskIdStore::open(&config.state_file).await?;
    store.set(&config.tab, job_id.clone()).await?;

    let timeout = config.poll.inactivity_timeout;
    let outcome = watch_job(config, job_id.clone(), timeout, interrupt).await?;

    if outcome == PollOutcome::Cancelled {
        tracing::info!(
            tab = %config.tab,
            job_id = %job_id,
            "Watch interrupted, job id kept for restore",
        );
    } else {
        store.remove(&config.tab).await?;
    }
    Ok(Report::Watched { job_id, outcome })
}

/// Reattach to the job stored for the tab.
///
/// A restored job that is neither queued nor running has already
/// finished, so the session uses a zero inactivity timeout. The stored id
/// is kept so a later restore finds it again.
pub async fn restore(
    config: &WatchConfig,
    interrupt: impl Future<Output = ()>,
) -> Result<Report, CoreError> {
    let store = TaskIdStore::open(&config.state_file).await?;
    let job_id = store
        .get(&config.tab)
        .map(|task| task.job_id.clone())
        .ok_or_else(|| CoreError::NoStoredJob {
            tab: config.tab.clone(),
        })?;

    tracing::info!(tab = %config.tab, job_id = %job_id, "Restoring progress");
    let outcome = watch_job(config, job_id.clone(), Duration::ZERO, interrupt).await?;
    Ok(Report::Watched { job_id, outcome })
}

pub async fn hash_files(paths: &[PathBuf]) -> Result<Vec<(PathBuf, String)>, CoreError> {
    let mut hashes = Vec::with_capacity(paths.len());
    for path in paths {
        let digest = sha256_file(path, DEFAULT_CHUNK_SIZE).await?;
        hashes.push((path.clone(), digest));
    }
    Ok(hashes)
}

/// Resolves on Ctrl-C. Never resolves if the signal cannot be listened
/// for, so the watch then runs until the job ends.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Cannot listen for Ctrl-C, watching until the job ends");
        std::future::pending::<()>().await;
    }
}

async fn watch_job(
    config: &WatchConfig,
    job_id: JobId,
    inactivity_timeout: Duration,
    interrupt: impl Future<Output = ()>,
) -> Result<PollOutcome, CoreError> {
    let api = ProgressApi::with_timeout(config.api_url.as_str(), config.request_timeout)
        .map_err(|e| CoreError::Internal(e.to_string()))?;
    let poller = ProgressPoller::new(api, config.poll.clone());

    let (preview, writer) = match config.preview_dir.as_ref() {
        Some(dir) => {
            let (sink, writer) = PreviewDir::spawn(dir);
            (Some(Box::new(sink) as Box<dyn PreviewSink>), Some(writer))
        }
        None => (None, None),
    };

    let hooks = SessionHooks::new().on_end(|outcome| {
        tracing::debug!(?outcome, "Session ended");
    });
    let session = poller.start_with_timeout(
        job_id.clone(),
        LogSink::new(job_id),
        preview,
        hooks,
        inactivity_timeout,
    );

    let outcome = tokio::select! {
        outcome = session.wait() => outcome,
        _ = interrupt => {
            tracing::info!("Interrupted, stopping");
            session.cancel();
            session.wait().await
        }
    };

    // Teardown has been queued; wait for the preview files to be cleaned up.
    if let Some(writer) = writer {
        writer.finished().await;
    }
    Ok(outcome)
}
