//! Terminal-side sinks: progress as log lines, previews as files.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sdui_core::job_id::JobId;
use sdui_progress::render::ProgressView;
use sdui_progress::sink::{PreviewSink, ProgressSink};
use tokio::fs;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// LogSink
// ---------------------------------------------------------------------------

/// Renders progress as `tracing` events, one per change of the bar text.
pub struct LogSink {
    job_id: JobId,
    last_text: Option<String>,
    title: Option<String>,
    logged: usize,
}

impl LogSink {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            last_text: None,
            title: None,
            logged: 0,
        }
    }

    /// Last title pushed by the poller.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Number of progress lines emitted so far.
    pub fn lines_logged(&self) -> usize {
        self.logged
    }
}

fn log_line(view: &ProgressView) -> &str {
    if view.text.is_empty() {
        "waiting"
    } else {
        &view.text
    }
}

impl ProgressSink for LogSink {
    fn render_progress(&mut self, view: &ProgressView) {
        if self.last_text.as_deref() == Some(view.text.as_str()) {
            return;
        }
        if view.visible {
            tracing::info!(
                job_id = %self.job_id,
                percent = (view.fraction * 100.0).round() as i64,
                "{}",
                log_line(view)
            );
            self.logged += 1;
        }
        self.last_text = Some(view.text.clone());
    }

    fn set_title(&mut self, title: &str) {
        tracing::debug!(job_id = %self.job_id, title, "Title changed");
        self.title = Some(title.to_string());
    }

    fn teardown(&mut self) {
        self.last_text = None;
    }
}

// ---------------------------------------------------------------------------
// PreviewDir
// ---------------------------------------------------------------------------

enum FileOp {
    Write { path: PathBuf, bytes: Vec<u8> },
    Remove(PathBuf),
    Teardown,
}

/// Writes live previews into a directory.
///
/// `data:` URIs are decoded to image files; any other reference is saved
/// as a `.url` file holding the reference. Files are deleted as the poller
/// evicts them, and everything written (plus the directory, if it did not
/// exist before) is removed at teardown.
///
/// The sink itself only queues file operations. They are applied in order
/// by a [`PreviewWriter`] task, so the poller never waits on the disk.
/// Dropping the sink without teardown leaves the written files in place.
pub struct PreviewDir {
    dir: PathBuf,
    files: VecDeque<(String, PathBuf)>,
    written: u64,
    ops: mpsc::UnboundedSender<FileOp>,
}

/// Background task applying the file operations of one [`PreviewDir`].
pub struct PreviewWriter {
    handle: JoinHandle<()>,
}

impl PreviewWriter {
    /// Wait until every queued operation has been applied. Resolves after
    /// the sink is torn down or dropped.
    pub async fn finished(self) {
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "Live preview writer stopped unexpectedly");
        }
    }
}

impl PreviewDir {
    /// Create the sink and start its writer. Must be called inside a
    /// tokio runtime.
    pub fn spawn(dir: impl Into<PathBuf>) -> (Self, PreviewWriter) {
        let dir = dir.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(apply_file_ops(dir.clone(), rx));
        let sink = Self {
            dir,
            files: VecDeque::new(),
            written: 0,
            ops: tx,
        };
        (sink, PreviewWriter { handle })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Paths of the previews currently shown, oldest first.
    pub fn files(&self) -> Vec<PathBuf> {
        self.files.iter().map(|(_, path)| path.clone()).collect()
    }

    fn send(&self, op: FileOp) {
        if self.ops.send(op).is_err() {
            tracing::warn!(dir = %self.dir.display(), "Live preview writer is gone, dropping update");
        }
    }
}

impl PreviewSink for PreviewDir {
    fn append_preview(&mut self, image: &str) {
        self.written += 1;
        let (ext, bytes) = match decode_data_uri(image) {
            Some((mime, bytes)) => (extension_for(&mime), bytes),
            None => ("url", image.as_bytes().to_vec()),
        };
        let path = self.dir.join(format!("preview-{:04}.{ext}", self.written));
        self.files.push_back((image.to_string(), path.clone()));
        self.send(FileOp::Write { path, bytes });
    }

    fn remove_preview(&mut self, image: &str) {
        let Some(pos) = self.files.iter().position(|(i, _)| i == image) else {
            return;
        };
        if let Some((_, path)) = self.files.remove(pos) {
            self.send(FileOp::Remove(path));
        }
    }

    fn teardown(&mut self) {
        self.files.clear();
        self.send(FileOp::Teardown);
    }
}

async fn apply_file_ops(dir: PathBuf, mut ops: mpsc::UnboundedReceiver<FileOp>) {
    let mut dir_checked = false;
    let mut created_dir = false;
    let mut on_disk: Vec<PathBuf> = Vec::new();

    while let Some(op) = ops.recv().await {
        match op {
            FileOp::Write { path, bytes } => {
                if !dir_checked {
                    if !fs::try_exists(&dir).await.unwrap_or(false) {
                        if let Err(e) = fs::create_dir_all(&dir).await {
                            tracing::warn!(dir = %dir.display(), error = %e, "Failed to create live preview directory");
                            continue;
                        }
                        created_dir = true;
                    }
                    dir_checked = true;
                }
                match fs::write(&path, bytes).await {
                    Ok(()) => {
                        tracing::debug!(path = %path.display(), "Wrote live preview");
                        on_disk.push(path);
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Failed to write live preview");
                    }
                }
            }
            FileOp::Remove(path) => {
                if let Some(pos) = on_disk.iter().position(|p| *p == path) {
                    on_disk.remove(pos);
                    remove_file(&path).await;
                }
            }
            FileOp::Teardown => {
                for path in on_disk.drain(..) {
                    remove_file(&path).await;
                }
                if created_dir {
                    // Only succeeds when empty; anything else in there stays.
                    let _ = fs::remove_dir(&dir).await;
                }
                break;
            }
        }
    }
}

async fn remove_file(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove live preview");
    }
}

/// Split a base64 `data:` URI into its MIME type and decoded bytes.
///
/// Returns `None` for anything that is not a base64 data URI.
pub fn decode_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    let bytes = BASE64.decode(payload.trim()).ok()?;
    Some((mime.to_string(), bytes))
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "bin",
    }
}
