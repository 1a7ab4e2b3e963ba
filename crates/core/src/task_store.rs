//! Per-tab persistence of the job currently being tracked.
//!
//! When a job is submitted its id is saved under the tab it came from
//! (`txt2img`, `img2img`, ...). If the client goes away mid-job the id
//! is still on disk and progress can be restored later. The whole store
//! is one small JSON file, rewritten atomically on every change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job_id::JobId;
use crate::types::Timestamp;

/// One stored job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTask {
    pub job_id: JobId,
    pub saved_at: Timestamp,
}

/// JSON-file backed map from tab name to the job tracked for it.
#[derive(Debug)]
pub struct TaskIdStore {
    path: PathBuf,
    entries: BTreeMap<String, StoredTask>,
}

impl TaskIdStore {
    /// Load the store from `path`. A missing file yields an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The job stored for `tab`, if any.
    pub fn get(&self, tab: &str) -> Option<&StoredTask> {
        self.entries.get(tab)
    }

    /// Store `job_id` for `tab`, replacing any previous entry.
    pub async fn set(&mut self, tab: &str, job_id: JobId) -> Result<(), CoreError> {
        validate_tab(tab)?;
        self.entries.insert(
            tab.to_string(),
            StoredTask {
                job_id,
                saved_at: chrono::Utc::now(),
            },
        );
        self.persist().await
    }

    /// Forget the job stored for `tab`. Returns the removed entry.
    pub async fn remove(&mut self, tab: &str) -> Result<Option<StoredTask>, CoreError> {
        let removed = self.entries.remove(tab);
        if removed.is_some() {
            self.persist().await?;
        }
        Ok(removed)
    }

    /// Write to a sibling temp file, then rename over the real one.
    async fn persist(&self) -> Result<(), CoreError> {
        let json = serde_json::to_vec_pretty(&self.entries)?;
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| {
                CoreError::Internal(format!("store path {} has no file name", self.path.display()))
            })?
            .to_string_lossy();
        let tmp = self.path.with_file_name(format!(".{file_name}.tmp"));

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!(path = %self.path.display(), entries = self.entries.len(), "Saved task store");
        Ok(())
    }
}

fn validate_tab(tab: &str) -> Result<(), CoreError> {
    if tab.trim().is_empty() {
        return Err(CoreError::Validation("tab name must not be empty".into()));
    }
    Ok(())
}
