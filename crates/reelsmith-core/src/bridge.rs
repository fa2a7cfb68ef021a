//! Bridge: hands prepared content to the overlay document.
//!
//! Each record is keyed by the task id that produced it, so concurrent
//! renders never read each other's markup.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ReelError, ReelResult};

/// Content the overlay document reads once at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeContent {
    /// Overlay markup (may include its own `<script>`/`<style>`).
    pub html: String,
    /// Narration script text.
    pub script: String,
    /// Subtitle cues as SRT text.
    pub srt: String,
    pub timestamp: DateTime<Utc>,
}

impl BridgeContent {
    pub fn new(html: impl Into<String>, script: impl Into<String>, srt: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            script: script.into(),
            srt: srt.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Task-scoped storage for bridge content.
pub trait BridgeStore: Send + Sync {
    /// Store content for `task_id`, replacing any previous record for that task.
    fn write(&self, task_id: &str, content: &BridgeContent) -> ReelResult<PathBuf>;

    fn read(&self, task_id: &str) -> ReelResult<Option<BridgeContent>>;

    /// Remove the record for `task_id`. Missing records are not an error.
    fn remove(&self, task_id: &str) -> ReelResult<()>;
}

/// Bridge store backed by `<root>/<task_id>/content.json`.
#[derive(Debug, Clone)]
pub struct FileBridgeStore {
    root: PathBuf,
}

impl FileBridgeStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn content_path(&self, task_id: &str) -> ReelResult<PathBuf> {
        validate_task_key(task_id)?;
        Ok(self.root.join(task_id).join("content.json"))
    }
}

impl BridgeStore for FileBridgeStore {
    fn write(&self, task_id: &str, content: &BridgeContent) -> ReelResult<PathBuf> {
        let path = self.content_path(task_id)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Write-then-rename so a reader never sees half a record.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(content)?)?;
        std::fs::rename(&tmp, &path)?;
        tracing::debug!(task_id, path = %path.display(), "bridge content written");
        Ok(path)
    }

    fn read(&self, task_id: &str) -> ReelResult<Option<BridgeContent>> {
        if !is_valid_task_key(task_id) {
            return Ok(None);
        }
        let path = self.content_path(task_id)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, task_id: &str) -> ReelResult<()> {
        let path = self.content_path(task_id)?;
        let Some(dir) = path.parent() else {
            return Ok(());
        };
        match std::fs::remove_dir_all(dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Task ids become directory names; keep them to a safe alphabet.
pub fn validate_task_key(task_id: &str) -> ReelResult<()> {
    if is_valid_task_key(task_id) {
        Ok(())
    } else {
        Err(ReelError::InvalidArgument(format!("invalid task id: {task_id:?}")))
    }
}

/// Task ids are `[A-Za-z0-9_-]{1,128}`; nothing else can name a file.
pub fn is_valid_task_key(task_id: &str) -> bool {
    !task_id.is_empty()
        && task_id.len() <= 128
        && task_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
