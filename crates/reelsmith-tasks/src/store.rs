//! Task persistence.
//!
//! The manager is the only writer; stores just hold the latest snapshot of
//! each task.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use reelsmith_core::bridge::{is_valid_task_key, validate_task_key};
use reelsmith_core::{ReelResult, TaskStoreKind, TasksConfig};

use crate::task::RenderTask;

pub trait TaskStore: Send + Sync {
    fn get(&self, task_id: &str) -> ReelResult<Option<RenderTask>>;

    /// Insert or replace the record for `task.id`.
    fn put(&self, task: &RenderTask) -> ReelResult<()>;

    /// All records, in no particular order.
    fn list(&self) -> ReelResult<Vec<RenderTask>>;
}

/// Open the store selected by `[tasks] store`.
pub fn open_store(config: &TasksConfig) -> ReelResult<Arc<dyn TaskStore>> {
    let store: Arc<dyn TaskStore> = match config.store {
        TaskStoreKind::Memory => Arc::new(MemoryTaskStore::new()),
        TaskStoreKind::Json => Arc::new(JsonDirTaskStore::new(&config.store_dir)?),
    };
    Ok(store)
}

/// In-process store. Records are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<String, RenderTask>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for MemoryTaskStore {
    fn get(&self, task_id: &str) -> ReelResult<Option<RenderTask>> {
        Ok(self.tasks.read().get(task_id).cloned())
    }

    fn put(&self, task: &RenderTask) -> ReelResult<()> {
        self.tasks.write().insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn list(&self) -> ReelResult<Vec<RenderTask>> {
        Ok(self.tasks.read().values().cloned().collect())
    }
}

/// One `task_<id>.json` file per task under a directory.
#[derive(Debug, Clone)]
pub struct JsonDirTaskStore {
    dir: PathBuf,
}

impl JsonDirTaskStore {
    pub fn new(dir: impl Into<PathBuf>) -> ReelResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn task_path(&self, task_id: &str) -> ReelResult<PathBuf> {
        validate_task_key(task_id)?;
        Ok(self.dir.join(format!("task_{task_id}.json")))
    }
}

impl TaskStore for JsonDirTaskStore {
    fn get(&self, task_id: &str) -> ReelResult<Option<RenderTask>> {
        // No task was ever stored under an id that cannot be a file name.
        if !is_valid_task_key(task_id) {
            return Ok(None);
        }
        let path = self.task_path(task_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn put(&self, task: &RenderTask) -> ReelResult<()> {
        let path = self.task_path(&task.id)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(task)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn list(&self) -> ReelResult<Vec<RenderTask>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with("task_") || !name.ends_with(".json") {
                continue;
            }
            let parsed = std::fs::read_to_string(&path)
                .map_err(reelsmith_core::ReelError::from)
                .and_then(|raw| Ok(serde_json::from_str::<RenderTask>(&raw)?));
            match parsed {
                Ok(task) => out.push(task),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable task file")
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{RenderRequest, TaskStatus};

    fn exercise(store: &dyn TaskStore) {
        assert!(store.get("missing").unwrap().is_none());

        let mut task = RenderTask::new("abc-1", RenderRequest::new("demo"));
        store.put(&task).unwrap();
        task.start();
        store.put(&task).unwrap();

        let loaded = store.get("abc-1").unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Processing);
        assert_eq!(store.list().unwrap().len(), 1);

        store.put(&RenderTask::new("abc-2", RenderRequest::new("other"))).unwrap();
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryTaskStore::new());
    }

    #[test]
    fn test_json_dir_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirTaskStore::new(dir.path().join("tasks")).unwrap();
        exercise(&store);
        assert!(store.dir().join("task_abc-1.json").exists());

        // A second store over the same directory sees the same records.
        let reopened = JsonDirTaskStore::new(store.dir()).unwrap();
        assert_eq!(reopened.get("abc-2").unwrap().unwrap().request.topic, "other");
    }

    #[test]
    fn test_json_dir_store_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirTaskStore::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("task_broken.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        store.put(&RenderTask::new("ok", RenderRequest::new("demo"))).unwrap();

        let all = store.list().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "ok");
    }

    #[test]
    fn test_open_store_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TasksConfig::default();
        config.store = TaskStoreKind::Json;
        config.store_dir = dir.path().join("tasks");
        let store = open_store(&config).unwrap();
        store.put(&RenderTask::new("x", RenderRequest::new("demo"))).unwrap();
        assert!(config.store_dir.join("task_x.json").exists());
    }

    #[test]
    fn test_json_dir_store_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirTaskStore::new(dir.path()).unwrap();
        // Unknown on lookup, the same as the memory store.
        assert!(store.get("../etc/passwd").unwrap().is_none());
        assert!(store.get("abc.def").unwrap().is_none());
        assert!(MemoryTaskStore::new().get("abc.def").unwrap().is_none());
        // Never written.
        let err = store
            .put(&RenderTask::new("../escape", RenderRequest::new("demo")))
            .unwrap_err();
        assert!(err.to_string().contains("invalid task id"));
        assert!(!err.to_string().contains("bridge"));
    }
}
