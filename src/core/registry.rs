/// Background operation tracking and per-configuration exclusion

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::task::AbortHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::error::OperationError;
use crate::core::operations::OperationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Dump,
    Restore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationRecord {
    pub id: Uuid,
    pub kind: OperationKind,
    pub config_name: String,
    pub status: OperationStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<OperationResult>,
    /// File the operation writes (dumps) or reads (restores)
    pub artifact: Option<PathBuf>,
}

struct Entry {
    record: OperationRecord,
    handle: Option<AbortHandle>,
}

/// Concurrent map of submitted operations
#[derive(Clone, Default)]
pub struct OperationRegistry {
    entries: Arc<RwLock<HashMap<Uuid, Entry>>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `work` and track it until it finishes or is cancelled
    pub fn submit<F>(
        &self,
        kind: OperationKind,
        config_name: impl Into<String>,
        artifact: Option<PathBuf>,
        work: F,
    ) -> Uuid
    where
        F: Future<Output = OperationResult> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let record = OperationRecord {
            id,
            kind,
            config_name: config_name.into(),
            status: OperationStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            result: None,
            artifact,
        };
        info!(%id, kind = ?kind, config = %record.config_name, "Operation submitted");

        // Insert before spawning so a fast task always finds its entry
        self.write().insert(id, Entry { record, handle: None });

        let entries = self.entries.clone();
        let task = tokio::spawn(async move {
            let result = work.await;
            let mut guard = entries.write().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = guard.get_mut(&id) {
                if entry.record.status == OperationStatus::Running {
                    entry.record.status = if result.success {
                        OperationStatus::Succeeded
                    } else {
                        OperationStatus::Failed
                    };
                    entry.record.finished_at = Some(Utc::now());
                    if let Some(path) = &result.path {
                        entry.record.artifact = Some(PathBuf::from(path));
                    }
                    entry.record.result = Some(result);
                    entry.handle = None;
                }
            }
        });

        if let Some(entry) = self.write().get_mut(&id) {
            if entry.record.status == OperationStatus::Running {
                entry.handle = Some(task.abort_handle());
            }
        }
        id
    }

    pub fn get(&self, id: &Uuid) -> Option<OperationRecord> {
        self.read().get(id).map(|e| e.record.clone())
    }

    /// All records, newest first
    pub fn list(&self) -> Vec<OperationRecord> {
        let mut records: Vec<_> = self.read().values().map(|e| e.record.clone()).collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        records
    }

    /// Abort a running operation; a dump's partial file is removed
    pub fn cancel(&self, id: &Uuid) -> Result<OperationRecord, OperationError> {
        let mut entries = self.write();
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| OperationError::NotFound(format!("Operation {} not found", id)))?;

        if entry.record.status != OperationStatus::Running {
            return Err(OperationError::Conflict(format!(
                "Operation {} is not running",
                id
            )));
        }

        if let Some(handle) = entry.handle.take() {
            handle.abort();
        }
        entry.record.status = OperationStatus::Cancelled;
        entry.record.finished_at = Some(Utc::now());

        if entry.record.kind == OperationKind::Dump {
            if let Some(path) = &entry.record.artifact {
                match std::fs::remove_file(path) {
                    Ok(()) => info!(path = %path.display(), "Removed partial dump"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial dump"),
                }
            }
        }

        info!(%id, "Operation cancelled");
        Ok(entry.record.clone())
    }

    /// Drop finished records older than `age`; returns how many went
    pub fn reap(&self, age: Duration) -> usize {
        let cutoff = Utc::now() - chrono::Duration::from_std(age).unwrap_or(chrono::Duration::zero());
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, e| match e.record.finished_at {
            Some(finished) => finished >= cutoff,
            None => true,
        });
        before - entries.len()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Uuid, Entry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, Entry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

type LockMap = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// Held for the duration of one operation on a configuration
pub struct ConfigGuard {
    name: String,
    lock: Arc<tokio::sync::Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    locks: LockMap,
}

impl ConfigGuard {
    pub fn config_name(&self) -> &str {
        &self.name
    }
}

impl Drop for ConfigGuard {
    fn drop(&mut self) {
        self.guard.take();
        // the map and this guard are the only owners once nobody else waits
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let idle = locks
            .get(&self.name)
            .is_some_and(|l| Arc::ptr_eq(l, &self.lock) && Arc::strong_count(&self.lock) == 2);
        if idle {
            locks.remove(&self.name);
        }
    }
}

/// At most one running operation per configuration name
#[derive(Clone, Default)]
pub struct ConfigLocks {
    locks: LockMap,
}

impl ConfigLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, name: &str) -> Result<ConfigGuard, OperationError> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };

        match lock.clone().try_lock_owned() {
            Ok(guard) => Ok(ConfigGuard {
                name: name.to_string(),
                lock,
                guard: Some(guard),
                locks: self.locks.clone(),
            }),
            Err(_) => Err(OperationError::Conflict(format!(
                "Another operation is already running for configuration '{}'",
                name
            ))),
        }
    }

    pub fn is_busy(&self, name: &str) -> bool {
        let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.get(name).map(|l| l.try_lock().is_err()).unwrap_or(false)
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
