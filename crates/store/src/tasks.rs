use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use framestack_protocol::RegisterFilePayload;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::persist::KeyValueStore;

/// Durable key holding the serialized task list.
pub const UPLOADS_KEY: &str = "uploads";

/// One file moving through the upload pipeline.
///
/// Cancellation is a capability held by the pipeline service, not a field
/// here, so the task serializes cleanly for durable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTask {
    /// Client-minted id, stable for the task's lifetime.
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    /// 0–100; non-decreasing while the task is not errored. Errored tasks
    /// are forced to 100 so the UI stops spinning, distinguished by
    /// `is_error`.
    pub progress_percent: u8,
    pub scope_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    /// Raw bytes fully in object storage; registration may still be pending.
    pub uploaded_to_transport: bool,
    pub is_error: bool,
    pub created_at: DateTime<Utc>,
}

impl UploadTask {
    /// Errored or fully acknowledged.
    pub fn is_terminal(&self) -> bool {
        self.is_error || self.progress_percent >= 100
    }
}

/// A transferred file waiting to be registered with the server.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationEntry {
    pub task_id: String,
    pub scope_id: String,
    pub payload: RegisterFilePayload,
}

/// Process-wide upload state (thread-safe).
///
/// Holds the visible task list (newest first) and the FIFO registration
/// queue. Every task-list mutation rewrites the durable copy in full; tasks
/// that finished cleanly are excluded from the durable copy so they do not
/// reappear after a restart. The registration queue is deliberately
/// transient.
pub struct UploadQueueStore {
    inner: RwLock<StoreInner>,
    kv: Arc<dyn KeyValueStore>,
}

struct StoreInner {
    uploads: Vec<UploadTask>,
    registration_queue: VecDeque<RegistrationEntry>,
}

impl UploadQueueStore {
    /// Creates an empty store backed by `kv`.
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                uploads: Vec::new(),
                registration_queue: VecDeque::new(),
            }),
            kv,
        }
    }

    /// Reloads tasks persisted by a previous session.
    ///
    /// Transfer sessions are never persisted, so restored tasks cannot be
    /// resumed: each one is marked errored (stalled) and shown as such
    /// until dismissed. Returns the number of restored tasks.
    pub fn restore(&self) -> usize {
        let raw = match self.kv.get(UPLOADS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return 0,
            Err(e) => {
                warn!(error = %e, "failed to read persisted uploads");
                return 0;
            }
        };

        let mut tasks: Vec<UploadTask> = match serde_json::from_str(&raw) {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(error = %e, "discarding unreadable persisted uploads");
                let _ = self.kv.delete(UPLOADS_KEY);
                return 0;
            }
        };

        for task in &mut tasks {
            task.is_error = true;
            task.progress_percent = 100;
        }

        let mut inner = self.inner.write().unwrap();
        let count = tasks.len();
        inner.uploads = tasks;
        self.persist_locked(&inner);
        count
    }

    /// Prepends a task. Any stale task with the same id is replaced, so an
    /// id appears at most once in the list.
    pub fn add_task(&self, task: UploadTask) {
        let mut inner = self.inner.write().unwrap();
        inner.uploads.retain(|t| t.id != task.id);
        inner.uploads.insert(0, task);
        self.persist_locked(&inner);
    }

    /// Updates a task's progress.
    ///
    /// Errored tasks are left alone, and progress never regresses. The
    /// durable copy is rewritten only when the task reaches 100 (which
    /// prunes it from the persisted list); intermediate progress does not
    /// need to survive a restart.
    pub fn set_progress(&self, id: &str, percent: u8) {
        let percent = percent.min(100);
        let mut inner = self.inner.write().unwrap();
        let Some(task) = inner.uploads.iter_mut().find(|t| t.id == id) else {
            return;
        };
        if task.is_error || percent <= task.progress_percent {
            return;
        }
        task.progress_percent = percent;
        if percent == 100 {
            self.persist_locked(&inner);
        }
    }

    /// Flags a task's raw bytes as fully stored.
    pub fn mark_transport_complete(&self, id: &str) {
        let mut inner = self.inner.write().unwrap();
        if let Some(task) = inner.uploads.iter_mut().find(|t| t.id == id) {
            task.uploaded_to_transport = true;
            self.persist_locked(&inner);
        }
    }

    /// Marks a task as terminally failed, forcing progress to 100.
    ///
    /// Returns `false` if the task is unknown or already errored, so
    /// callers can keep terminal notifications single-shot.
    pub fn mark_error(&self, id: &str) -> bool {
        let mut inner = self.inner.write().unwrap();
        let Some(task) = inner.uploads.iter_mut().find(|t| t.id == id) else {
            return false;
        };
        if task.is_error {
            return false;
        }
        task.is_error = true;
        task.progress_percent = 100;
        self.persist_locked(&inner);
        true
    }

    /// Drops a task from the visible list. Returns `true` if it existed.
    pub fn remove(&self, id: &str) -> bool {
        let mut inner = self.inner.write().unwrap();
        let len_before = inner.uploads.len();
        inner.uploads.retain(|t| t.id != id);
        let removed = inner.uploads.len() != len_before;
        if removed {
            self.persist_locked(&inner);
        }
        removed
    }

    /// Drops every errored or fully-acknowledged task ("clear finished").
    pub fn prune_terminal(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.uploads.retain(|t| !t.is_terminal());
        self.persist_locked(&inner);
    }

    /// Looks up a task by id.
    pub fn get(&self, id: &str) -> Option<UploadTask> {
        let inner = self.inner.read().unwrap();
        inner.uploads.iter().find(|t| t.id == id).cloned()
    }

    /// Snapshot of the visible task list, newest first.
    pub fn uploads(&self) -> Vec<UploadTask> {
        let inner = self.inner.read().unwrap();
        inner.uploads.clone()
    }

    /// Queues a transferred file for registration (FIFO, transient).
    pub fn enqueue_registration(&self, entry: RegistrationEntry) {
        let mut inner = self.inner.write().unwrap();
        inner.registration_queue.push_back(entry);
    }

    /// Pops the oldest queued entry for `scope_id`, if any.
    pub fn dequeue_registration(&self, scope_id: &str) -> Option<RegistrationEntry> {
        let mut inner = self.inner.write().unwrap();
        let pos = inner
            .registration_queue
            .iter()
            .position(|e| e.scope_id == scope_id)?;
        inner.registration_queue.remove(pos)
    }

    /// Whether any entry is queued for `scope_id`.
    pub fn has_queued(&self, scope_id: &str) -> bool {
        let inner = self.inner.read().unwrap();
        inner
            .registration_queue
            .iter()
            .any(|e| e.scope_id == scope_id)
    }

    /// Rewrites the durable copy from the current in-memory list.
    ///
    /// Tasks that completed without error are excluded. A failed durable
    /// write is logged and tolerated; the in-memory state stays
    /// authoritative for this session.
    fn persist_locked(&self, inner: &StoreInner) {
        let durable: Vec<&UploadTask> = inner
            .uploads
            .iter()
            .filter(|t| t.is_error || t.progress_percent < 100)
            .collect();

        let serialized = match serde_json::to_string(&durable) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to serialize uploads");
                return;
            }
        };
        if let Err(e) = self.kv.set(UPLOADS_KEY, &serialized) {
            warn!(error = %e, "failed to persist uploads");
        } else {
            debug!(tasks = durable.len(), "persisted upload list");
        }
    }
}
