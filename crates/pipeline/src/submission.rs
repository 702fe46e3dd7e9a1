//! Registration serializer.
//!
//! The server's "attach file to project" operation mutates a shared
//! per-project document and is not safe to run concurrently, so queued
//! registrations drain strictly one at a time per scope, in enqueue order.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use framestack_store::{RegistrationEntry, UploadQueueStore};

use crate::api::MetadataApi;
use crate::error::FailureKind;
use crate::events::UploadEvent;

pub(crate) struct SubmissionLoop {
    store: Arc<UploadQueueStore>,
    api: Arc<dyn MetadataApi>,
    events_tx: mpsc::Sender<UploadEvent>,
    /// Scopes with an active drain task. Guarded re-checks around every
    /// await keep registration single-flight per scope.
    draining: Mutex<HashSet<String>>,
}

impl SubmissionLoop {
    pub(crate) fn new(
        store: Arc<UploadQueueStore>,
        api: Arc<dyn MetadataApi>,
        events_tx: mpsc::Sender<UploadEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            api,
            events_tx,
            draining: Mutex::new(HashSet::new()),
        })
    }

    /// Ensures a drain task is running for `scope_id`.
    ///
    /// Callers must enqueue into the store *before* kicking; if a drain is
    /// already active it will pick the new entry up on its next pass.
    pub(crate) fn kick(self: &Arc<Self>, scope_id: &str) {
        {
            let mut active = self.draining.lock().unwrap();
            if !active.insert(scope_id.to_string()) {
                return;
            }
        }

        let submission = Arc::clone(self);
        let scope = scope_id.to_string();
        tokio::spawn(async move {
            submission.drain(&scope).await;
        });
    }

    /// Pops and submits entries for one scope until the queue runs dry.
    async fn drain(&self, scope_id: &str) {
        loop {
            let entry = self.store.dequeue_registration(scope_id);
            let Some(entry) = entry else {
                let mut active = self.draining.lock().unwrap();
                // An entry may have been enqueued between the empty pop and
                // taking the guard; keep draining in that case.
                if self.store.has_queued(scope_id) {
                    continue;
                }
                active.remove(scope_id);
                return;
            };

            self.submit(entry).await;
        }
    }

    /// Issues exactly one registration call for one entry.
    ///
    /// A failed entry marks its own task errored and never blocks the rest
    /// of the queue.
    async fn submit(&self, entry: RegistrationEntry) {
        match self.store.get(&entry.task_id) {
            None => {
                debug!(task = %entry.task_id, "skipping registration for dismissed task");
                return;
            }
            Some(task) if task.is_error => {
                debug!(task = %entry.task_id, "skipping registration for cancelled task");
                return;
            }
            Some(_) => {}
        }

        match self
            .api
            .register_file(&entry.scope_id, entry.payload.clone())
            .await
        {
            Ok(outcome) => {
                info!(task = %entry.task_id, scope = %entry.scope_id, "file registered");
                self.store.remove(&entry.task_id);
                let _ = self
                    .events_tx
                    .send(UploadEvent::Registered {
                        task_id: entry.task_id,
                        updated_scope_record: outcome.updated_scope_record,
                        updated_parent_folder_record: outcome.updated_parent_folder_record,
                    })
                    .await;
            }
            Err(e) => {
                warn!(task = %entry.task_id, error = %e, "registration failed");
                if self.store.mark_error(&entry.task_id) {
                    let _ = self
                        .events_tx
                        .send(UploadEvent::Failed {
                            task_id: entry.task_id,
                            kind: FailureKind::Registration,
                            message: e.to_string(),
                        })
                        .await;
                }
            }
        }
    }
}
