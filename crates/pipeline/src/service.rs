//! The constructed upload service.
//!
//! One `UploadService` is created at application start and shared (via
//! `Arc`) with every surface that enqueues files or renders progress. It
//! owns the collaborator handles, the per-task cancellation tokens, and the
//! registration serializer; all terminal outcomes flow through the store
//! and the event channel, never as errors thrown at callers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use framestack_protocol::{RegisterFilePayload, StackPlacement};
use framestack_store::{RegistrationEntry, UploadQueueStore, UploadTask};
use framestack_transfer::{BlobTransport, ProgressFn, UploadLimits};

use crate::api::MetadataApi;
use crate::coordinator::FileUpload;
use crate::error::FailureKind;
use crate::events::UploadEvent;
use crate::submission::SubmissionLoop;

/// A local file handed to the pipeline.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub name: String,
    pub content_type: String,
    /// Local-only preview (e.g. an object URL); carried on the task and
    /// dropped with it.
    pub preview_url: Option<String>,
}

/// Facade over the whole upload pipeline.
pub struct UploadService {
    store: Arc<UploadQueueStore>,
    api: Arc<dyn MetadataApi>,
    transport: Arc<dyn BlobTransport>,
    limits: UploadLimits,
    submission: Arc<SubmissionLoop>,
    tokens: Mutex<HashMap<String, CancellationToken>>,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<UploadEvent>>>,
}

impl UploadService {
    /// Wires the service to its collaborators.
    pub fn new(
        store: Arc<UploadQueueStore>,
        api: Arc<dyn MetadataApi>,
        transport: Arc<dyn BlobTransport>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        let submission =
            SubmissionLoop::new(Arc::clone(&store), Arc::clone(&api), events_tx.clone());
        Self {
            store,
            api,
            transport,
            limits: UploadLimits::default(),
            submission,
            tokens: Mutex::new(HashMap::new()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Overrides the strategy thresholds (tests use scaled-down limits).
    pub fn with_limits(mut self, limits: UploadLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.lock().unwrap().take()
    }

    /// Snapshot of the visible task list, newest first.
    pub fn uploads(&self) -> Vec<UploadTask> {
        self.store.uploads()
    }

    /// Begins the pipeline for each file.
    ///
    /// Tasks appear in the store immediately; transfers run concurrently in
    /// background tasks, while registration stays serialized per scope.
    pub fn enqueue_files(
        self: &Arc<Self>,
        files: Vec<SourceFile>,
        scope_id: &str,
        folder_id: Option<String>,
        stack: Option<StackPlacement>,
    ) {
        for file in files {
            self.enqueue_file(file, scope_id, folder_id.clone(), stack.clone());
        }
    }

    /// Cancels a task's in-flight transfer and marks it errored.
    ///
    /// Synchronous from the caller's perspective: the task flips to its
    /// terminal state here, and whatever the transfer eventually resolves
    /// to is swallowed. Returns `false` (with no other effect) if the task
    /// is unknown or already terminal.
    pub fn cancel(&self, task_id: &str) -> bool {
        let Some(task) = self.store.get(task_id) else {
            return false;
        };
        if task.is_error {
            return false;
        }

        let token = self.tokens.lock().unwrap().remove(task_id);
        if let Some(token) = token {
            token.cancel();
        }

        if self.store.mark_error(task_id) {
            let _ = self.events_tx.try_send(UploadEvent::Failed {
                task_id: task_id.to_string(),
                kind: FailureKind::Cancelled,
                message: "upload cancelled".into(),
            });
            true
        } else {
            false
        }
    }

    /// Clears errored and finished tasks from the visible list.
    pub fn prune_finished(&self) {
        self.store.prune_terminal();
    }

    fn enqueue_file(
        self: &Arc<Self>,
        file: SourceFile,
        scope_id: &str,
        folder_id: Option<String>,
        stack: Option<StackPlacement>,
    ) {
        let task_id = uuid::Uuid::new_v4().to_string();

        let size_bytes = match std::fs::metadata(&file.path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!(file = %file.name, error = %e, "cannot read file for upload");
                let mut task = self.new_task(&task_id, &file, scope_id, folder_id, 0);
                task.is_error = true;
                task.progress_percent = 100;
                self.store.add_task(task);
                let _ = self.events_tx.try_send(UploadEvent::Failed {
                    task_id,
                    kind: FailureKind::Transport,
                    message: e.to_string(),
                });
                return;
            }
        };

        self.store
            .add_task(self.new_task(&task_id, &file, scope_id, folder_id.clone(), size_bytes));

        let cancel = CancellationToken::new();
        self.tokens
            .lock()
            .unwrap()
            .insert(task_id.clone(), cancel.clone());

        let service = Arc::clone(self);
        let scope_id = scope_id.to_string();
        tokio::spawn(async move {
            service
                .run_transfer(file, task_id, scope_id, folder_id, stack, size_bytes, cancel)
                .await;
        });
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_transfer(
        self: Arc<Self>,
        file: SourceFile,
        task_id: String,
        scope_id: String,
        folder_id: Option<String>,
        stack: Option<StackPlacement>,
        size_bytes: u64,
        cancel: CancellationToken,
    ) {
        let progress: ProgressFn = {
            let store = Arc::clone(&self.store);
            let id = task_id.clone();
            Arc::new(move |pct| store.set_progress(&id, pct))
        };

        let upload = FileUpload::new(self.api.as_ref(), self.transport.as_ref(), cancel)
            .with_limits(self.limits);
        let result = upload
            .run(
                &file.path,
                &file.name,
                &file.content_type,
                &scope_id,
                size_bytes,
                progress,
            )
            .await;

        self.tokens.lock().unwrap().remove(&task_id);

        match result {
            Ok(outcome) => {
                self.store.mark_transport_complete(&task_id);
                self.store.set_progress(&task_id, 100);
                let _ = self
                    .events_tx
                    .send(UploadEvent::TransportComplete {
                        task_id: task_id.clone(),
                    })
                    .await;

                let (stack_id, stack_with_file_id) = stack
                    .map(|s| (s.stack_id, s.stack_with_file_id))
                    .unwrap_or((None, None));
                self.store.enqueue_registration(RegistrationEntry {
                    task_id,
                    scope_id: scope_id.clone(),
                    payload: RegisterFilePayload {
                        storage_key: outcome.storage_key,
                        provisional_file_id: outcome.provisional_file_id,
                        content_type: file.content_type,
                        original_name: file.name,
                        size_bytes,
                        folder_id,
                        stack_id,
                        stack_with_file_id,
                    },
                });
                self.submission.kick(&scope_id);
            }
            Err(e) if e.is_cancelled() => {
                // cancel() already flipped the task; the late resolution of
                // the transfer is deliberately swallowed.
                debug!(task = %task_id, "transfer unwound after cancellation");
            }
            Err(e) => {
                warn!(task = %task_id, error = %e, "transfer failed");
                if self.store.mark_error(&task_id) {
                    let _ = self
                        .events_tx
                        .send(UploadEvent::Failed {
                            task_id,
                            kind: e.failure_kind(),
                            message: e.to_string(),
                        })
                        .await;
                }
            }
        }
    }

    fn new_task(
        &self,
        task_id: &str,
        file: &SourceFile,
        scope_id: &str,
        folder_id: Option<String>,
        size_bytes: u64,
    ) -> UploadTask {
        UploadTask {
            id: task_id.to_string(),
            name: file.name.clone(),
            mime_type: file.content_type.clone(),
            size_bytes,
            progress_percent: 0,
            scope_id: scope_id.to_string(),
            folder_id,
            preview_url: file.preview_url.clone(),
            uploaded_to_transport: false,
            is_error: false,
            created_at: Utc::now(),
        }
    }
}
