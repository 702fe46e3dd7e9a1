fn main() {
    println!("Run `cargo test -p pipeline-flow` to execute the upload pipeline scenarios.");
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::path::Path;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use framestack_pipeline::{
        ApiFuture, FailureKind, MetadataApi, SourceFile, UploadError, UploadEvent, UploadService,
    };
    use framestack_protocol::{
        ChunkUrlGrant, CompletedPart, DirectUploadGrant, DirectUploadRequest,
        MultipartSessionGrant, MultipartSessionRequest, RegisterFilePayload, RegistrationOutcome,
        StackPlacement,
    };
    use framestack_store::{
        FsKeyValueStore, KeyValueStore, MemoryKeyValueStore, UPLOADS_KEY, UploadQueueStore,
        UploadTask,
    };
    use framestack_transfer::{BlobTransport, ProgressFn, PutBlob, TransferError, UploadLimits};

    /// Scaled thresholds: 1 MiB of the real constants becomes 1 byte, so a
    /// "45 MiB" fixture is a 45-byte file split into 20-byte parts.
    fn scaled_limits() -> UploadLimits {
        UploadLimits {
            direct_limit: 10,
            chunk_size: 20,
        }
    }

    /// Full-surface metadata API mock with an ordered call log.
    struct ScriptedApi {
        log: Mutex<Vec<String>>,
        register_payloads: Mutex<Vec<RegisterFilePayload>>,
        register_in_flight: AtomicUsize,
        register_max_in_flight: AtomicUsize,
        fail_register_for: Vec<String>,
    }

    impl ScriptedApi {
        fn new() -> Self {
            Self {
                log: Mutex::new(Vec::new()),
                register_payloads: Mutex::new(Vec::new()),
                register_in_flight: AtomicUsize::new(0),
                register_max_in_flight: AtomicUsize::new(0),
                fail_register_for: Vec::new(),
            }
        }

        fn failing_registration_for(names: &[&str]) -> Self {
            let mut api = Self::new();
            api.fail_register_for = names.iter().map(|n| n.to_string()).collect();
            api
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    impl MetadataApi for ScriptedApi {
        fn direct_upload_grant(
            &self,
            request: DirectUploadRequest,
        ) -> ApiFuture<'_, DirectUploadGrant> {
            self.log
                .lock()
                .unwrap()
                .push(format!("grant:{}", request.file_name));
            Box::pin(async move {
                Ok(DirectUploadGrant {
                    url: format!("https://storage.test/direct/{}", request.file_name),
                    storage_key: format!("scopes/{}/{}", request.scope_id, request.file_name),
                    provisional_file_id: format!("prov-{}", request.file_name),
                })
            })
        }

        fn start_multipart(
            &self,
            request: MultipartSessionRequest,
        ) -> ApiFuture<'_, MultipartSessionGrant> {
            self.log
                .lock()
                .unwrap()
                .push(format!("session:{}", request.file_name));
            Box::pin(async move {
                Ok(MultipartSessionGrant {
                    upload_id: format!("upload-{}", request.file_name),
                    storage_key: format!("scopes/{}/{}", request.scope_id, request.file_name),
                    provisional_file_id: format!("prov-{}", request.file_name),
                })
            })
        }

        fn chunk_upload_url(
            &self,
            _storage_key: &str,
            _upload_id: &str,
            part_number: u32,
        ) -> ApiFuture<'_, ChunkUrlGrant> {
            self.log.lock().unwrap().push(format!("url:{part_number}"));
            Box::pin(async move {
                Ok(ChunkUrlGrant {
                    url: format!("https://storage.test/part/{part_number}"),
                })
            })
        }

        fn complete_multipart(
            &self,
            _storage_key: &str,
            _upload_id: &str,
            parts: &[CompletedPart],
        ) -> ApiFuture<'_, ()> {
            let order: Vec<String> = parts.iter().map(|p| p.part_number.to_string()).collect();
            self.log
                .lock()
                .unwrap()
                .push(format!("complete:[{}]", order.join(",")));
            Box::pin(async move { Ok(()) })
        }

        fn register_file(
            &self,
            _scope_id: &str,
            payload: RegisterFilePayload,
        ) -> ApiFuture<'_, RegistrationOutcome> {
            self.log
                .lock()
                .unwrap()
                .push(format!("register:{}", payload.original_name));
            self.register_payloads.lock().unwrap().push(payload.clone());
            let fail = self.fail_register_for.contains(&payload.original_name);
            Box::pin(async move {
                let now = self.register_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.register_max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                self.register_in_flight.fetch_sub(1, Ordering::SeqCst);

                if fail {
                    Err(UploadError::Registration("attach rejected".into()))
                } else {
                    Ok(RegistrationOutcome {
                        updated_scope_record: serde_json::json!({
                            "id": "p1",
                            "fileCount": 1,
                        }),
                        updated_parent_folder_record: payload
                            .folder_id
                            .map(|id| serde_json::json!({"id": id})),
                    })
                }
            })
        }
    }

    /// Transport that acknowledges every PUT with an etag.
    struct AckTransport {
        put_sizes: Mutex<Vec<usize>>,
    }

    impl AckTransport {
        fn new() -> Self {
            Self {
                put_sizes: Mutex::new(Vec::new()),
            }
        }
    }

    impl BlobTransport for AckTransport {
        fn put(
            &self,
            blob: PutBlob,
            progress: ProgressFn,
            cancel: CancellationToken,
        ) -> Pin<Box<dyn Future<Output = Result<String, TransferError>> + Send + '_>> {
            let count = {
                let mut sizes = self.put_sizes.lock().unwrap();
                sizes.push(blob.body.len());
                sizes.len()
            };
            Box::pin(async move {
                if cancel.is_cancelled() {
                    return Err(TransferError::Cancelled);
                }
                progress(100);
                Ok(format!("etag-{count}"))
            })
        }
    }

    /// Transport that acknowledges the first PUT instantly and holds every
    /// later PUT open until its cancellation token fires, so a test can
    /// cancel a chunked upload while a middle part is in flight.
    struct StallAfterFirstTransport {
        puts: AtomicUsize,
    }

    impl StallAfterFirstTransport {
        fn new() -> Self {
            Self {
                puts: AtomicUsize::new(0),
            }
        }
    }

    impl BlobTransport for StallAfterFirstTransport {
        fn put(
            &self,
            _blob: PutBlob,
            progress: ProgressFn,
            cancel: CancellationToken,
        ) -> Pin<Box<dyn Future<Output = Result<String, TransferError>> + Send + '_>> {
            let count = self.puts.fetch_add(1, Ordering::SeqCst) + 1;
            Box::pin(async move {
                if count == 1 {
                    progress(100);
                    return Ok("etag-1".into());
                }
                cancel.cancelled().await;
                Err(TransferError::Cancelled)
            })
        }
    }

    fn write_file(dir: &Path, name: &str, len: usize) -> SourceFile {
        let path = dir.join(name);
        std::fs::write(&path, vec![b'x'; len]).unwrap();
        SourceFile {
            path,
            name: name.into(),
            content_type: "video/mp4".into(),
            preview_url: None,
        }
    }

    fn build_service(
        kv: Arc<dyn KeyValueStore>,
        api: Arc<ScriptedApi>,
        transport: Arc<dyn BlobTransport>,
    ) -> (Arc<UploadService>, mpsc::Receiver<UploadEvent>) {
        let store = Arc::new(UploadQueueStore::new(kv));
        let service =
            Arc::new(UploadService::new(store, api, transport).with_limits(scaled_limits()));
        let events = service.take_events().unwrap();
        (service, events)
    }

    async fn next_event(events: &mut mpsc::Receiver<UploadEvent>) -> UploadEvent {
        tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for upload event")
            .expect("event channel closed")
    }

    /// Waits until every enqueued task has left the pipeline (registered or
    /// errored), collecting events along the way.
    async fn collect_terminal_events(
        events: &mut mpsc::Receiver<UploadEvent>,
        terminal_count: usize,
    ) -> Vec<UploadEvent> {
        let mut terminal = Vec::new();
        while terminal.len() < terminal_count {
            let event = next_event(events).await;
            match event {
                UploadEvent::TransportComplete { .. } => {}
                other => terminal.push(other),
            }
        }
        terminal
    }

    #[tokio::test]
    async fn direct_upload_end_to_end() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let api = Arc::new(ScriptedApi::new());
        let transport = Arc::new(AckTransport::new());
        let (service, mut events) =
            build_service(kv.clone(), api.clone(), transport.clone());

        let dir = tempfile::tempdir().unwrap();
        // 5 "MiB": below the direct limit.
        service.enqueue_files(vec![write_file(dir.path(), "clip.mp4", 5)], "p1", None, None);

        let terminal = collect_terminal_events(&mut events, 1).await;
        assert!(matches!(&terminal[0], UploadEvent::Registered { .. }));

        assert_eq!(
            api.log(),
            vec!["grant:clip.mp4", "register:clip.mp4"],
            "direct path is one grant and one registration"
        );
        assert_eq!(*transport.put_sizes.lock().unwrap(), vec![5]);

        // Gone from the visible list and from durable storage.
        assert!(service.uploads().is_empty());
        let persisted: Vec<UploadTask> =
            serde_json::from_str(&kv.get(UPLOADS_KEY).unwrap().unwrap()).unwrap();
        assert!(persisted.is_empty());
    }

    #[tokio::test]
    async fn chunked_upload_end_to_end() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let api = Arc::new(ScriptedApi::new());
        let transport = Arc::new(AckTransport::new());
        let (service, mut events) =
            build_service(kv.clone(), api.clone(), transport.clone());

        let dir = tempfile::tempdir().unwrap();
        // 45 "MiB" with 20 "MiB" parts: 20/20/5.
        service.enqueue_files(
            vec![write_file(dir.path(), "feature.mov", 45)],
            "p1",
            None,
            None,
        );

        let terminal = collect_terminal_events(&mut events, 1).await;
        assert!(matches!(&terminal[0], UploadEvent::Registered { .. }));

        assert_eq!(
            api.log(),
            vec![
                "session:feature.mov",
                "url:1",
                "url:2",
                "url:3",
                "complete:[1,2,3]",
                "register:feature.mov",
            ]
        );
        assert_eq!(*transport.put_sizes.lock().unwrap(), vec![20, 20, 5]);
        assert!(service.uploads().is_empty());
    }

    #[tokio::test]
    async fn cancel_mid_chunked_upload_never_registers() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let api = Arc::new(ScriptedApi::new());
        let transport = Arc::new(StallAfterFirstTransport::new());
        let (service, mut events) = build_service(kv, api.clone(), transport);

        let dir = tempfile::tempdir().unwrap();
        service.enqueue_files(
            vec![write_file(dir.path(), "feature.mov", 45)],
            "p1",
            None,
            None,
        );

        // Part 1 acknowledges; part 2 stalls. Wait until part 2 is in
        // flight, then cancel.
        tokio::time::timeout(Duration::from_secs(2), async {
            while !api.log().iter().any(|l| l == "url:2") {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("part 2 never started");

        let task_id = service.uploads()[0].id.clone();
        assert!(service.cancel(&task_id));

        let event = next_event(&mut events).await;
        assert!(matches!(
            event,
            UploadEvent::Failed {
                kind: FailureKind::Cancelled,
                ..
            }
        ));

        // Let the unwound transfer settle; the session must never be
        // finalized and the file must never be registered.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let log = api.log();
        assert!(!log.iter().any(|l| l.starts_with("complete")), "{log:?}");
        assert!(!log.iter().any(|l| l.starts_with("register")), "{log:?}");

        let task = service.uploads()[0].clone();
        assert!(task.is_error);
        assert_eq!(task.progress_percent, 100);
    }

    #[tokio::test]
    async fn stack_placement_reaches_the_registration_payload() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let api = Arc::new(ScriptedApi::new());
        let transport = Arc::new(AckTransport::new());
        let (service, mut events) = build_service(kv, api.clone(), transport);

        let dir = tempfile::tempdir().unwrap();
        service.enqueue_files(
            vec![write_file(dir.path(), "take-2.mp4", 5)],
            "p1",
            Some("folder-3".into()),
            Some(StackPlacement {
                stack_id: Some("stack-1".into()),
                stack_with_file_id: None,
            }),
        );

        let terminal = collect_terminal_events(&mut events, 1).await;
        assert!(matches!(&terminal[0], UploadEvent::Registered { .. }));

        let payloads = api.register_payloads.lock().unwrap();
        assert_eq!(payloads.len(), 1);
        let payload = &payloads[0];
        assert_eq!(payload.storage_key, "scopes/p1/take-2.mp4");
        assert_eq!(payload.provisional_file_id, "prov-take-2.mp4");
        assert_eq!(payload.original_name, "take-2.mp4");
        assert_eq!(payload.size_bytes, 5);
        assert_eq!(payload.folder_id.as_deref(), Some("folder-3"));
        assert_eq!(payload.stack_id.as_deref(), Some("stack-1"));
        assert!(payload.stack_with_file_id.is_none());
    }

    #[tokio::test]
    async fn concurrent_finishers_register_one_at_a_time() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let api = Arc::new(ScriptedApi::new());
        let transport = Arc::new(AckTransport::new());
        let (service, mut events) = build_service(kv, api.clone(), transport);

        let dir = tempfile::tempdir().unwrap();
        let files: Vec<SourceFile> = (0..5)
            .map(|i| write_file(dir.path(), &format!("clip-{i}.mp4"), 5))
            .collect();
        service.enqueue_files(files, "p1", None, None);

        let terminal = collect_terminal_events(&mut events, 5).await;
        assert!(terminal
            .iter()
            .all(|e| matches!(e, UploadEvent::Registered { .. })));

        // However many transfers finished at once, the attach calls never
        // overlapped.
        assert_eq!(api.register_max_in_flight.load(Ordering::SeqCst), 1);
        assert!(service.uploads().is_empty());
    }

    #[tokio::test]
    async fn registration_failure_does_not_block_other_files() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let api = Arc::new(ScriptedApi::failing_registration_for(&["bad.mp4"]));
        let transport = Arc::new(AckTransport::new());
        let (service, mut events) = build_service(kv, api.clone(), transport);

        let dir = tempfile::tempdir().unwrap();
        service.enqueue_files(
            vec![
                write_file(dir.path(), "bad.mp4", 5),
                write_file(dir.path(), "good.mp4", 5),
            ],
            "p1",
            None,
            None,
        );

        let terminal = collect_terminal_events(&mut events, 2).await;
        let registered: Vec<&UploadEvent> = terminal
            .iter()
            .filter(|e| matches!(e, UploadEvent::Registered { .. }))
            .collect();
        let failed: Vec<&UploadEvent> = terminal
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    UploadEvent::Failed {
                        kind: FailureKind::Registration,
                        ..
                    }
                )
            })
            .collect();
        assert_eq!(registered.len(), 1);
        assert_eq!(failed.len(), 1);

        // The failed task stays visible as errored; the good one is gone.
        let uploads = service.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].name, "bad.mp4");
        assert!(uploads[0].is_error);
        assert_eq!(uploads[0].progress_percent, 100);
    }

    #[tokio::test]
    async fn registered_folder_record_reaches_the_event_stream() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let api = Arc::new(ScriptedApi::new());
        let transport = Arc::new(AckTransport::new());
        let (service, mut events) = build_service(kv, api, transport);

        let dir = tempfile::tempdir().unwrap();
        service.enqueue_files(
            vec![write_file(dir.path(), "clip.mp4", 5)],
            "p1",
            Some("folder-7".into()),
            None,
        );

        let terminal = collect_terminal_events(&mut events, 1).await;
        let UploadEvent::Registered {
            updated_scope_record,
            updated_parent_folder_record,
            ..
        } = &terminal[0]
        else {
            panic!("expected a Registered event, got {:?}", terminal[0]);
        };
        assert_eq!(updated_scope_record["id"], "p1");
        assert_eq!(updated_parent_folder_record.as_ref().unwrap()["id"], "folder-7");
    }

    #[tokio::test]
    async fn interrupted_session_restores_as_stalled() {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("state");

        // First session: a task persists at add time and is never finished
        // (the process "reloads" before the transfer completes).
        {
            let kv = Arc::new(FsKeyValueStore::new(&state_dir).unwrap());
            let store = UploadQueueStore::new(kv);
            store.add_task(UploadTask {
                id: "t1".into(),
                name: "clip.mp4".into(),
                mime_type: "video/mp4".into(),
                size_bytes: 45,
                progress_percent: 0,
                scope_id: "p1".into(),
                folder_id: None,
                preview_url: None,
                uploaded_to_transport: false,
                is_error: false,
                created_at: chrono::Utc::now(),
            });
            store.set_progress("t1", 40);
        }

        // Second session: the task comes back as stalled, since transfer
        // sessions are never persisted and it cannot resume.
        let kv = Arc::new(FsKeyValueStore::new(&state_dir).unwrap());
        let store = UploadQueueStore::new(kv);
        assert_eq!(store.restore(), 1);

        let task = store.get("t1").unwrap();
        assert!(task.is_error);
        assert_eq!(task.progress_percent, 100);
    }
}
