//! Per-file upload coordination.
//!
//! One [`FileUpload`] drives one file from strategy selection through byte
//! transfer to multipart finalization. Chunks go up strictly one at a time
//! in ascending part order, so only one chunk is resident in memory and the
//! part acknowledgments arrive already ordered for the completion call.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use framestack_protocol::{CompletedPart, DirectUploadRequest, MultipartSessionRequest};
use framestack_transfer::{
    BlobTransport, ChunkReader, ProgressFn, PutBlob, UploadLimits, UploadStrategy,
    combine_chunk_progress,
};

use crate::api::MetadataApi;
use crate::error::UploadError;

/// What the transport phase leaves behind: enough to register the blob.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportOutcome {
    pub storage_key: String,
    pub provisional_file_id: String,
}

/// Coordinates the transfer of a single file.
pub struct FileUpload<'a> {
    api: &'a dyn MetadataApi,
    transport: &'a dyn BlobTransport,
    limits: UploadLimits,
    cancel: CancellationToken,
}

impl<'a> FileUpload<'a> {
    pub fn new(
        api: &'a dyn MetadataApi,
        transport: &'a dyn BlobTransport,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            api,
            transport,
            limits: UploadLimits::default(),
            cancel,
        }
    }

    /// Overrides the strategy thresholds (tests use scaled-down limits).
    pub fn with_limits(mut self, limits: UploadLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Transfers the file's bytes into object storage.
    ///
    /// `on_progress` receives whole-file progress as 0–100. The returned
    /// future resolves exactly once; after cancellation the caller can
    /// safely drop the eventual result.
    pub async fn run(
        &self,
        path: &Path,
        file_name: &str,
        content_type: &str,
        scope_id: &str,
        size_bytes: u64,
        on_progress: ProgressFn,
    ) -> Result<TransportOutcome, UploadError> {
        self.check_cancelled()?;

        match self.limits.plan(size_bytes) {
            UploadStrategy::Direct => {
                debug!(file = %file_name, bytes = size_bytes, "direct upload");
                self.direct(path, file_name, content_type, scope_id, on_progress)
                    .await
            }
            UploadStrategy::Chunked {
                chunk_size,
                total_chunks,
            } => {
                debug!(
                    file = %file_name,
                    bytes = size_bytes,
                    parts = total_chunks,
                    "chunked upload"
                );
                self.chunked(
                    path,
                    file_name,
                    content_type,
                    scope_id,
                    chunk_size,
                    total_chunks,
                    on_progress,
                )
                .await
            }
        }
    }

    /// Single-shot path: one grant, one PUT.
    async fn direct(
        &self,
        path: &Path,
        file_name: &str,
        content_type: &str,
        scope_id: &str,
        on_progress: ProgressFn,
    ) -> Result<TransportOutcome, UploadError> {
        let grant = self
            .api
            .direct_upload_grant(DirectUploadRequest {
                file_name: file_name.to_string(),
                content_type: content_type.to_string(),
                scope_id: scope_id.to_string(),
            })
            .await?;

        self.check_cancelled()?;
        let data = tokio::fs::read(path).await?;

        self.transport
            .put(
                PutBlob {
                    url: grant.url,
                    content_type: content_type.to_string(),
                    body: Bytes::from(data),
                },
                on_progress,
                self.cancel.clone(),
            )
            .await?;

        info!(file = %file_name, key = %grant.storage_key, "transfer complete");
        Ok(TransportOutcome {
            storage_key: grant.storage_key,
            provisional_file_id: grant.provisional_file_id,
        })
    }

    /// Multipart path: open a session, push parts sequentially, finalize.
    #[allow(clippy::too_many_arguments)]
    async fn chunked(
        &self,
        path: &Path,
        file_name: &str,
        content_type: &str,
        scope_id: &str,
        chunk_size: u64,
        total_chunks: u32,
        on_progress: ProgressFn,
    ) -> Result<TransportOutcome, UploadError> {
        let session = self
            .api
            .start_multipart(MultipartSessionRequest {
                file_name: file_name.to_string(),
                content_type: content_type.to_string(),
                scope_id: scope_id.to_string(),
            })
            .await?;

        let mut reader = tokio::task::spawn_blocking({
            let path = path.to_path_buf();
            move || ChunkReader::new(&path, chunk_size)
        })
        .await
        .map_err(|e| UploadError::Upload(format!("task join error: {e}")))??;

        let mut parts: Vec<CompletedPart> = Vec::with_capacity(total_chunks as usize);
        let mut completed: u32 = 0;

        loop {
            // A cancellation requested between parts takes effect here,
            // before any further network traffic.
            self.check_cancelled()?;

            let (returned, chunk) = tokio::task::spawn_blocking({
                let mut r = reader;
                move || {
                    let chunk = r.next_chunk();
                    (r, chunk)
                }
            })
            .await
            .map_err(|e| UploadError::Upload(format!("task join error: {e}")))?;
            reader = returned;

            let Some(chunk) = chunk? else {
                break;
            };

            let grant = self
                .api
                .chunk_upload_url(&session.storage_key, &session.upload_id, chunk.part_number)
                .await?;

            let part_progress: ProgressFn = {
                let on_progress = Arc::clone(&on_progress);
                Arc::new(move |pct| {
                    on_progress(combine_chunk_progress(completed, pct, total_chunks))
                })
            };

            let integrity_tag = self
                .transport
                .put(
                    PutBlob {
                        url: grant.url,
                        content_type: content_type.to_string(),
                        body: Bytes::from(chunk.data),
                    },
                    part_progress,
                    self.cancel.clone(),
                )
                .await?;

            parts.push(CompletedPart {
                part_number: chunk.part_number,
                integrity_tag,
            });
            completed += 1;
            on_progress(combine_chunk_progress(completed, 0, total_chunks));
            debug!(file = %file_name, part = chunk.part_number, "part acknowledged");
        }

        self.check_cancelled()?;
        self.api
            .complete_multipart(&session.storage_key, &session.upload_id, &parts)
            .await?;

        info!(
            file = %file_name,
            key = %session.storage_key,
            parts = parts.len(),
            "transfer complete"
        );
        Ok(TransportOutcome {
            storage_key: session.storage_key,
            provisional_file_id: session.provisional_file_id,
        })
    }

    fn check_cancelled(&self) -> Result<(), UploadError> {
        if self.cancel.is_cancelled() {
            Err(UploadError::Cancelled)
        } else {
            Ok(())
        }
    }
}
