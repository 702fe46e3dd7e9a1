use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::TransferError;

/// Size of the streamed request-body frames used for progress reporting.
const BODY_FRAME_SIZE: usize = 64 * 1024;

/// Callback receiving 0–100 progress for a single request.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// One blob bound for a presigned destination URL.
#[derive(Debug, Clone)]
pub struct PutBlob {
    pub url: String,
    pub content_type: String,
    pub body: Bytes,
}

/// Transport seam for presigned-URL uploads.
///
/// The production implementation is [`HttpTransport`]; tests substitute
/// mocks with queued outcomes. The returned future resolves exactly once:
/// with the storage integrity tag (ETag) on success, or a single
/// [`TransferError`] on failure or cancellation.
pub trait BlobTransport: Send + Sync {
    /// Performs exactly one PUT of `blob.body` to `blob.url`.
    ///
    /// `progress` receives the fraction of *this* request's bytes handed to
    /// the transport, as 0–100. Cancelling `cancel` aborts the request; no
    /// further progress is reported after the future resolves.
    fn put(
        &self,
        blob: PutBlob,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<String, TransferError>> + Send + '_>>;
}

/// `reqwest`-backed transport for presigned object-storage URLs.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobTransport for HttpTransport {
    fn put(
        &self,
        blob: PutBlob,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<String, TransferError>> + Send + '_>> {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }

            let total = blob.body.len() as u64;
            debug!(url = %blob.url, bytes = total, "starting blob PUT");

            let request = self
                .client
                .put(&blob.url)
                .header(reqwest::header::CONTENT_TYPE, &blob.content_type)
                .header(reqwest::header::CONTENT_LENGTH, total)
                .body(progress_body(blob.body.clone(), Arc::clone(&progress)))
                .send();

            let response = tokio::select! {
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                result = request => result?,
            };

            let status = response.status();
            if !status.is_success() {
                return Err(TransferError::RejectedStatus(status.as_u16()));
            }

            let tag = response
                .headers()
                .get(reqwest::header::ETAG)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim_matches('"').to_string())
                .ok_or(TransferError::MissingIntegrityTag)?;

            progress(100);
            Ok(tag)
        })
    }
}

/// Percentage of `sent` out of `total`, saturating at 100.
pub fn percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((sent as f64 / total as f64) * 100.0).floor().min(100.0) as u8
}

/// Splits `data` into frames, tagging each with the cumulative percentage
/// once that frame has been handed to the transport.
fn body_frames(data: Bytes) -> impl Iterator<Item = (Bytes, u8)> {
    let total = data.len() as u64;
    let mut offset = 0usize;
    std::iter::from_fn(move || {
        if offset >= data.len() {
            return None;
        }
        let end = (offset + BODY_FRAME_SIZE).min(data.len());
        let frame = data.slice(offset..end);
        offset = end;
        Some((frame, percent(offset as u64, total)))
    })
}

/// Wraps `data` in a streaming request body that reports progress as the
/// transport pulls frames.
fn progress_body(data: Bytes, progress: ProgressFn) -> reqwest::Body {
    let frames = body_frames(data).map(move |(frame, pct)| {
        progress(pct);
        Ok::<Bytes, std::io::Error>(frame)
    });
    reqwest::Body::wrap_stream(futures_util::stream::iter(frames))
}
