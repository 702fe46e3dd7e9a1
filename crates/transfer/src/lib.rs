//! Upload strategy planning and presigned-URL byte transfer.
//!
//! Files below [`DIRECT_UPLOAD_LIMIT`] go up in one PUT; larger files are
//! split into fixed [`CHUNK_SIZE`] parts, each sent to its own presigned
//! URL and acknowledged with a storage integrity tag (ETag).

mod executor;
mod planner;
mod reader;

pub use executor::{BlobTransport, HttpTransport, ProgressFn, PutBlob, percent};
pub use planner::{ChunkSpan, UploadLimits, UploadStrategy, combine_chunk_progress, plan_upload};
pub use reader::{ChunkReader, FileChunk};

/// Largest file size (exclusive) still uploaded in a single request: 10 MiB.
pub const DIRECT_UPLOAD_LIMIT: u64 = 10 * 1024 * 1024;

/// Fixed part size for chunked uploads: 20 MiB. The last part may be shorter.
pub const CHUNK_SIZE: u64 = 20 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("destination rejected upload: HTTP {0}")]
    RejectedStatus(u16),

    #[error("response missing integrity tag")]
    MissingIntegrityTag,

    #[error("cancelled")]
    Cancelled,
}
