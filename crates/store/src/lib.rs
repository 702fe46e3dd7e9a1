//! Process-wide upload state: the visible task list, the registration
//! queue, and the durable key/value seam that lets task metadata survive an
//! application restart.
//!
//! The store is constructed once at application start and handed to the
//! pipeline; all mutation goes through its synchronous operations.

mod persist;
mod tasks;

pub use persist::{FsKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use tasks::{RegistrationEntry, UPLOADS_KEY, UploadQueueStore, UploadTask};

/// Errors produced by the store crate.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}
