//! Terminal pipeline notifications for the UI layer.
//!
//! Progress is read reactively from the store snapshot; this channel only
//! carries the outcomes a UI would toast or merge into its read caches.

use crate::error::FailureKind;

/// A terminal (or near-terminal) upload outcome.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// Raw bytes are fully in object storage; registration is pending.
    TransportComplete { task_id: String },

    /// Registration succeeded. The records are the server's authoritative
    /// project/folder state for the UI to merge into its read caches.
    Registered {
        task_id: String,
        updated_scope_record: serde_json::Value,
        updated_parent_folder_record: Option<serde_json::Value>,
    },

    /// Terminal failure with a human-readable message.
    Failed {
        task_id: String,
        kind: FailureKind,
        message: String,
    },
}
