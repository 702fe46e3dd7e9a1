//! Upload failure taxonomy.

use framestack_transfer::TransferError;

/// Errors produced while moving a file through the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata API error: {0}")]
    Api(String),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("registration failed: {0}")]
    Registration(String),

    #[error("cancelled")]
    Cancelled,
}

/// Coarse failure category surfaced to the UI.
///
/// `Cancelled` is kept distinct so an intentional cancellation does not
/// render as a generic failure toast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transport,
    Cancelled,
    Registration,
}

impl UploadError {
    /// Whether this failure was requested by the user.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            UploadError::Cancelled | UploadError::Transfer(TransferError::Cancelled)
        )
    }

    pub fn failure_kind(&self) -> FailureKind {
        if self.is_cancelled() {
            FailureKind::Cancelled
        } else if matches!(self, UploadError::Registration(_)) {
            FailureKind::Registration
        } else {
            FailureKind::Transport
        }
    }
}
