//! Client-side upload pipeline: strategy selection, chunked transfer
//! coordination, durable task state, and serialized registration.
//!
//! This crate implements the **business logic** for moving local files into
//! project storage. It is a library crate with no UI dependencies: the
//! application provides a [`MetadataApi`] implementation that bridges to
//! the actual REST client, and a [`BlobTransport`](framestack_transfer::BlobTransport)
//! for the presigned-URL byte pushes.
//!
//! # Pipeline
//!
//! 1. **Plan**: pick direct vs. chunked by file size
//! 2. **Grant**: obtain presigned destination(s) from the metadata API
//! 3. **Transfer**: push bytes, one sequential chunk at a time, publishing
//!    progress into the shared store
//! 4. **Finalize**: complete the multipart session
//! 5. **Register**: associate the stored blob with the project, strictly
//!    one call at a time per project

pub mod api;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod service;
mod submission;

pub use api::{ApiFuture, MetadataApi};
pub use coordinator::{FileUpload, TransportOutcome};
pub use error::{FailureKind, UploadError};
pub use events::UploadEvent;
pub use service::{SourceFile, UploadService};
