//! Metadata API collaborator trait.
//!
//! The application implements this on top of its REST client. Using a
//! dyn-compatible trait keeps upload logic decoupled from HTTP details and
//! testable with queued-response mocks.

use std::future::Future;
use std::pin::Pin;

use framestack_protocol::{
    ChunkUrlGrant, CompletedPart, DirectUploadGrant, DirectUploadRequest, MultipartSessionGrant,
    MultipartSessionRequest, RegisterFilePayload, RegistrationOutcome,
};

use crate::error::UploadError;

/// Boxed future returned by [`MetadataApi`] operations.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, UploadError>> + Send + 'a>>;

/// Abstract handle to the metadata API.
///
/// The five operations the pipeline depends on. Implementations must not
/// borrow the request arguments past the call (clone what the future
/// needs).
pub trait MetadataApi: Send + Sync {
    /// Issues a presigned URL plus provisional file record for a
    /// single-shot upload.
    fn direct_upload_grant(&self, request: DirectUploadRequest)
    -> ApiFuture<'_, DirectUploadGrant>;

    /// Opens a multipart session.
    fn start_multipart(
        &self,
        request: MultipartSessionRequest,
    ) -> ApiFuture<'_, MultipartSessionGrant>;

    /// Issues a presigned URL for one part of an open session.
    fn chunk_upload_url(
        &self,
        storage_key: &str,
        upload_id: &str,
        part_number: u32,
    ) -> ApiFuture<'_, ChunkUrlGrant>;

    /// Finalizes a session from the ordered part acknowledgments.
    fn complete_multipart(
        &self,
        storage_key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> ApiFuture<'_, ()>;

    /// Associates a fully-stored blob with a project/folder/stack.
    fn register_file(
        &self,
        scope_id: &str,
        payload: RegisterFilePayload,
    ) -> ApiFuture<'_, RegistrationOutcome>;
}
