//! Wire payload types for the upload metadata API.
//!
//! The metadata API issues presigned storage URLs, finalizes multipart
//! sessions, and registers already-stored blobs as project assets. This
//! crate holds the serde payload structs for those operations; the actual
//! HTTP/transport binding lives with the caller.
//!
//! All payloads serialize as `camelCase` to match the server's JSON.

mod types;

pub use types::{
    ChunkUrlGrant, CompletedPart, DirectUploadGrant, DirectUploadRequest, MultipartSessionGrant,
    MultipartSessionRequest, RegisterFilePayload, RegistrationOutcome, StackPlacement,
};
