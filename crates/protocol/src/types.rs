use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Upload grants
// ---------------------------------------------------------------------------

/// Requests a presigned URL for a single-shot upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectUploadRequest {
    pub file_name: String,
    pub content_type: String,
    pub scope_id: String,
}

/// A presigned destination for a single-shot upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectUploadGrant {
    pub url: String,
    pub storage_key: String,
    pub provisional_file_id: String,
}

/// Requests a new multipart upload session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartSessionRequest {
    pub file_name: String,
    pub content_type: String,
    pub scope_id: String,
}

/// An open multipart session.
///
/// Chunk URLs are issued one part at a time against `upload_id` +
/// `storage_key`; the session is finalized with the ordered part list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartSessionGrant {
    pub upload_id: String,
    pub storage_key: String,
    pub provisional_file_id: String,
}

/// A presigned destination for one part of a multipart session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUrlGrant {
    pub url: String,
}

/// A storage acknowledgment for one uploaded part.
///
/// Parts are numbered from 1; `integrity_tag` is the storage layer's ETag
/// for the part, required to finalize the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPart {
    pub part_number: u32,
    pub integrity_tag: String,
}

// ---------------------------------------------------------------------------
// File registration
// ---------------------------------------------------------------------------

/// Placement of a new file into an existing version stack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackPlacement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_with_file_id: Option<String>,
}

/// Associates an already-stored blob with a project.
///
/// Sent after the raw bytes are fully in object storage; this is the call
/// that makes the blob visible as a project asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterFilePayload {
    pub storage_key: String,
    pub provisional_file_id: String,
    pub content_type: String,
    pub original_name: String,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_with_file_id: Option<String>,
}

/// Authoritative records returned by a successful registration.
///
/// The records are opaque to the upload pipeline; the UI layer merges them
/// into whatever read caches it maintains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOutcome {
    pub updated_scope_record: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_parent_folder_record: Option<serde_json::Value>,
}
