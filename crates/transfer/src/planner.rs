use crate::{CHUNK_SIZE, DIRECT_UPLOAD_LIMIT};

/// Size thresholds driving strategy selection.
///
/// Production code uses [`UploadLimits::default`]; tests scale the limits
/// down to keep fixture files small.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    /// Sizes strictly below this go up in a single request.
    pub direct_limit: u64,
    /// Fixed part size for chunked uploads.
    pub chunk_size: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            direct_limit: DIRECT_UPLOAD_LIMIT,
            chunk_size: CHUNK_SIZE,
        }
    }
}

/// How a file of a given size should be transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStrategy {
    /// One presigned URL, one PUT of the whole file.
    Direct,
    /// A multipart session with `total_chunks` sequential parts.
    Chunked { chunk_size: u64, total_chunks: u32 },
}

/// One part's byte range within the file.
///
/// Parts are numbered from 1 and cover `[0, size)` contiguously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub part_number: u32,
    pub offset: u64,
    pub length: u64,
}

impl UploadLimits {
    /// Picks the strategy for a file of `size_bytes`.
    pub fn plan(&self, size_bytes: u64) -> UploadStrategy {
        if size_bytes < self.direct_limit {
            return UploadStrategy::Direct;
        }
        UploadStrategy::Chunked {
            chunk_size: self.chunk_size,
            total_chunks: size_bytes.div_ceil(self.chunk_size) as u32,
        }
    }

    /// Computes the part ranges for a chunked upload of `size_bytes`.
    pub fn chunk_spans(&self, size_bytes: u64) -> Vec<ChunkSpan> {
        let mut spans = Vec::new();
        let mut offset: u64 = 0;
        let mut part_number: u32 = 1;
        while offset < size_bytes {
            let length = self.chunk_size.min(size_bytes - offset);
            spans.push(ChunkSpan {
                part_number,
                offset,
                length,
            });
            offset += length;
            part_number += 1;
        }
        spans
    }
}

/// Picks the strategy for `size_bytes` using the production limits.
pub fn plan_upload(size_bytes: u64) -> UploadStrategy {
    UploadLimits::default().plan(size_bytes)
}

/// Folds one part's 0–100 progress into whole-file progress.
///
/// `completed_chunks` parts are fully acknowledged and the current part is
/// at `chunk_percent`.
pub fn combine_chunk_progress(completed_chunks: u32, chunk_percent: u8, total_chunks: u32) -> u8 {
    if total_chunks == 0 {
        return 100;
    }
    let combined =
        (completed_chunks as f64 * 100.0 + chunk_percent as f64) / total_chunks as f64;
    combined.round().min(100.0) as u8
}
