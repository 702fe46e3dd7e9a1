use std::io::Read;
use std::path::Path;

use crate::{CHUNK_SIZE, TransferError};

/// One part of a file read for upload.
#[derive(Debug, Clone)]
pub struct FileChunk {
    /// Part number, starting at 1.
    pub part_number: u32,
    /// Byte offset within the file.
    pub offset: u64,
    /// Raw part data.
    pub data: Vec<u8>,
}

/// Reads a file in fixed-size parts, one part resident at a time.
///
/// Parts come back in ascending part-number order; only the last part may
/// be shorter than the configured size.
pub struct ChunkReader {
    file: std::fs::File,
    chunk_size: u64,
    offset: u64,
    file_size: u64,
    next_part: u32,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, [`CHUNK_SIZE`] (20 MiB) is used.
    pub fn new(path: &Path, chunk_size: u64) -> Result<Self, TransferError> {
        let file = std::fs::File::open(path)?;
        let file_size = file.metadata()?.len();
        let chunk_size = if chunk_size == 0 { CHUNK_SIZE } else { chunk_size };
        Ok(Self {
            file,
            chunk_size,
            offset: 0,
            file_size,
            next_part: 1,
        })
    }

    /// Reads the next part. Returns `None` at EOF.
    pub fn next_chunk(&mut self) -> Result<Option<FileChunk>, TransferError> {
        if self.offset >= self.file_size {
            return Ok(None);
        }

        let read_size = self.chunk_size.min(self.file_size - self.offset) as usize;
        let mut buf = vec![0u8; read_size];
        self.file.read_exact(&mut buf)?;

        let chunk = FileChunk {
            part_number: self.next_part,
            offset: self.offset,
            data: buf,
        };
        self.offset += read_size as u64;
        self.next_part += 1;
        Ok(Some(chunk))
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> u64 {
        self.file_size - self.offset
    }
}
