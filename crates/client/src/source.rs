use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::TransferError;
use crate::planner::{chunk_range, total_chunks};

/// Reads one chunk of a local file at a time, addressed by 1-based chunk
/// number rather than sequentially, so resumed transfers can start
/// anywhere.
pub struct ChunkSource {
    file: std::fs::File,
    file_size: u64,
    chunk_size: u64,
}

impl ChunkSource {
    /// Opens `path` for chunked reading. `chunk_size` must be non-zero.
    pub fn open(path: &Path, chunk_size: u64) -> Result<Self, TransferError> {
        let file = std::fs::File::open(path)?;
        let file_size = file.metadata()?.len();
        Ok(Self {
            file,
            file_size,
            chunk_size,
        })
    }

    /// Reads exactly the bytes of `chunk_number`. A short read is an
    /// error: the file changed size underneath the transfer.
    pub fn read_chunk(&mut self, chunk_number: u32) -> Result<Vec<u8>, TransferError> {
        let range = chunk_range(chunk_number, self.chunk_size, self.file_size);
        self.file.seek(SeekFrom::Start(range.start))?;
        let mut buf = vec![0u8; (range.end - range.start) as usize];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Number of chunks this file needs.
    pub fn total_chunks(&self) -> u32 {
        total_chunks(self.file_size, self.chunk_size)
    }
}
