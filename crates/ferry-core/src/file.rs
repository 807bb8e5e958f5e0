//! File description and chunk arithmetic shared by sender and receiver.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// What the sender announces about the file it offers.
///
/// Serialized field names follow the browser `File` object (`name`, `size`,
/// `type`) so web clients can publish metadata without remapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub name: String,
    pub size: u64,
    #[serde(rename = "type", default)]
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    #[error("file name must not be empty")]
    EmptyName,
    #[error("chunk size must be non-zero")]
    ZeroChunkSize,
    #[error("{size} bytes at {chunk_size} bytes per chunk needs more than {} chunks", u32::MAX)]
    TooManyChunks { size: u64, chunk_size: usize },
}

impl FileMetadata {
    pub fn new(name: impl Into<String>, size: u64, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            mime_type: mime_type.into(),
        }
    }

    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.name.trim().is_empty() {
            return Err(MetadataError::EmptyName);
        }
        Ok(())
    }

    /// Chunk layout of this file for the given chunk size. `size` comes
    /// from the peer, so the chunk count is checked rather than assumed.
    pub fn plan(&self, chunk_size: usize) -> Result<ChunkPlan, MetadataError> {
        ChunkPlan::new(self.size, chunk_size)
    }
}

/// Splits `size` bytes into `ceil(size / chunk_size)` contiguous chunks.
/// Every chunk is `chunk_size` long except possibly the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    size: u64,
    chunk_size: usize,
    total_chunks: u32,
}

impl ChunkPlan {
    /// Fails when the chunk count does not fit the frame header's u32 index.
    pub fn new(size: u64, chunk_size: usize) -> Result<Self, MetadataError> {
        if chunk_size == 0 {
            return Err(MetadataError::ZeroChunkSize);
        }
        let total_chunks = u32::try_from(size.div_ceil(chunk_size as u64))
            .map_err(|_| MetadataError::TooManyChunks { size, chunk_size })?;
        Ok(Self {
            size,
            chunk_size,
            total_chunks,
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    /// Byte range of chunk `index`, or `None` past the end.
    pub fn range(&self, index: u32) -> Option<Range<usize>> {
        if index >= self.total_chunks {
            return None;
        }
        let start = index as u64 * self.chunk_size as u64;
        let end = (start + self.chunk_size as u64).min(self.size);
        let start = usize::try_from(start).ok()?;
        let end = usize::try_from(end).ok()?;
        Some(start..end)
    }

    /// Expected payload length of chunk `index`.
    pub fn chunk_len(&self, index: u32) -> Option<usize> {
        self.range(index).map(|r| r.len())
    }

    /// `round(done / size * 100)`; an empty file counts as fully done.
    pub fn percent(&self, done: u64) -> u8 {
        if self.size == 0 {
            return 100;
        }
        let done = done.min(self.size) as u128;
        let size = self.size as u128;
        ((done * 100 + size / 2) / size) as u8
    }
}
