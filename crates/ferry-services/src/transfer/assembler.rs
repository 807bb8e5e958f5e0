//! Receiving half of the chunk protocol: collects chunks into slots and
//! concatenates them once the sender says it is done.

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};

use ferry_core::{ChunkPlan, FileMetadata, MetadataError};

use super::{DeliveredFile, TransferError};

/// How many missing indices a `Truncated` error spells out.
pub const MISSING_REPORT_LIMIT: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssemblyError {
    #[error("chunk index {index} out of range (total {total})")]
    IndexOutOfRange { index: u32, total: u32 },
    #[error("chunk claims {got} total chunks, metadata implies {expected}")]
    TotalMismatch { expected: u32, got: u32 },
    #[error("chunk {0} received twice")]
    DuplicateChunk(u32),
    #[error("chunk {index} is {got} bytes, expected {expected}")]
    LengthMismatch { index: u32, expected: usize, got: usize },
    #[error("assembled {got} bytes, metadata declares {expected}")]
    SizeMismatch { expected: u64, got: u64 },
}

/// Where an assembly stands after accepting a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyState {
    pub received_chunks: u32,
    pub total_chunks: u32,
    pub received_bytes: u64,
    pub percent: u8,
}

/// Chunks are kept by index as they arrive. Nothing is sized from the
/// announced metadata up front, so a bogus `size` cannot force a huge
/// allocation.
pub struct ChunkAssembler {
    metadata: FileMetadata,
    plan: ChunkPlan,
    chunks: BTreeMap<u32, Bytes>,
    received_bytes: u64,
}

impl ChunkAssembler {
    /// Fails when the metadata cannot be split at `chunk_size`.
    pub fn new(metadata: FileMetadata, chunk_size: usize) -> Result<Self, MetadataError> {
        let plan = metadata.plan(chunk_size)?;
        Ok(Self {
            metadata,
            plan,
            chunks: BTreeMap::new(),
            received_bytes: 0,
        })
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    pub fn total_chunks(&self) -> u32 {
        self.plan.total_chunks()
    }

    fn received_chunks(&self) -> u32 {
        // Bounded by `total_chunks`, which is a u32.
        self.chunks.len() as u32
    }

    pub fn state(&self) -> AssemblyState {
        AssemblyState {
            received_chunks: self.received_chunks(),
            total_chunks: self.plan.total_chunks(),
            received_bytes: self.received_bytes,
            percent: self.plan.percent(self.received_bytes),
        }
    }

    pub fn accept(&mut self, index: u32, total: u32, data: Bytes) -> Result<AssemblyState, AssemblyError> {
        let expected_total = self.plan.total_chunks();
        if total != expected_total {
            return Err(AssemblyError::TotalMismatch {
                expected: expected_total,
                got: total,
            });
        }
        let Some(expected_len) = self.plan.chunk_len(index) else {
            return Err(AssemblyError::IndexOutOfRange { index, total });
        };
        if self.chunks.contains_key(&index) {
            return Err(AssemblyError::DuplicateChunk(index));
        }
        if data.len() != expected_len {
            return Err(AssemblyError::LengthMismatch {
                index,
                expected: expected_len,
                got: data.len(),
            });
        }

        self.received_bytes += data.len() as u64;
        self.chunks.insert(index, data);
        Ok(self.state())
    }

    /// Concatenate every chunk in index order. Any missing chunk fails the
    /// whole file, and so does a byte count that disagrees with the
    /// metadata.
    pub fn finish(self) -> Result<DeliveredFile, TransferError> {
        let total = self.plan.total_chunks();
        let missing_count = total - self.received_chunks();
        if missing_count > 0 {
            let missing = (0..total)
                .filter(|i| !self.chunks.contains_key(i))
                .take(MISSING_REPORT_LIMIT)
                .collect();
            return Err(TransferError::Truncated {
                missing,
                missing_count,
                total,
            });
        }
        if self.received_bytes != self.metadata.size {
            return Err(AssemblyError::SizeMismatch {
                expected: self.metadata.size,
                got: self.received_bytes,
            }
            .into());
        }

        let capacity = usize::try_from(self.received_bytes).unwrap_or(0);
        let mut data = BytesMut::with_capacity(capacity);
        for chunk in self.chunks.into_values() {
            data.extend_from_slice(&chunk);
        }
        Ok(DeliveredFile {
            name: self.metadata.name,
            mime_type: self.metadata.mime_type,
            data: data.freeze(),
        })
    }
}
