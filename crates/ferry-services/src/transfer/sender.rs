//! Sending half of the chunk protocol.
//!
//! Emits `Metadata`, every `Chunk` in index order, then `Complete`. Pacing
//! is left to the caller: it asks `next_message` only when the transport
//! has room, and `next_message` itself holds back chunks while the ack
//! window is full.

use ferry_core::{ChunkMessage, ChunkPlan, MetadataError};

use super::FileSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPhase {
    Metadata,
    Chunks,
    Complete,
    /// Everything sent; waiting for the receiver's confirmation.
    Done,
}

/// Snapshot of a sender's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferState {
    pub phase: SendPhase,
    pub sent_chunks: u32,
    pub acked_chunks: u32,
    pub total_chunks: u32,
    pub acked_bytes: u64,
}

impl TransferState {
    pub fn in_flight(&self) -> u32 {
        self.sent_chunks - self.acked_chunks
    }
}

pub struct ChunkSender {
    source: FileSource,
    plan: ChunkPlan,
    ack_window: u32,
    phase: SendPhase,
    next_index: u32,
    acked: Vec<bool>,
    acked_chunks: u32,
    acked_bytes: u64,
}

impl ChunkSender {
    /// `ack_window` = 0 disables the window.
    pub fn new(source: FileSource, chunk_size: usize, ack_window: u32) -> Result<Self, MetadataError> {
        let plan = source.metadata.plan(chunk_size)?;
        let total = plan.total_chunks() as usize;
        Ok(Self {
            source,
            plan,
            ack_window,
            phase: SendPhase::Metadata,
            next_index: 0,
            acked: vec![false; total],
            acked_chunks: 0,
            acked_bytes: 0,
        })
    }

    pub fn total_chunks(&self) -> u32 {
        self.plan.total_chunks()
    }

    pub fn phase(&self) -> SendPhase {
        self.phase
    }

    fn in_flight(&self) -> u32 {
        self.next_index - self.acked_chunks
    }

    fn window_open(&self) -> bool {
        self.ack_window == 0 || self.in_flight() < self.ack_window
    }

    /// True when `next_message` would produce a frame right now.
    pub fn ready(&self) -> bool {
        match self.phase {
            SendPhase::Metadata | SendPhase::Complete => true,
            SendPhase::Chunks => self.window_open(),
            SendPhase::Done => false,
        }
    }

    /// Everything, including `Complete`, has been handed out.
    pub fn is_done(&self) -> bool {
        self.phase == SendPhase::Done
    }

    /// The next frame to send, or `None` if nothing may go out yet.
    pub fn next_message(&mut self) -> Option<ChunkMessage> {
        match self.phase {
            SendPhase::Metadata => {
                self.phase = if self.plan.total_chunks() == 0 {
                    SendPhase::Complete
                } else {
                    SendPhase::Chunks
                };
                Some(ChunkMessage::Metadata(self.source.metadata.clone()))
            }
            SendPhase::Chunks => {
                if !self.window_open() {
                    return None;
                }
                let index = self.next_index;
                let range = self.plan.range(index)?;
                let data = self.source.data.slice(range);
                self.next_index += 1;
                if self.next_index == self.plan.total_chunks() {
                    self.phase = SendPhase::Complete;
                }
                Some(ChunkMessage::Chunk {
                    index,
                    total: self.plan.total_chunks(),
                    data,
                })
            }
            SendPhase::Complete => {
                self.phase = SendPhase::Done;
                Some(ChunkMessage::Complete)
            }
            SendPhase::Done => None,
        }
    }

    /// Record an acknowledgement. Returns false for duplicates and for
    /// indices that were never sent.
    pub fn on_ack(&mut self, index: u32) -> bool {
        if index >= self.next_index {
            return false;
        }
        let Some(slot) = self.acked.get_mut(index as usize) else {
            return false;
        };
        if *slot {
            return false;
        }
        *slot = true;
        self.acked_chunks += 1;
        self.acked_bytes += self.plan.chunk_len(index).unwrap_or(0) as u64;
        true
    }

    /// Acknowledged share of the file: (percent, bytes).
    pub fn progress(&self) -> (u8, u64) {
        (self.plan.percent(self.acked_bytes), self.acked_bytes)
    }

    pub fn state(&self) -> TransferState {
        TransferState {
            phase: self.phase,
            sent_chunks: self.next_index,
            acked_chunks: self.acked_chunks,
            total_chunks: self.plan.total_chunks(),
            acked_bytes: self.acked_bytes,
        }
    }
}
