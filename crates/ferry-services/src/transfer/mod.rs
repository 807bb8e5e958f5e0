//! Client-side transfer machinery: the owner's `TransferSession`, the
//! receiver's `ReceiveSession`, and the chunk protocol both speak over a
//! peer link.

pub mod assembler;
pub mod link;
pub mod receive;
pub mod sender;
pub mod session;
pub mod transport;

use std::path::Path;

use anyhow::{Context, Result};
use bytes::Bytes;

use ferry_core::{ConnectionId, FileMetadata, MetadataError, WireError};

pub use self::assembler::{AssemblyError, MISSING_REPORT_LIMIT};
use self::link::LinkState;

/// Owner-side notifications, one stream per `TransferSession`.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    StateChanged { peer: ConnectionId, state: LinkState },
    /// Share of the file the receiver has acknowledged.
    Progress { peer: ConnectionId, percent: u8, bytes: u64 },
    Failed { peer: ConnectionId, error: TransferError },
    /// The receiver's control connection went away.
    CounterpartGone { peer: ConnectionId },
}

/// Receiver-side notifications. A receiver has exactly one link, so no
/// peer key is needed.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiveEvent {
    StateChanged(LinkState),
    MetadataReceived(FileMetadata),
    Progress { percent: u8, bytes: u64 },
    Delivered(DeliveredFile),
    Failed(TransferError),
    /// The share ended, usually because the owner disconnected.
    CounterpartGone { message: String },
}

/// A negotiation payload the local transport produced. The client forwards
/// it over the control channel as a `signal` request.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundSignal {
    pub to: ConnectionId,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransferError {
    #[error("transport error: {0}")]
    Transport(String),
    /// `missing` lists at most the first `MISSING_REPORT_LIMIT` empty slots.
    #[error("transfer truncated: {missing_count} of {total} chunks missing")]
    Truncated {
        missing: Vec<u32>,
        missing_count: u32,
        total: u32,
    },
    #[error("unusable file description: {0}")]
    Plan(#[from] MetadataError),
    #[error("protocol violation: {0}")]
    Protocol(#[from] AssemblyError),
    #[error("bad frame: {0}")]
    Wire(#[from] WireError),
    #[error("unexpected {0} frame")]
    UnexpectedMessage(&'static str),
}

/// A file fully reassembled on the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredFile {
    pub name: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl DeliveredFile {
    /// blake3 of the contents, hex.
    pub fn digest(&self) -> String {
        blake3::hash(&self.data).to_hex().to_string()
    }
}

/// The file an owner offers.
#[derive(Debug, Clone)]
pub struct FileSource {
    pub metadata: FileMetadata,
    pub data: Bytes,
}

impl FileSource {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            metadata: FileMetadata::new(name, data.len() as u64, mime_type),
            data,
        }
    }

    /// Read a file from disk, guessing its MIME type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read file: {}", path.display()))?;

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(Self::new(name, mime_type, data))
    }

    pub fn digest(&self) -> String {
        blake3::hash(&self.data).to_hex().to_string()
    }
}
