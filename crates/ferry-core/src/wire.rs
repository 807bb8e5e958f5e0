//! Ferry peer-link wire format: the frames exchanged over a direct link.
//!
//! Every transport message carries exactly one frame: a fixed 16-byte
//! `FrameHeader` followed by `length` payload bytes. Multi-byte header
//! fields are little-endian. The transport guarantees ordered, reliable
//! delivery, so frames carry no sequence numbers of their own.
//!
//! The header is a #[repr(C, packed)] zerocopy struct; there is no unsafe
//! code in this module.

use bytes::{BufMut, Bytes, BytesMut};
use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::file::FileMetadata;

// ── Frame Header ─────────────────────────────────────────────────────────────

/// Wire size: 16 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct FrameHeader {
    /// Frame format version. Currently 0x01.
    pub version: u8,

    /// Message kind, see `tag`.
    pub tag: u8,

    /// Reserved, must be zero.
    pub reserved: [u8; 2],

    /// Chunk index for Chunk and Ack frames, zero otherwise.
    pub index: u32,

    /// Total chunk count for Chunk frames, zero otherwise.
    pub total: u32,

    /// Payload length in bytes, not including this header.
    pub length: u32,
}

assert_eq_size!(FrameHeader, [u8; 16]);

pub const HEADER_LEN: usize = std::mem::size_of::<FrameHeader>();

/// Frame tags.
pub mod tag {
    pub const METADATA: u8 = 0x01;
    pub const CHUNK: u8 = 0x02;
    pub const COMPLETE: u8 = 0x03;
    pub const ACK: u8 = 0x04;
}

// ── Constants ─────────────────────────────────────────────────────────────────

/// Current frame format version.
pub const FRAME_VERSION: u8 = 0x01;

/// Chunk size used when configuration does not say otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 128 * 1024;

/// Largest chunk a single transport message may carry.
pub const MAX_CHUNK_SIZE: usize = 256 * 1024;

// ── Messages ──────────────────────────────────────────────────────────────────

/// Everything that travels over a peer link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkMessage {
    /// Sender → receiver, first frame of a transfer.
    Metadata(FileMetadata),
    /// Sender → receiver, one slice of the file.
    Chunk { index: u32, total: u32, data: Bytes },
    /// Sender → receiver: all chunks sent.
    /// Receiver → sender: every slot assembled, transfer accepted.
    Complete,
    /// Receiver → sender, chunk `index` stored.
    Ack { index: u32 },
}

impl ChunkMessage {
    pub fn name(&self) -> &'static str {
        match self {
            ChunkMessage::Metadata(_) => "metadata",
            ChunkMessage::Chunk { .. } => "chunk",
            ChunkMessage::Complete => "complete",
            ChunkMessage::Ack { .. } => "ack",
        }
    }

    /// Encode into one transport message.
    pub fn encode(&self) -> Result<Bytes, WireError> {
        let (tag, index, total, payload) = match self {
            ChunkMessage::Metadata(meta) => {
                let json = serde_json::to_vec(meta)
                    .map_err(|e| WireError::BadMetadata(e.to_string()))?;
                (tag::METADATA, 0, 0, Bytes::from(json))
            }
            ChunkMessage::Chunk { index, total, data } => {
                if data.len() > MAX_CHUNK_SIZE {
                    return Err(WireError::PayloadTooLarge(data.len()));
                }
                (tag::CHUNK, *index, *total, data.clone())
            }
            ChunkMessage::Complete => (tag::COMPLETE, 0, 0, Bytes::new()),
            ChunkMessage::Ack { index } => (tag::ACK, *index, 0, Bytes::new()),
        };

        let header = FrameHeader {
            version: FRAME_VERSION,
            tag,
            reserved: [0; 2],
            index: index.to_le(),
            total: total.to_le(),
            length: (payload.len() as u32).to_le(),
        };

        let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
        buf.put_slice(header.as_bytes());
        buf.put_slice(&payload);
        Ok(buf.freeze())
    }

    /// Decode one transport message. Chunk payloads are zero-copy slices
    /// of `frame`.
    pub fn decode(frame: &Bytes) -> Result<Self, WireError> {
        let header = FrameHeader::read_from_prefix(frame.as_ref()).ok_or(WireError::Truncated {
            expected: HEADER_LEN,
            actual: frame.len(),
        })?;

        if header.version != FRAME_VERSION {
            return Err(WireError::UnknownVersion(header.version));
        }
        if header.reserved != [0; 2] {
            return Err(WireError::ReservedBitsSet);
        }

        let length = u32::from_le(header.length) as usize;
        let index = u32::from_le(header.index);
        let total = u32::from_le(header.total);
        if frame.len() != HEADER_LEN + length {
            return Err(WireError::Truncated {
                expected: HEADER_LEN + length,
                actual: frame.len(),
            });
        }
        let payload = frame.slice(HEADER_LEN..);

        match header.tag {
            tag::METADATA => serde_json::from_slice(&payload)
                .map(ChunkMessage::Metadata)
                .map_err(|e| WireError::BadMetadata(e.to_string())),
            tag::CHUNK => {
                if length > MAX_CHUNK_SIZE {
                    return Err(WireError::PayloadTooLarge(length));
                }
                Ok(ChunkMessage::Chunk {
                    index,
                    total,
                    data: payload,
                })
            }
            tag::COMPLETE => Ok(ChunkMessage::Complete),
            tag::ACK => Ok(ChunkMessage::Ack { index }),
            other => Err(WireError::UnknownTag(other)),
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unknown frame version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("unknown frame tag: 0x{0:02x}")]
    UnknownTag(u8),

    #[error("reserved header bytes are non-zero")]
    ReservedBitsSet,

    #[error("frame length mismatch: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("payload length {0} exceeds maximum {}", MAX_CHUNK_SIZE)]
    PayloadTooLarge(usize),

    #[error("malformed metadata payload: {0}")]
    BadMetadata(String),
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_frame_layout() {
        let msg = ChunkMessage::Chunk {
            index: 2,
            total: 3,
            data: Bytes::from_static(b"abc"),
        };
        let frame = msg.encode().unwrap();
        assert_eq!(frame.len(), HEADER_LEN + 3);
        assert_eq!(frame[0], FRAME_VERSION);
        assert_eq!(frame[1], tag::CHUNK);
        assert_eq!(&frame[4..8], &2u32.to_le_bytes());
        assert_eq!(&frame[8..12], &3u32.to_le_bytes());
        assert_eq!(&frame[12..16], &3u32.to_le_bytes());
        assert_eq!(&frame[16..], b"abc");
        assert_eq!(ChunkMessage::decode(&frame).unwrap(), msg);
    }

    #[test]
    fn metadata_ack_and_complete_decode() {
        let meta = ChunkMessage::Metadata(FileMetadata::new("a.bin", 300_000, "application/zip"));
        for msg in [meta, ChunkMessage::Ack { index: 7 }, ChunkMessage::Complete] {
            let frame = msg.encode().unwrap();
            assert_eq!(ChunkMessage::decode(&frame).unwrap(), msg);
        }
    }

    #[test]
    fn rejects_unknown_version() {
        let mut frame = BytesMut::from(&ChunkMessage::Complete.encode().unwrap()[..]);
        frame[0] = 0x09;
        assert_eq!(
            ChunkMessage::decode(&frame.freeze()),
            Err(WireError::UnknownVersion(0x09))
        );
    }

    #[test]
    fn rejects_unknown_tag() {
        let mut frame = BytesMut::from(&ChunkMessage::Complete.encode().unwrap()[..]);
        frame[1] = 0x7f;
        assert_eq!(
            ChunkMessage::decode(&frame.freeze()),
            Err(WireError::UnknownTag(0x7f))
        );
    }

    #[test]
    fn rejects_short_and_inconsistent_frames() {
        assert!(matches!(
            ChunkMessage::decode(&Bytes::from_static(&[1, 2, 3])),
            Err(WireError::Truncated { expected: 16, actual: 3 })
        ));

        let frame = ChunkMessage::Chunk {
            index: 0,
            total: 1,
            data: Bytes::from_static(b"hello"),
        }
        .encode()
        .unwrap();
        let cut = frame.slice(..frame.len() - 1);
        assert!(matches!(
            ChunkMessage::decode(&cut),
            Err(WireError::Truncated { .. })
        ));
    }

    #[test]
    fn rejects_oversized_chunk() {
        let msg = ChunkMessage::Chunk {
            index: 0,
            total: 1,
            data: Bytes::from(vec![0u8; MAX_CHUNK_SIZE + 1]),
        };
        assert_eq!(
            msg.encode(),
            Err(WireError::PayloadTooLarge(MAX_CHUNK_SIZE + 1))
        );
    }

    #[test]
    fn malformed_metadata_is_an_error() {
        let header = FrameHeader {
            version: FRAME_VERSION,
            tag: tag::METADATA,
            reserved: [0; 2],
            index: 0,
            total: 0,
            length: 3u32.to_le(),
        };
        let mut buf = BytesMut::new();
        buf.put_slice(header.as_bytes());
        buf.put_slice(b"{{{");
        assert!(matches!(
            ChunkMessage::decode(&buf.freeze()),
            Err(WireError::BadMetadata(_))
        ));
    }
}
