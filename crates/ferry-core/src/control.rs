//! Control-channel schema between participants and the rendezvous daemon.
//!
//! Every client request carries an `id` and receives exactly one `Reply` with
//! the same id. Everything else the server sends is an unsolicited push.
//! Signal payloads are opaque: they belong to whatever negotiation protocol
//! the peer transport speaks and are relayed untouched.

use serde::{Deserialize, Serialize};

use crate::file::FileMetadata;
use crate::ids::{ConnectionId, ShareId};

/// Client → server envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMessage {
    pub id: u64,
    pub request: ClientRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    CreateShare,
    JoinShare {
        share_id: ShareId,
    },
    /// Owner only.
    PublishMetadata {
        share_id: ShareId,
        metadata: FileMetadata,
    },
    /// Receiver only; relayed to the owner as `DownloadRequested`.
    RequestDownload {
        share_id: ShareId,
    },
    Signal {
        to: ConnectionId,
        payload: serde_json::Value,
    },
}

impl ClientRequest {
    pub fn name(&self) -> &'static str {
        match self {
            ClientRequest::CreateShare => "create_share",
            ClientRequest::JoinShare { .. } => "join_share",
            ClientRequest::PublishMetadata { .. } => "publish_metadata",
            ClientRequest::RequestDownload { .. } => "request_download",
            ClientRequest::Signal { .. } => "signal",
        }
    }
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First message on every connection.
    Welcome { connection_id: ConnectionId },

    /// Answer to the request with the same `id`.
    Reply { id: u64, reply: Reply },

    /// Fan-out of newly published metadata to every receiver of a share.
    FileMetadata {
        share_id: ShareId,
        metadata: FileMetadata,
    },

    /// To the owner: a receiver wants the file.
    DownloadRequested {
        share_id: ShareId,
        receiver_id: ConnectionId,
    },

    /// Relayed negotiation payload.
    Signal {
        from: ConnectionId,
        payload: serde_json::Value,
    },

    /// To the owner after every successful join.
    ReceiverJoined {
        share_id: ShareId,
        receiver_id: ConnectionId,
        total_receivers: usize,
    },

    /// To the owner when a receiver's connection ends.
    ReceiverDisconnected {
        share_id: ShareId,
        receiver_id: ConnectionId,
        total_receivers: usize,
    },

    /// To every receiver when the share is gone.
    ShareEnded { share_id: ShareId, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    ShareCreated { share_id: ShareId },
    Joined(JoinResult),
    Accepted,
    Failed { error: ErrorKind, message: String },
}

/// Result of `join_share`. `file_metadata` is present when the owner has
/// already published it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_metadata: Option<FileMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl JoinResult {
    pub fn joined(file_metadata: Option<FileMetadata>) -> Self {
        Self {
            success: true,
            message: None,
            file_metadata,
            error: None,
        }
    }

    pub fn failed(error: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            file_metadata: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    InvalidRequest,
}
