//! Share registry: the process-wide table of active share sessions.
//!
//! Every mutation of one session happens under that session's DashMap entry
//! lock, so concurrent joins, leaves and metadata publications for the same
//! share are serialized. Locks are never held across an await point; pushes
//! go out through the `Notifier`'s unbounded outboxes while the entry is
//! still locked, which keeps fan-out ordered with respect to membership.

use std::sync::Arc;
use std::time::{Instant, SystemTime};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use ferry_core::{ConnectionId, ErrorKind, FileMetadata, ServerMessage, ShareId};

use crate::connections::Notifier;

/// Message receivers see when the owner's connection goes away.
pub const OWNER_DISCONNECTED: &str = "File sender disconnected";

/// One share: an owner, what it offers, and who joined.
#[derive(Debug, Clone)]
pub struct ShareSession {
    pub share_id: ShareId,
    pub owner: ConnectionId,
    pub metadata: Option<FileMetadata>,
    /// Unique, in join order.
    pub receivers: Vec<ConnectionId>,
    pub created_at: SystemTime,
    pub created_instant: Instant,
}

impl ShareSession {
    fn new(share_id: ShareId, owner: ConnectionId) -> Self {
        Self {
            share_id,
            owner,
            metadata: None,
            receivers: Vec::new(),
            created_at: SystemTime::now(),
            created_instant: Instant::now(),
        }
    }

    pub fn has_receiver(&self, id: &ConnectionId) -> bool {
        self.receivers.contains(id)
    }

    /// Deliver `message` to every current receiver. Returns how many
    /// outboxes accepted it.
    pub fn fan_out(&self, notifier: &Notifier, message: &ServerMessage) -> usize {
        self.receivers
            .iter()
            .filter(|r| notifier.send(r, message.clone()))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("share {0} not found or expired")]
    NotFound(ShareId),
    /// A share reference that is not even a well-formed id. No such share
    /// can exist, so it is reported like any other unknown share.
    #[error("share {0:?} not found or expired")]
    MalformedShareId(String),
    #[error("connection {connection} may not {action} share {share_id}")]
    Unauthorized {
        share_id: ShareId,
        connection: ConnectionId,
        action: &'static str,
    },
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
    #[error("owner cannot join its own share {0}")]
    SelfJoin(ShareId),
}

impl RegistryError {
    /// Wire-level classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::NotFound(_) | RegistryError::MalformedShareId(_) => ErrorKind::NotFound,
            RegistryError::Unauthorized { .. } => ErrorKind::Unauthorized,
            RegistryError::InvalidMetadata(_) | RegistryError::SelfJoin(_) => {
                ErrorKind::InvalidRequest
            }
        }
    }
}

/// Successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joined {
    pub receiver_count: usize,
    pub metadata: Option<FileMetadata>,
}

/// What `remove_connection` tore down.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RemovalReport {
    /// Shares the connection owned, with the receivers that were told.
    pub ended: Vec<(ShareId, Vec<ConnectionId>)>,
    /// Shares the connection had joined, with the remaining receiver count.
    pub left: Vec<(ShareId, usize)>,
}

impl RemovalReport {
    pub fn is_empty(&self) -> bool {
        self.ended.is_empty() && self.left.is_empty()
    }
}

/// The share registry. Cheap to clone; all clones see the same table.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<ShareId, ShareSession>>,
    notifier: Notifier,
}

impl SessionRegistry {
    pub fn new(notifier: Notifier) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            notifier,
        }
    }

    /// Allocate a new share owned by `owner`, with no metadata and no receivers.
    pub fn create_session(&self, owner: ConnectionId) -> ShareId {
        loop {
            let share_id = ShareId::generate();
            if let Entry::Vacant(slot) = self.sessions.entry(share_id) {
                slot.insert(ShareSession::new(share_id, owner));
                tracing::info!(
                    share = %share_id.short(),
                    owner = %owner.short(),
                    "share created"
                );
                return share_id;
            }
        }
    }

    /// Snapshot of one share.
    pub fn lookup(&self, share_id: &ShareId) -> Result<ShareSession, RegistryError> {
        self.sessions
            .get(share_id)
            .map(|s| s.value().clone())
            .ok_or(RegistryError::NotFound(*share_id))
    }

    /// Store metadata published by the owner and fan it out to every receiver.
    /// Returns the number of receivers notified.
    pub fn set_metadata(
        &self,
        share_id: &ShareId,
        requester: ConnectionId,
        metadata: FileMetadata,
    ) -> Result<usize, RegistryError> {
        let mut session = self
            .sessions
            .get_mut(share_id)
            .ok_or(RegistryError::NotFound(*share_id))?;

        if session.owner != requester {
            tracing::warn!(
                share = %share_id.short(),
                requester = %requester.short(),
                "metadata publish from non-owner rejected"
            );
            return Err(RegistryError::Unauthorized {
                share_id: *share_id,
                connection: requester,
                action: "publish metadata for",
            });
        }
        metadata
            .validate()
            .map_err(|e| RegistryError::InvalidMetadata(e.to_string()))?;

        if session.metadata.is_some() {
            tracing::warn!(share = %share_id.short(), "owner replaced published metadata");
        }
        tracing::info!(
            share = %share_id.short(),
            name = %metadata.name,
            size = metadata.size,
            mime = %metadata.mime_type,
            "metadata published"
        );
        session.metadata = Some(metadata.clone());

        let push = ServerMessage::FileMetadata {
            share_id: *share_id,
            metadata,
        };
        Ok(session.fan_out(&self.notifier, &push))
    }

    /// Add `connection` to the share's receivers. Joining twice is not an
    /// error and does not duplicate the entry. The owner is told the
    /// current count after every successful join.
    pub fn add_receiver(
        &self,
        share_id: &ShareId,
        connection: ConnectionId,
    ) -> Result<Joined, RegistryError> {
        let mut session = self
            .sessions
            .get_mut(share_id)
            .ok_or(RegistryError::NotFound(*share_id))?;

        if session.owner == connection {
            return Err(RegistryError::SelfJoin(*share_id));
        }
        if !session.has_receiver(&connection) {
            session.receivers.push(connection);
        }
        let receiver_count = session.receivers.len();

        tracing::info!(
            share = %share_id.short(),
            receiver = %connection.short(),
            receivers = receiver_count,
            "receiver joined"
        );
        self.notifier.send(
            &session.owner,
            ServerMessage::ReceiverJoined {
                share_id: *share_id,
                receiver_id: connection,
                total_receivers: receiver_count,
            },
        );

        Ok(Joined {
            receiver_count,
            metadata: session.metadata.clone(),
        })
    }

    /// Tell the owner that `receiver` wants the file. Only joined receivers
    /// may ask.
    pub fn request_download(
        &self,
        share_id: &ShareId,
        receiver: ConnectionId,
    ) -> Result<(), RegistryError> {
        let session = self
            .sessions
            .get(share_id)
            .ok_or(RegistryError::NotFound(*share_id))?;

        if !session.has_receiver(&receiver) {
            return Err(RegistryError::Unauthorized {
                share_id: *share_id,
                connection: receiver,
                action: "download from",
            });
        }

        tracing::info!(
            share = %share_id.short(),
            receiver = %receiver.short(),
            "download requested"
        );
        self.notifier.send(
            &session.owner,
            ServerMessage::DownloadRequested {
                share_id: *share_id,
                receiver_id: receiver,
            },
        );
        Ok(())
    }

    /// Forget everything `connection` was part of: shares it owns end (their
    /// receivers are told), shares it joined lose it (their owners are told).
    pub fn remove_connection(&self, connection: &ConnectionId) -> RemovalReport {
        let mut report = RemovalReport::default();

        // Collect first; DashMap iterators hold shard read locks.
        let owned: Vec<ShareId> = self
            .sessions
            .iter()
            .filter(|e| e.owner == *connection)
            .map(|e| *e.key())
            .collect();

        for share_id in owned {
            if let Some(session) = self.end_share(&share_id, OWNER_DISCONNECTED) {
                report.ended.push((share_id, session.receivers));
            }
        }

        let joined: Vec<ShareId> = self
            .sessions
            .iter()
            .filter(|e| e.has_receiver(connection))
            .map(|e| *e.key())
            .collect();

        for share_id in joined {
            let Some(mut session) = self.sessions.get_mut(&share_id) else {
                continue;
            };
            let before = session.receivers.len();
            session.receivers.retain(|r| r != connection);
            if session.receivers.len() == before {
                continue;
            }
            let remaining = session.receivers.len();

            tracing::info!(
                share = %share_id.short(),
                receiver = %connection.short(),
                receivers = remaining,
                "receiver left"
            );
            self.notifier.send(
                &session.owner,
                ServerMessage::ReceiverDisconnected {
                    share_id,
                    receiver_id: *connection,
                    total_receivers: remaining,
                },
            );
            report.left.push((share_id, remaining));
        }

        report
    }

    /// Remove a share and tell its receivers why. Returns the removed session.
    pub fn end_share(&self, share_id: &ShareId, message: &str) -> Option<ShareSession> {
        let session = self.destroy(share_id)?;
        let push = ServerMessage::ShareEnded {
            share_id: *share_id,
            message: message.to_string(),
        };
        let notified = session.fan_out(&self.notifier, &push);
        tracing::info!(
            share = %share_id.short(),
            notified,
            reason = message,
            "share ended"
        );
        Some(session)
    }

    /// Remove a share without notifying anyone.
    pub fn destroy(&self, share_id: &ShareId) -> Option<ShareSession> {
        self.sessions.remove(share_id).map(|(_, s)| s)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of every share, oldest first.
    pub fn snapshot(&self) -> Vec<ShareSession> {
        let mut all: Vec<ShareSession> = self.sessions.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|s| s.created_instant);
        all
    }
}
