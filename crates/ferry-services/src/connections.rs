//! Every live control connection and its outbox.

use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;

use ferry_core::{ConnectionId, ServerMessage};

/// A live control connection. The receiving half of `outbox` is drained by
/// the connection's socket task, so pushes to one connection stay in order.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub outbox: mpsc::UnboundedSender<ServerMessage>,
    pub connected_at: Instant,
}

/// Shared across all tasks.
pub type ConnectionTable = Arc<DashMap<ConnectionId, ConnectionHandle>>;

/// Create a new empty connection table.
pub fn new_connection_table() -> ConnectionTable {
    Arc::new(DashMap::new())
}

/// Delivers server pushes to connections by id. Cheap to clone.
#[derive(Clone)]
pub struct Notifier {
    connections: ConnectionTable,
}

impl Notifier {
    pub fn new(connections: ConnectionTable) -> Self {
        Self { connections }
    }

    /// Register a new connection under a fresh id.
    pub fn register(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        loop {
            let id = ConnectionId::generate();
            if let Entry::Vacant(slot) = self.connections.entry(id) {
                slot.insert(ConnectionHandle {
                    outbox: tx,
                    connected_at: Instant::now(),
                });
                tracing::debug!(connection = %id.short(), "connection registered");
                return (id, rx);
            }
        }
    }

    /// Drop a connection's outbox. Returns false if it was not registered.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        self.connections.remove(id).is_some()
    }

    /// Push `message` to `to`. Returns false when the connection is gone;
    /// callers treat that as a silent drop.
    pub fn send(&self, to: &ConnectionId, message: ServerMessage) -> bool {
        match self.connections.get(to) {
            Some(handle) => handle.outbox.send(message).is_ok(),
            None => false,
        }
    }

    pub fn is_connected(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
