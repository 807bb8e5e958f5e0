//! Connection lifecycle: cleanup when a control connection ends.

use ferry_core::ConnectionId;

use crate::connections::Notifier;
use crate::registry::{RemovalReport, SessionRegistry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReport {
    pub connection: ConnectionId,
    /// False when the connection had already been torn down.
    pub was_registered: bool,
    pub removal: RemovalReport,
}

/// Cleans up after a closed connection. This is the only place that mutates
/// several share sessions in one operation.
#[derive(Clone)]
pub struct ConnectionLifecycleManager {
    notifier: Notifier,
    registry: SessionRegistry,
}

impl ConnectionLifecycleManager {
    pub fn new(notifier: Notifier, registry: SessionRegistry) -> Self {
        Self { notifier, registry }
    }

    /// Stop relaying to `connection`, then drop it from every share.
    /// Calling this twice for one connection is harmless.
    pub fn on_disconnect(&self, connection: ConnectionId) -> DisconnectReport {
        let was_registered = self.notifier.unregister(&connection);
        let removal = self.registry.remove_connection(&connection);

        tracing::info!(
            connection = %connection.short(),
            shares_ended = removal.ended.len(),
            shares_left = removal.left.len(),
            "connection closed"
        );

        DisconnectReport {
            connection,
            was_registered,
            removal,
        }
    }
}
