//! Control hub. Turns control-channel requests into registry and relay
//! operations. Transport-agnostic: the WebSocket layer hands it parsed
//! frames and writes back whatever it returns.

use serde_json::Value;
use tokio::sync::mpsc;

use ferry_core::{
    ClientMessage, ClientRequest, ConnectionId, ErrorKind, JoinResult, Reply, ServerMessage,
    ShareId,
};

use crate::connections::{ConnectionTable, Notifier};
use crate::lifecycle::{ConnectionLifecycleManager, DisconnectReport};
use crate::registry::{RegistryError, SessionRegistry};
use crate::signaling::SignalingRelay;

/// Shown to a receiver whose join names an unknown share.
pub const SHARE_NOT_FOUND: &str = "Share not found or expired";

#[derive(Clone)]
pub struct ControlHub {
    notifier: Notifier,
    registry: SessionRegistry,
    relay: SignalingRelay,
    lifecycle: ConnectionLifecycleManager,
}

impl ControlHub {
    pub fn new(connections: ConnectionTable) -> Self {
        let notifier = Notifier::new(connections);
        let registry = SessionRegistry::new(notifier.clone());
        Self {
            relay: SignalingRelay::new(notifier.clone()),
            lifecycle: ConnectionLifecycleManager::new(notifier.clone(), registry.clone()),
            notifier,
            registry,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Register a new connection. Its outbox already holds the `Welcome`.
    pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let (connection_id, rx) = self.notifier.register();
        self.notifier
            .send(&connection_id, ServerMessage::Welcome { connection_id });
        (connection_id, rx)
    }

    pub fn disconnect(&self, connection: ConnectionId) -> DisconnectReport {
        self.lifecycle.on_disconnect(connection)
    }

    /// Parse and handle one text frame. The reply carries the frame's `id`
    /// whenever one can be read, even if the request itself is malformed;
    /// frames without a readable id are answered under id 0.
    pub fn handle_text(&self, from: ConnectionId, text: &str) -> ServerMessage {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => return malformed(from, 0, &e),
        };
        let id = value.get("id").and_then(Value::as_u64).unwrap_or(0);
        let request = value.get("request").cloned().unwrap_or(Value::Null);

        match serde_json::from_value::<ClientMessage>(value) {
            Ok(message) => self.handle(from, message),
            Err(e) => match malformed_share_id(&request) {
                Some(err) => {
                    tracing::info!(connection = %from.short(), error = %err, "request for malformed share id");
                    ServerMessage::Reply {
                        id,
                        reply: share_error_reply(&request, err),
                    }
                }
                None => malformed(from, id, &e),
            },
        }
    }

    /// Handle one request and produce its reply.
    pub fn handle(&self, from: ConnectionId, message: ClientMessage) -> ServerMessage {
        let ClientMessage { id, request } = message;
        tracing::debug!(connection = %from.short(), id, request = request.name(), "request");

        let reply = match request {
            ClientRequest::CreateShare => Reply::ShareCreated {
                share_id: self.registry.create_session(from),
            },

            ClientRequest::JoinShare { share_id } => {
                match self.registry.add_receiver(&share_id, from) {
                    Ok(joined) => Reply::Joined(JoinResult::joined(joined.metadata)),
                    Err(e @ RegistryError::NotFound(_)) => {
                        tracing::info!(connection = %from.short(), error = %e, "join failed");
                        join_not_found()
                    }
                    Err(e) => Reply::Joined(JoinResult::failed(e.kind(), e.to_string())),
                }
            }

            ClientRequest::PublishMetadata { share_id, metadata } => {
                match self.registry.set_metadata(&share_id, from, metadata) {
                    Ok(_) => Reply::Accepted,
                    Err(e) => failed(e),
                }
            }

            ClientRequest::RequestDownload { share_id } => {
                match self.registry.request_download(&share_id, from) {
                    Ok(()) => Reply::Accepted,
                    Err(e) => failed(e),
                }
            }

            ClientRequest::Signal { to, payload } => {
                self.relay.relay(from, to, payload);
                Reply::Accepted
            }
        };

        ServerMessage::Reply { id, reply }
    }
}

fn failed(e: RegistryError) -> Reply {
    Reply::Failed {
        error: e.kind(),
        message: e.to_string(),
    }
}

fn join_not_found() -> Reply {
    Reply::Joined(JoinResult::failed(ErrorKind::NotFound, SHARE_NOT_FOUND))
}

fn malformed(from: ConnectionId, id: u64, e: &serde_json::Error) -> ServerMessage {
    tracing::warn!(connection = %from.short(), id, error = %e, "malformed control frame");
    ServerMessage::Reply {
        id,
        reply: Reply::Failed {
            error: ErrorKind::InvalidRequest,
            message: format!("malformed request: {e}"),
        },
    }
}

/// A share-addressed request whose `share_id` is a string that is not a
/// valid id.
fn malformed_share_id(request: &Value) -> Option<RegistryError> {
    let kind = request.get("type")?.as_str()?;
    if !matches!(kind, "join_share" | "publish_metadata" | "request_download") {
        return None;
    }
    let raw = request.get("share_id")?.as_str()?;
    match raw.parse::<ShareId>() {
        Ok(_) => None,
        Err(_) => Some(RegistryError::MalformedShareId(raw.to_string())),
    }
}

/// Joins answer with a `joined` result, everything else with `failed`.
fn share_error_reply(request: &Value, e: RegistryError) -> Reply {
    if request.get("type").and_then(Value::as_str) == Some("join_share") {
        join_not_found()
    } else {
        failed(e)
    }
}
