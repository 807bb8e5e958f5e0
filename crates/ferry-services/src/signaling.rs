//! Signaling relay. Forwards opaque negotiation payloads between two
//! connections without looking inside them.

use ferry_core::{ConnectionId, ServerMessage};

use crate::connections::Notifier;

#[derive(Clone)]
pub struct SignalingRelay {
    notifier: Notifier,
}

impl SignalingRelay {
    pub fn new(notifier: Notifier) -> Self {
        Self { notifier }
    }

    /// Deliver `payload` to `to` as `Signal { from, payload }`. A target that
    /// is not connected drops the message; returns whether it was delivered.
    pub fn relay(&self, from: ConnectionId, to: ConnectionId, payload: serde_json::Value) -> bool {
        let delivered = self
            .notifier
            .send(&to, ServerMessage::Signal { from, payload });
        if !delivered {
            tracing::debug!(
                from = %from.short(),
                to = %to.short(),
                "signal target gone, dropped"
            );
        }
        delivered
    }
}
