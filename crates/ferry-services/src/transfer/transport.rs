//! Peer transport seam: the direct data channel between owner and receiver.
//!
//! A transport hands out one `LinkIo` per link. Negotiation payloads it
//! produces come out as `LinkEvent::Signal` and must be relayed to the other
//! end, which feeds them back in through `LinkIo::signal`. Once `Connected`
//! the data channel is reliable and ordered. Dropping the `LinkIo` closes
//! the link.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use ferry_core::config::TransferSettings;

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Negotiation payload to relay to the remote end.
    Signal(Value),
    Connected,
    Data(Bytes),
    Error(String),
    Closed,
}

/// Both directions of one link.
pub struct LinkIo {
    /// Negotiation payloads received from the remote end.
    pub signal: mpsc::UnboundedSender<Value>,
    /// Outbound frames. Bounded: `reserve()` waits while the transport's
    /// buffer is full.
    pub data: mpsc::Sender<Bytes>,
    pub events: mpsc::Receiver<LinkEvent>,
}

pub trait Transport: Send + Sync + 'static {
    /// Open one end of a link. The initiator produces the first signal.
    fn open(&self, initiator: bool) -> LinkIo;
}

// ── In-process transport ──────────────────────────────────────────────────────

/// Pairs links inside one process. The initiator's offer carries a token;
/// the responder that receives it claims the initiator's pending end and
/// wires the two data channels together.
#[derive(Clone)]
pub struct MemoryTransport {
    board: Arc<Switchboard>,
}

struct Switchboard {
    pending: DashMap<u64, PendingEnd>,
    next_token: AtomicU64,
    capacity: usize,
    fail: AtomicBool,
}

/// What the initiator leaves for its responder.
struct PendingEnd {
    data_rx: mpsc::Receiver<Bytes>,
    events_tx: mpsc::Sender<LinkEvent>,
}

struct LinkParts {
    io: LinkIo,
    signal_rx: mpsc::UnboundedReceiver<Value>,
    data_rx: mpsc::Receiver<Bytes>,
    events_tx: mpsc::Sender<LinkEvent>,
}

impl MemoryTransport {
    /// `capacity` is the number of frames each direction buffers.
    pub fn new(capacity: usize) -> Self {
        Self {
            board: Arc::new(Switchboard {
                pending: DashMap::new(),
                next_token: AtomicU64::new(1),
                capacity: capacity.max(1),
                fail: AtomicBool::new(false),
            }),
        }
    }

    /// Buffer `settings.link_capacity` frames per direction.
    pub fn from_settings(settings: &TransferSettings) -> Self {
        Self::new(settings.link_capacity)
    }

    /// Make every negotiation from now on end in `LinkEvent::Error`.
    pub fn fail_links(&self, fail: bool) {
        self.board.fail.store(fail, Ordering::SeqCst);
    }

    /// Offers not yet claimed by a responder.
    pub fn pending_offers(&self) -> usize {
        self.board.pending.len()
    }

    fn parts(&self) -> LinkParts {
        let (signal, signal_rx) = mpsc::unbounded_channel();
        let (data, data_rx) = mpsc::channel(self.board.capacity);
        let (events_tx, events) = mpsc::channel(self.board.capacity + 8);
        LinkParts {
            io: LinkIo {
                signal,
                data,
                events,
            },
            signal_rx,
            data_rx,
            events_tx,
        }
    }
}

impl Transport for MemoryTransport {
    fn open(&self, initiator: bool) -> LinkIo {
        let parts = self.parts();
        let board = self.board.clone();
        if initiator {
            tokio::spawn(run_initiator(board, parts.signal_rx, parts.data_rx, parts.events_tx));
        } else {
            tokio::spawn(run_responder(board, parts.signal_rx, parts.data_rx, parts.events_tx));
        }
        parts.io
    }
}

async fn run_initiator(
    board: Arc<Switchboard>,
    mut signal_rx: mpsc::UnboundedReceiver<Value>,
    data_rx: mpsc::Receiver<Bytes>,
    events_tx: mpsc::Sender<LinkEvent>,
) {
    let token = board.next_token.fetch_add(1, Ordering::Relaxed);
    board.pending.insert(
        token,
        PendingEnd {
            data_rx,
            events_tx: events_tx.clone(),
        },
    );

    let offer = json!({ "type": "offer", "token": token });
    if events_tx.send(LinkEvent::Signal(offer)).await.is_err() {
        board.pending.remove(&token);
        return;
    }

    while let Some(payload) = signal_rx.recv().await {
        if payload["type"] != "answer" || payload["token"] != token {
            tracing::debug!(token, "ignoring unrelated signal");
            continue;
        }
        let event = if board.fail.load(Ordering::SeqCst) {
            LinkEvent::Error("negotiation failed".to_string())
        } else {
            LinkEvent::Connected
        };
        let _ = events_tx.send(event).await;
        return;
    }

    // LinkIo dropped before an answer arrived.
    board.pending.remove(&token);
}

async fn run_responder(
    board: Arc<Switchboard>,
    mut signal_rx: mpsc::UnboundedReceiver<Value>,
    data_rx: mpsc::Receiver<Bytes>,
    events_tx: mpsc::Sender<LinkEvent>,
) {
    let token = loop {
        let Some(payload) = signal_rx.recv().await else {
            return;
        };
        if payload["type"] == "offer" {
            if let Some(token) = payload["token"].as_u64() {
                break token;
            }
        }
        tracing::debug!("ignoring signal before offer");
    };

    let Some((_, remote)) = board.pending.remove(&token) else {
        let _ = events_tx
            .send(LinkEvent::Error(format!("no pending offer {token}")))
            .await;
        return;
    };

    if board.fail.load(Ordering::SeqCst) {
        // The initiator learns about the failure from our answer.
        let _ = events_tx
            .send(LinkEvent::Signal(json!({ "type": "answer", "token": token })))
            .await;
        let _ = events_tx
            .send(LinkEvent::Error("negotiation failed".to_string()))
            .await;
        return;
    }

    tokio::spawn(pump(remote.data_rx, events_tx.clone()));
    tokio::spawn(pump(data_rx, remote.events_tx));

    let answer = json!({ "type": "answer", "token": token });
    if events_tx.send(LinkEvent::Signal(answer)).await.is_ok() {
        let _ = events_tx.send(LinkEvent::Connected).await;
    }
}

/// Forward frames from one end's data channel to the other end's events.
/// Ends with `Closed` once the sending side is dropped.
async fn pump(mut from: mpsc::Receiver<Bytes>, to: mpsc::Sender<LinkEvent>) {
    while let Some(frame) = from.recv().await {
        if to.send(LinkEvent::Data(frame)).await.is_err() {
            return;
        }
    }
    let _ = to.send(LinkEvent::Closed).await;
}
