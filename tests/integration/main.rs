//! Ferry integration test harness.
//!
//! Everything runs in-process: one `ControlHub` stands in for the daemon,
//! participants talk to it directly instead of over a WebSocket, and peer
//! links go through `MemoryTransport`. The admin API tests bind real
//! loopback listeners on ephemeral ports.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use ferry_core::config::TransferSettings;
use ferry_core::{ClientMessage, ClientRequest, ConnectionId, JoinResult, Reply, ServerMessage, ShareId};
use ferry_services::{
    new_connection_table, ControlHub, DisconnectReport, FileSource, LinkState, MemoryTransport,
    ReceiveEvent, ReceiveSession, TransferEvent, TransferSession,
};

mod admin;
mod control;
mod transfer;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const WAIT: Duration = Duration::from_secs(10);

pub fn new_hub() -> ControlHub {
    ControlHub::new(new_connection_table())
}

pub fn settings(chunk_size: usize, ack_window: u32) -> TransferSettings {
    TransferSettings {
        chunk_size,
        ack_window,
        link_capacity: 4,
    }
}

pub fn transport_for(settings: &TransferSettings) -> Arc<MemoryTransport> {
    Arc::new(MemoryTransport::from_settings(settings))
}

pub fn random_bytes(len: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

/// Receive until `pred` matches, failing the test after `WAIT`.
pub async fn wait_for<E: std::fmt::Debug>(
    rx: &mut mpsc::UnboundedReceiver<E>,
    mut pred: impl FnMut(&E) -> bool,
) -> E {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let event = tokio::time::timeout_at(deadline, rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event stream closed");
        if pred(&event) {
            return event;
        }
    }
}

/// A control connection driven directly against the hub.
pub struct Client {
    pub id: ConnectionId,
    pub hub: ControlHub,
    pub pushes: mpsc::UnboundedReceiver<ServerMessage>,
    next_request: u64,
}

impl Client {
    pub fn connect(hub: &ControlHub) -> Self {
        let (id, mut pushes) = hub.connect();
        match pushes.try_recv() {
            Ok(ServerMessage::Welcome { connection_id }) => assert_eq!(connection_id, id),
            other => panic!("expected welcome, got {other:?}"),
        }
        Self {
            id,
            hub: hub.clone(),
            pushes,
            next_request: 0,
        }
    }

    pub fn request(&mut self, request: ClientRequest) -> Reply {
        self.next_request += 1;
        let message = ClientMessage {
            id: self.next_request,
            request,
        };
        match self.hub.handle(self.id, message) {
            ServerMessage::Reply { id, reply } => {
                assert_eq!(id, self.next_request);
                reply
            }
            other => panic!("expected reply, got {other:?}"),
        }
    }

    pub fn create_share(&mut self) -> ShareId {
        match self.request(ClientRequest::CreateShare) {
            Reply::ShareCreated { share_id } => share_id,
            other => panic!("expected share_created, got {other:?}"),
        }
    }

    pub fn join(&mut self, share_id: ShareId) -> JoinResult {
        match self.request(ClientRequest::JoinShare { share_id }) {
            Reply::Joined(result) => result,
            other => panic!("expected joined, got {other:?}"),
        }
    }

    pub fn drain(&mut self) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(m) = self.pushes.try_recv() {
            out.push(m);
        }
        out
    }
}

/// A file owner: control connection plus `TransferSession`, pumped by a
/// background task.
pub struct Owner {
    pub id: ConnectionId,
    pub share_id: ShareId,
    pub session: Arc<TransferSession<MemoryTransport>>,
    pub events: mpsc::UnboundedReceiver<TransferEvent>,
    hub: ControlHub,
    task: JoinHandle<()>,
}

impl Owner {
    /// Create a share for `source`. Metadata is published only if `publish`.
    pub fn start(
        hub: &ControlHub,
        source: FileSource,
        settings: TransferSettings,
        transport: Arc<MemoryTransport>,
        publish: bool,
    ) -> Self {
        let mut client = Client::connect(hub);
        let share_id = client.create_share();
        let (sig_tx, mut sig_rx) = mpsc::unbounded_channel();
        let (ev_tx, events) = mpsc::unbounded_channel();
        let session = Arc::new(TransferSession::new(
            share_id, source, settings, transport, sig_tx, ev_tx,
        ));
        let id = client.id;

        let owner = {
            let task_session = session.clone();
            let task = tokio::spawn(async move {
                loop {
                    tokio::select! {
                        push = client.pushes.recv() => match push {
                            Some(push) => task_session.handle_push(&push),
                            None => break,
                        },
                        Some(signal) = sig_rx.recv() => {
                            client.request(ClientRequest::Signal {
                                to: signal.to,
                                payload: signal.payload,
                            });
                        }
                    }
                }
            });
            Owner {
                id,
                share_id,
                session,
                events,
                hub: hub.clone(),
                task,
            }
        };
        if publish {
            assert_eq!(owner.publish(), Reply::Accepted);
        }
        owner
    }

    pub fn publish(&self) -> Reply {
        let message = ClientMessage {
            id: 1_000,
            request: self.session.publish_request(),
        };
        match self.hub.handle(self.id, message) {
            ServerMessage::Reply { reply, .. } => reply,
            other => panic!("expected reply, got {other:?}"),
        }
    }

    /// Wait until `peer`'s link reaches `state`.
    pub async fn wait_state(&mut self, peer: ConnectionId, state: LinkState) {
        if self.session.link_state(&peer) == Some(state) {
            return;
        }
        wait_for(&mut self.events, |e| {
            matches!(e, TransferEvent::StateChanged { peer: p, state: s } if *p == peer && *s == state)
        })
        .await;
    }

    pub fn disconnect(self) -> DisconnectReport {
        let report = self.hub.disconnect(self.id);
        self.task.abort();
        report
    }
}

/// A receiver that joins on start and asks for the file as soon as it
/// knows the metadata.
pub struct Receiver {
    pub id: ConnectionId,
    pub join: JoinResult,
    pub session: Arc<ReceiveSession<MemoryTransport>>,
    pub events: mpsc::UnboundedReceiver<ReceiveEvent>,
    hub: ControlHub,
    task: JoinHandle<()>,
}

impl Receiver {
    pub async fn start(
        hub: &ControlHub,
        share_id: ShareId,
        settings: TransferSettings,
        transport: Arc<MemoryTransport>,
    ) -> Self {
        let mut client = Client::connect(hub);
        let (sig_tx, mut sig_rx) = mpsc::unbounded_channel();
        let (ev_tx, events) = mpsc::unbounded_channel();
        let session = Arc::new(ReceiveSession::new(share_id, settings, transport, sig_tx, ev_tx));

        let join = client.join(share_id);
        session.on_join_result(&join).await;
        let id = client.id;

        let task = {
            let task_session = session.clone();
            tokio::spawn(async move {
                loop {
                    if task_session.state().await == LinkState::MetadataKnown {
                        if let Some(request) = task_session.request_download().await {
                            assert_eq!(client.request(request), Reply::Accepted);
                        }
                    }
                    tokio::select! {
                        push = client.pushes.recv() => match push {
                            Some(push) => task_session.handle_push(&push).await,
                            None => break,
                        },
                        Some(signal) = sig_rx.recv() => {
                            client.request(ClientRequest::Signal {
                                to: signal.to,
                                payload: signal.payload,
                            });
                        }
                    }
                }
            })
        };

        Receiver {
            id,
            join,
            session,
            events,
            hub: hub.clone(),
            task,
        }
    }

    pub async fn delivered(&mut self) -> ferry_services::DeliveredFile {
        match wait_for(&mut self.events, |e| {
            matches!(e, ReceiveEvent::Delivered(_) | ReceiveEvent::Failed(_))
        })
        .await
        {
            ReceiveEvent::Delivered(file) => file,
            other => panic!("download failed: {other:?}"),
        }
    }

    pub fn disconnect(self) -> DisconnectReport {
        let report = self.hub.disconnect(self.id);
        self.task.abort();
        report
    }
}
