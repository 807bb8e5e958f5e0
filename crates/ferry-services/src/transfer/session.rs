//! Owner side of a share: one `PeerLink` per receiver, each driven by its
//! own task once the receiver asks for the file.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use ferry_core::config::TransferSettings;
use ferry_core::{ChunkMessage, ClientRequest, ConnectionId, FileMetadata, ServerMessage, ShareId};

use super::link::{LinkInput, LinkState, PeerLink};
use super::sender::ChunkSender;
use super::transport::{LinkEvent, LinkIo, Transport};
use super::{FileSource, OutboundSignal, TransferError, TransferEvent};

struct LinkEntry {
    link: PeerLink,
    /// Bumped whenever the link is replaced, so a stale driver cannot touch
    /// its successor.
    generation: u64,
    remote_signal: Option<mpsc::UnboundedSender<Value>>,
    task: Option<JoinHandle<()>>,
    progress: u8,
}

impl LinkEntry {
    fn new(generation: u64) -> Self {
        Self {
            link: PeerLink::new(),
            generation,
            remote_signal: None,
            task: None,
            progress: 0,
        }
    }

    /// Apply `input` and report a state change. Rejected inputs are logged
    /// and leave the link alone.
    fn transition(
        &mut self,
        peer: ConnectionId,
        input: LinkInput,
        events: &mpsc::UnboundedSender<TransferEvent>,
    ) -> Option<LinkState> {
        let before = self.link.state();
        match self.link.apply(input) {
            Ok(state) => {
                if state != before {
                    tracing::debug!(peer = %peer.short(), from = %before, to = %state, "link state");
                    let _ = events.send(TransferEvent::StateChanged { peer, state });
                }
                Some(state)
            }
            Err(e) => {
                tracing::warn!(peer = %peer.short(), error = %e, "link transition rejected");
                None
            }
        }
    }

    fn teardown(&mut self) {
        self.remote_signal = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

type LinkTable = Arc<DashMap<ConnectionId, LinkEntry>>;

pub struct TransferSession<T: Transport> {
    share_id: ShareId,
    source: FileSource,
    settings: TransferSettings,
    transport: Arc<T>,
    links: LinkTable,
    next_generation: AtomicU64,
    signals: mpsc::UnboundedSender<OutboundSignal>,
    events: mpsc::UnboundedSender<TransferEvent>,
}

impl<T: Transport> TransferSession<T> {
    pub fn new(
        share_id: ShareId,
        source: FileSource,
        settings: TransferSettings,
        transport: Arc<T>,
        signals: mpsc::UnboundedSender<OutboundSignal>,
        events: mpsc::UnboundedSender<TransferEvent>,
    ) -> Self {
        tracing::info!(
            share = %share_id.short(),
            name = %source.metadata.name,
            size = source.metadata.size,
            blake3 = %source.digest(),
            "offering file"
        );
        Self {
            share_id,
            source,
            settings,
            transport,
            links: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(1),
            signals,
            events,
        }
    }

    pub fn share_id(&self) -> ShareId {
        self.share_id
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.source.metadata
    }

    /// The control request that announces this file.
    pub fn publish_request(&self) -> ClientRequest {
        ClientRequest::PublishMetadata {
            share_id: self.share_id,
            metadata: self.source.metadata.clone(),
        }
    }

    fn generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    /// Track a receiver. The owner already knows the metadata, so the link
    /// goes straight to `MetadataKnown`.
    pub fn on_receiver_joined(&self, peer: ConnectionId) {
        if let Entry::Vacant(slot) = self.links.entry(peer) {
            let mut entry = LinkEntry::new(self.generation());
            entry.transition(peer, LinkInput::Join, &self.events);
            entry.transition(peer, LinkInput::MetadataKnown, &self.events);
            slot.insert(entry);
        }
    }

    /// Start a link to `peer`. A request after the previous link ended
    /// starts a fresh one; a request while a link is in progress is ignored.
    pub fn on_download_requested(&self, peer: ConnectionId) -> bool {
        let sender = match ChunkSender::new(
            self.source.clone(),
            self.settings.chunk_size,
            self.settings.ack_window,
        ) {
            Ok(sender) => sender,
            Err(e) => {
                tracing::error!(peer = %peer.short(), error = %e, "cannot chunk file");
                let _ = self.events.send(TransferEvent::Failed {
                    peer,
                    error: e.into(),
                });
                return false;
            }
        };
        let generation = self.generation();
        {
            let mut entry = self
                .links
                .entry(peer)
                .or_insert_with(|| LinkEntry::new(generation));

            let state = entry.link.state();
            if state.is_terminal() {
                entry.teardown();
                *entry = LinkEntry::new(generation);
            } else if !matches!(
                state,
                LinkState::Idle | LinkState::Joined | LinkState::MetadataKnown
            ) {
                tracing::warn!(peer = %peer.short(), state = %state, "download already in progress");
                return false;
            }
            entry.generation = generation;

            if entry.link.state() == LinkState::Idle {
                entry.transition(peer, LinkInput::Join, &self.events);
            }
            if entry.link.state() == LinkState::Joined {
                entry.transition(peer, LinkInput::MetadataKnown, &self.events);
            }
            entry.transition(peer, LinkInput::RequestDownload, &self.events);
        }

        let io = self.transport.open(true);
        let remote_signal = io.signal.clone();
        let driver = LinkDriver {
            peer,
            generation,
            links: self.links.clone(),
            signals: self.signals.clone(),
            events: self.events.clone(),
        };
        // Spawned outside the entry lock; the driver locks the same entry.
        let task = tokio::spawn(driver.run(io, sender));

        match self.links.get_mut(&peer) {
            Some(mut entry) if entry.generation == generation => {
                entry.remote_signal = Some(remote_signal);
                entry.task = Some(task);
            }
            _ => task.abort(),
        }
        tracing::info!(share = %self.share_id.short(), peer = %peer.short(), "link opening");
        true
    }

    /// Feed a negotiation payload from `from` into its link.
    pub fn on_signal(&self, from: ConnectionId, payload: Value) -> bool {
        let Some(mut entry) = self.links.get_mut(&from) else {
            tracing::debug!(from = %from.short(), "signal for unknown link");
            return false;
        };
        let delivered = match &entry.remote_signal {
            Some(tx) => tx.send(payload).is_ok(),
            None => false,
        };
        if delivered && entry.link.state() == LinkState::DownloadRequested {
            entry.transition(from, LinkInput::Signal, &self.events);
        }
        delivered
    }

    /// The receiver's control connection is gone: close its link and drop
    /// all transfer state for it.
    pub fn on_receiver_disconnected(&self, peer: ConnectionId) {
        let Some(mut entry) = self.links.get_mut(&peer) else {
            return;
        };
        entry.transition(peer, LinkInput::Close, &self.events);
        entry.teardown();
        drop(entry);
        tracing::info!(peer = %peer.short(), "receiver gone, link closed");
        let _ = self.events.send(TransferEvent::CounterpartGone { peer });
    }

    /// Route a server push that concerns this share.
    pub fn handle_push(&self, push: &ServerMessage) {
        match push {
            ServerMessage::ReceiverJoined {
                share_id,
                receiver_id,
                ..
            } if *share_id == self.share_id => self.on_receiver_joined(*receiver_id),
            ServerMessage::DownloadRequested {
                share_id,
                receiver_id,
            } if *share_id == self.share_id => {
                self.on_download_requested(*receiver_id);
            }
            ServerMessage::Signal { from, payload } => {
                self.on_signal(*from, payload.clone());
            }
            ServerMessage::ReceiverDisconnected {
                share_id,
                receiver_id,
                ..
            } if *share_id == self.share_id => self.on_receiver_disconnected(*receiver_id),
            _ => {}
        }
    }

    pub fn link_state(&self, peer: &ConnectionId) -> Option<LinkState> {
        self.links.get(peer).map(|e| e.link.state())
    }

    /// Acknowledged percentage for one receiver.
    pub fn progress(&self, peer: &ConnectionId) -> Option<u8> {
        self.links.get(peer).map(|e| e.progress)
    }

    /// Mean progress over links that have not been closed.
    pub fn overall_progress(&self) -> Option<u8> {
        let values: Vec<u32> = self
            .links
            .iter()
            .filter(|e| e.link.state() != LinkState::Closed)
            .map(|e| e.progress as u32)
            .collect();
        if values.is_empty() {
            return None;
        }
        Some((values.iter().sum::<u32>() / values.len() as u32) as u8)
    }

    pub fn peers(&self) -> Vec<ConnectionId> {
        self.links.iter().map(|e| *e.key()).collect()
    }

    /// Close every link.
    pub fn close(&self) {
        for mut entry in self.links.iter_mut() {
            let peer = *entry.key();
            entry.transition(peer, LinkInput::Close, &self.events);
            entry.teardown();
        }
    }
}

impl<T: Transport> Drop for TransferSession<T> {
    fn drop(&mut self) {
        for mut entry in self.links.iter_mut() {
            entry.teardown();
        }
    }
}

// ── Link driver ───────────────────────────────────────────────────────────────

struct LinkDriver {
    peer: ConnectionId,
    generation: u64,
    links: LinkTable,
    signals: mpsc::UnboundedSender<OutboundSignal>,
    events: mpsc::UnboundedSender<TransferEvent>,
}

impl LinkDriver {
    fn advance(&self, input: LinkInput) -> Option<LinkState> {
        let mut entry = self.links.get_mut(&self.peer)?;
        if entry.generation != self.generation {
            return None;
        }
        entry.transition(self.peer, input, &self.events)
    }

    fn fail(&self, error: TransferError) {
        tracing::warn!(peer = %self.peer.short(), error = %error, "link failed");
        if self.advance(LinkInput::TransportFailed).is_some() {
            let _ = self.events.send(TransferEvent::Failed {
                peer: self.peer,
                error,
            });
        }
    }

    fn report_progress(&self, percent: u8, bytes: u64) {
        if let Some(mut entry) = self.links.get_mut(&self.peer) {
            if entry.generation != self.generation {
                return;
            }
            entry.progress = percent;
        }
        let _ = self.events.send(TransferEvent::Progress {
            peer: self.peer,
            percent,
            bytes,
        });
    }

    /// Negotiate, then stream the file. Frames go out only when the
    /// transport grants a slot and the ack window has room.
    async fn run(self, mut io: LinkIo, mut sender: ChunkSender) {
        let mut connected = false;
        let mut started = false;

        loop {
            tokio::select! {
                event = io.events.recv() => {
                    let Some(event) = event else {
                        return self.fail(TransferError::Transport("link dropped".into()));
                    };
                    match event {
                        LinkEvent::Signal(payload) => {
                            let _ = self.signals.send(OutboundSignal { to: self.peer, payload });
                            let state = self.links.get(&self.peer).map(|e| e.link.state());
                            if state == Some(LinkState::DownloadRequested) {
                                self.advance(LinkInput::Signal);
                            }
                        }
                        LinkEvent::Connected => {
                            connected = true;
                            self.advance(LinkInput::LinkUp);
                            tracing::info!(
                                peer = %self.peer.short(),
                                chunks = sender.total_chunks(),
                                "link up, sending"
                            );
                        }
                        LinkEvent::Data(frame) => match ChunkMessage::decode(&frame) {
                            Ok(ChunkMessage::Ack { index }) => {
                                if sender.on_ack(index) {
                                    let (percent, bytes) = sender.progress();
                                    self.report_progress(percent, bytes);
                                } else {
                                    tracing::debug!(peer = %self.peer.short(), index, "stray ack");
                                }
                            }
                            Ok(ChunkMessage::Complete) if sender.is_done() => {
                                let (percent, bytes) = sender.progress();
                                self.report_progress(percent, bytes);
                                self.advance(LinkInput::CompletionAcked);
                                tracing::info!(peer = %self.peer.short(), bytes, "receiver confirmed file");
                                return;
                            }
                            Ok(other) => {
                                return self.fail(TransferError::UnexpectedMessage(other.name()));
                            }
                            Err(e) => return self.fail(e.into()),
                        },
                        LinkEvent::Error(reason) => {
                            return self.fail(TransferError::Transport(reason));
                        }
                        LinkEvent::Closed => {
                            return self.fail(TransferError::Transport(
                                "link closed before completion".into(),
                            ));
                        }
                    }
                }

                permit = io.data.reserve(), if connected && sender.ready() => {
                    let Ok(permit) = permit else {
                        return self.fail(TransferError::Transport("link closed".into()));
                    };
                    let Some(message) = sender.next_message() else {
                        continue;
                    };
                    match message.encode() {
                        Ok(frame) => permit.send(frame),
                        Err(e) => return self.fail(e.into()),
                    }
                    if !started && matches!(message, ChunkMessage::Chunk { .. }) {
                        started = true;
                        self.advance(LinkInput::FirstChunk);
                    }
                }
            }
        }
    }
}
