//! Receiver side of a share: one link to the owner, opened when the owner's
//! first negotiation signal arrives after a download request.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use ferry_core::config::TransferSettings;
use ferry_core::{
    ChunkMessage, ClientRequest, ConnectionId, FileMetadata, JoinResult, ServerMessage, ShareId,
};

use super::assembler::ChunkAssembler;
use super::link::{LinkInput, LinkState, PeerLink};
use super::transport::{LinkEvent, LinkIo, Transport};
use super::{OutboundSignal, ReceiveEvent, TransferError};

struct ReceiveInner {
    link: PeerLink,
    generation: u64,
    metadata: Option<FileMetadata>,
    /// Learned from the first signal after a download request.
    owner: Option<ConnectionId>,
    remote_signal: Option<mpsc::UnboundedSender<Value>>,
    task: Option<JoinHandle<()>>,
}

impl ReceiveInner {
    fn transition(
        &mut self,
        input: LinkInput,
        events: &mpsc::UnboundedSender<ReceiveEvent>,
    ) -> Option<LinkState> {
        let before = self.link.state();
        match self.link.apply(input) {
            Ok(state) => {
                if state != before {
                    tracing::debug!(from = %before, to = %state, "link state");
                    let _ = events.send(ReceiveEvent::StateChanged(state));
                }
                Some(state)
            }
            Err(e) => {
                tracing::warn!(error = %e, "link transition rejected");
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

pub struct ReceiveSession<T: Transport> {
    share_id: ShareId,
    settings: TransferSettings,
    transport: Arc<T>,
    inner: Arc<Mutex<ReceiveInner>>,
    signals: mpsc::UnboundedSender<OutboundSignal>,
    events: mpsc::UnboundedSender<ReceiveEvent>,
}

impl<T: Transport> ReceiveSession<T> {
    pub fn new(
        share_id: ShareId,
        settings: TransferSettings,
        transport: Arc<T>,
        signals: mpsc::UnboundedSender<OutboundSignal>,
        events: mpsc::UnboundedSender<ReceiveEvent>,
    ) -> Self {
        Self {
            share_id,
            settings,
            transport,
            inner: Arc::new(Mutex::new(ReceiveInner {
                link: PeerLink::new(),
                generation: 0,
                metadata: None,
                owner: None,
                remote_signal: None,
                task: None,
            })),
            signals,
            events,
        }
    }

    pub fn share_id(&self) -> ShareId {
        self.share_id
    }

    pub fn join_request(&self) -> ClientRequest {
        ClientRequest::JoinShare {
            share_id: self.share_id,
        }
    }

    pub async fn state(&self) -> LinkState {
        self.inner.lock().await.link.state()
    }

    pub async fn metadata(&self) -> Option<FileMetadata> {
        self.inner.lock().await.metadata.clone()
    }

    /// Apply the server's answer to `join_request`. Returns whether the
    /// join succeeded.
    pub async fn on_join_result(&self, result: &JoinResult) -> bool {
        if !result.success {
            tracing::warn!(
                share = %self.share_id.short(),
                message = result.message.as_deref().unwrap_or(""),
                "join rejected"
            );
            return false;
        }
        let mut inner = self.inner.lock().await;
        if inner.link.state() == LinkState::Idle {
            inner.transition(LinkInput::Join, &self.events);
        }
        if let Some(metadata) = &result.file_metadata {
            Self::store_metadata(&mut inner, metadata.clone(), &self.events);
        }
        true
    }

    pub async fn on_metadata(&self, metadata: FileMetadata) {
        let mut inner = self.inner.lock().await;
        Self::store_metadata(&mut inner, metadata, &self.events);
    }

    fn store_metadata(
        inner: &mut ReceiveInner,
        metadata: FileMetadata,
        events: &mpsc::UnboundedSender<ReceiveEvent>,
    ) {
        tracing::info!(name = %metadata.name, size = metadata.size, "file offered");
        inner.metadata = Some(metadata.clone());
        let _ = events.send(ReceiveEvent::MetadataReceived(metadata));
        if inner.link.can_apply(LinkInput::MetadataKnown) {
            inner.transition(LinkInput::MetadataKnown, events);
        }
    }

    /// Ask the owner for the file. Returns the control request to send, or
    /// `None` when the metadata is not known yet or a download is already
    /// under way. After a finished or failed link this starts over.
    pub async fn request_download(&self) -> Option<ClientRequest> {
        let mut inner = self.inner.lock().await;

        if inner.link.state().is_terminal() {
            inner.teardown();
            inner.link = PeerLink::new();
            inner.generation += 1;
            inner.owner = None;
            inner.transition(LinkInput::Join, &self.events);
            if inner.metadata.is_some() {
                inner.transition(LinkInput::MetadataKnown, &self.events);
            }
        }

        if inner.link.state() != LinkState::MetadataKnown {
            tracing::warn!(state = %inner.link.state(), "download request not possible now");
            return None;
        }
        inner.transition(LinkInput::RequestDownload, &self.events);
        Some(ClientRequest::RequestDownload {
            share_id: self.share_id,
        })
    }

    /// Feed a negotiation payload. The first one after a download request
    /// opens the link and fixes which connection is the owner.
    pub async fn on_signal(&self, from: ConnectionId, payload: Value) {
        let mut inner = self.inner.lock().await;

        if let Some(owner) = inner.owner {
            if owner != from {
                tracing::warn!(from = %from.short(), "signal from a connection other than the owner");
                return;
            }
        }

        if inner.remote_signal.is_none() {
            if inner.link.state() != LinkState::DownloadRequested {
                tracing::debug!(state = %inner.link.state(), "unsolicited signal dropped");
                return;
            }
            inner.owner = Some(from);
            let io = self.transport.open(false);
            inner.remote_signal = Some(io.signal.clone());
            let driver = ReceiveDriver {
                owner: from,
                generation: inner.generation,
                chunk_size: self.settings.chunk_size,
                inner: self.inner.clone(),
                signals: self.signals.clone(),
                events: self.events.clone(),
            };
            inner.task = Some(tokio::spawn(driver.run(io)));
        }

        if let Some(tx) = &inner.remote_signal {
            let _ = tx.send(payload);
        }
        if inner.link.state() == LinkState::DownloadRequested {
            inner.transition(LinkInput::Signal, &self.events);
        }
    }

    /// The share is gone. Close the link and drop any partial file.
    pub async fn on_share_ended(&self, message: &str) {
        let mut inner = self.inner.lock().await;
        inner.transition(LinkInput::Close, &self.events);
        inner.teardown();
        tracing::info!(share = %self.share_id.short(), reason = message, "share ended");
        let _ = self.events.send(ReceiveEvent::CounterpartGone {
            message: message.to_string(),
        });
    }

    /// Route a server push that concerns this share.
    pub async fn handle_push(&self, push: &ServerMessage) {
        match push {
            ServerMessage::FileMetadata { share_id, metadata } if *share_id == self.share_id => {
                self.on_metadata(metadata.clone()).await
            }
            ServerMessage::Signal { from, payload } => self.on_signal(*from, payload.clone()).await,
            ServerMessage::ShareEnded { share_id, message } if *share_id == self.share_id => {
                self.on_share_ended(message).await
            }
            _ => {}
        }
    }

    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.transition(LinkInput::Close, &self.events);
        inner.teardown();
    }
}

impl<T: Transport> Drop for ReceiveSession<T> {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.try_lock() {
            inner.teardown();
        }
    }
}

// ── Link driver ───────────────────────────────────────────────────────────────

struct ReceiveDriver {
    owner: ConnectionId,
    generation: u64,
    chunk_size: usize,
    inner: Arc<Mutex<ReceiveInner>>,
    signals: mpsc::UnboundedSender<OutboundSignal>,
    events: mpsc::UnboundedSender<ReceiveEvent>,
}

impl ReceiveDriver {
    async fn advance(&self, input: LinkInput) -> Option<LinkState> {
        let mut inner = self.inner.lock().await;
        if inner.generation != self.generation {
            return None;
        }
        inner.transition(input, &self.events)
    }

    async fn fail(&self, error: TransferError) {
        tracing::warn!(owner = %self.owner.short(), error = %error, "download failed");
        if self.advance(LinkInput::TransportFailed).await.is_some() {
            let _ = self.events.send(ReceiveEvent::Failed(error));
        }
    }

    async fn send(&self, io: &LinkIo, message: ChunkMessage) -> Result<(), TransferError> {
        let frame = message.encode()?;
        io.data
            .send(frame)
            .await
            .map_err(|_| TransferError::Transport("link closed".into()))
    }

    async fn run(self, mut io: LinkIo) {
        let mut assembler: Option<ChunkAssembler> = None;
        let mut started = false;

        while let Some(event) = io.events.recv().await {
            let message = match event {
                LinkEvent::Signal(payload) => {
                    let _ = self.signals.send(OutboundSignal {
                        to: self.owner,
                        payload,
                    });
                    continue;
                }
                LinkEvent::Connected => {
                    self.advance(LinkInput::LinkUp).await;
                    continue;
                }
                LinkEvent::Error(reason) => return self.fail(TransferError::Transport(reason)).await,
                LinkEvent::Closed => break,
                LinkEvent::Data(frame) => match ChunkMessage::decode(&frame) {
                    Ok(message) => message,
                    Err(e) => return self.fail(e.into()).await,
                },
            };

            match message {
                ChunkMessage::Metadata(metadata) => {
                    if assembler.is_some() {
                        return self.fail(TransferError::UnexpectedMessage("metadata")).await;
                    }
                    match ChunkAssembler::new(metadata, self.chunk_size) {
                        Ok(asm) => assembler = Some(asm),
                        Err(e) => return self.fail(e.into()).await,
                    }
                }
                ChunkMessage::Chunk { index, total, data } => {
                    let Some(asm) = assembler.as_mut() else {
                        return self.fail(TransferError::UnexpectedMessage("chunk")).await;
                    };
                    if !started {
                        started = true;
                        self.advance(LinkInput::FirstChunk).await;
                    }
                    let state = match asm.accept(index, total, data) {
                        Ok(state) => state,
                        Err(e) => return self.fail(e.into()).await,
                    };
                    let _ = self.events.send(ReceiveEvent::Progress {
                        percent: state.percent,
                        bytes: state.received_bytes,
                    });
                    if let Err(e) = self.send(&io, ChunkMessage::Ack { index }).await {
                        return self.fail(e).await;
                    }
                }
                ChunkMessage::Complete => {
                    let Some(asm) = assembler.take() else {
                        return self.fail(TransferError::UnexpectedMessage("complete")).await;
                    };
                    let file = match asm.finish() {
                        Ok(file) => file,
                        Err(e) => return self.fail(e).await,
                    };
                    if let Err(e) = self.send(&io, ChunkMessage::Complete).await {
                        return self.fail(e).await;
                    }
                    self.advance(LinkInput::CompletionAcked).await;
                    tracing::info!(
                        name = %file.name,
                        bytes = file.data.len(),
                        blake3 = %file.digest(),
                        "file received"
                    );
                    let _ = self.events.send(ReceiveEvent::Delivered(file));
                    return;
                }
                ChunkMessage::Ack { .. } => {
                    return self.fail(TransferError::UnexpectedMessage("ack")).await;
                }
            }
        }

        self.fail(TransferError::Transport("link closed before completion".into()))
            .await;
    }
}
