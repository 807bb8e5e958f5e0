//! Per-receiver link state machine.
//!
//! ```text
//! Idle → Joined → MetadataKnown → DownloadRequested → Linking → Connected
//!      → Transferring → Complete
//! ```
//! `Errored` and `Closed` are reachable from every non-terminal state.
//! `Close` on a terminal state is absorbed; every other input there is
//! rejected.

use std::fmt;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    Idle,
    Joined,
    MetadataKnown,
    DownloadRequested,
    Linking,
    Connected,
    Transferring,
    Complete,
    Errored,
    Closed,
}

impl LinkState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LinkState::Complete | LinkState::Errored | LinkState::Closed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LinkState::Idle => "idle",
            LinkState::Joined => "joined",
            LinkState::MetadataKnown => "metadata_known",
            LinkState::DownloadRequested => "download_requested",
            LinkState::Linking => "linking",
            LinkState::Connected => "connected",
            LinkState::Transferring => "transferring",
            LinkState::Complete => "complete",
            LinkState::Errored => "errored",
            LinkState::Closed => "closed",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkInput {
    Join,
    MetadataKnown,
    RequestDownload,
    /// Negotiation traffic seen on the link.
    Signal,
    LinkUp,
    FirstChunk,
    /// The receiver confirmed it assembled the whole file.
    CompletionAcked,
    TransportFailed,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition: {input:?} in state {from}")]
pub struct InvalidTransition {
    pub from: LinkState,
    pub input: LinkInput,
}

/// Pure transition function.
pub fn next_state(from: LinkState, input: LinkInput) -> Result<LinkState, InvalidTransition> {
    use LinkInput as I;
    use LinkState as S;

    let to = match (from, input) {
        (s, I::Close) if s.is_terminal() => s,
        (s, _) if s.is_terminal() => return Err(InvalidTransition { from, input }),
        (_, I::Close) => S::Closed,
        (_, I::TransportFailed) => S::Errored,

        (S::Idle, I::Join) => S::Joined,
        (S::Joined | S::MetadataKnown, I::MetadataKnown) => S::MetadataKnown,
        (S::MetadataKnown, I::RequestDownload) => S::DownloadRequested,
        (S::DownloadRequested | S::Linking, I::Signal) => S::Linking,
        (S::DownloadRequested | S::Linking, I::LinkUp) => S::Connected,
        (S::Connected, I::FirstChunk) => S::Transferring,
        // Connected covers files with no chunks at all.
        (S::Connected | S::Transferring, I::CompletionAcked) => S::Complete,

        _ => return Err(InvalidTransition { from, input }),
    };
    Ok(to)
}

/// One link's state plus when it was opened.
#[derive(Debug, Clone)]
pub struct PeerLink {
    state: LinkState,
    opened_at: Instant,
}

impl Default for PeerLink {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerLink {
    pub fn new() -> Self {
        Self {
            state: LinkState::Idle,
            opened_at: Instant::now(),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }

    pub fn can_apply(&self, input: LinkInput) -> bool {
        next_state(self.state, input).is_ok()
    }

    /// Apply `input`. The state is left untouched on error.
    pub fn apply(&mut self, input: LinkInput) -> Result<LinkState, InvalidTransition> {
        self.state = next_state(self.state, input)?;
        Ok(self.state)
    }

    /// Apply a sequence of inputs, stopping at the first rejected one.
    pub fn apply_all(
        &mut self,
        inputs: impl IntoIterator<Item = LinkInput>,
    ) -> Result<LinkState, InvalidTransition> {
        for input in inputs {
            self.apply(input)?;
        }
        Ok(self.state)
    }
}
