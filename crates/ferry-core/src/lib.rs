//! ferry-core: shared types, wire formats and configuration.
//! All other Ferry crates depend on this one.

pub mod config;
pub mod control;
pub mod file;
pub mod ids;
pub mod wire;

pub use control::{ClientMessage, ClientRequest, ErrorKind, JoinResult, Reply, ServerMessage};
pub use file::{ChunkPlan, FileMetadata, MetadataError};
pub use ids::{ConnectionId, IdError, ShareId};
pub use wire::{ChunkMessage, WireError};
