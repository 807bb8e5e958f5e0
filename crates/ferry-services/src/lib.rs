//! ferry-services: the rendezvous services behind the daemon and the
//! client-side transfer machinery that runs on top of them.

pub mod connections;
pub mod hub;
pub mod lifecycle;
pub mod registry;
pub mod signaling;
pub mod transfer;

pub use connections::{new_connection_table, ConnectionTable, Notifier};
pub use hub::ControlHub;
pub use lifecycle::{ConnectionLifecycleManager, DisconnectReport};
pub use registry::{Joined, RegistryError, RemovalReport, SessionRegistry, ShareSession};
pub use signaling::SignalingRelay;
pub use transfer::link::{LinkState, PeerLink};
pub use transfer::receive::ReceiveSession;
pub use transfer::session::TransferSession;
pub use transfer::transport::{LinkEvent, LinkIo, MemoryTransport, Transport};
pub use transfer::{
    DeliveredFile, FileSource, OutboundSignal, ReceiveEvent, TransferError, TransferEvent,
};
