//! # Nexus Broker
//!
//! The publish/subscribe layer connecting nodes of the server network.
//! Channels are a small closed set of logical topics; packets are a tagged
//! union over the closed set of payload kinds, serialized as JSON for the
//! wire. The broker itself is a best-effort notification layer: a node that
//! is offline when a message is published never receives it and must
//! re-derive state from the persistent store.
//!
//! ## Architecture
//!
//! - [`Channel`] — enumerated logical topics with stable wire names.
//! - [`Packet`] — channel-tagged payload union; plain data only, no live
//!   references, so packets reconstruct safely across process boundaries.
//! - [`BrokerTransport`] — the seam to the underlying broker. The in-tree
//!   [`InMemoryBroker`] runs over a `tokio::sync::broadcast` channel;
//!   networked deployments supply their own transport behind the trait.
//! - [`Publisher`] — fire-and-forget publish; failures are logged, never
//!   thrown across the call boundary.
//! - [`Subscriber`] — binds at most one [`ChannelListener`] per channel and
//!   dispatches incoming packets on a dedicated delivery task.

pub mod channel;
pub mod error;
pub mod packet;
pub mod publisher;
pub mod subscriber;
pub mod transport;

pub use channel::Channel;
pub use error::BrokerError;
pub use packet::{
    ArenaHeartbeatPacket, ArenaReservationPacket, CashCachePacket, ChatChannelPacket,
    CosmeticsSyncPacket, Packet, PreferencesSyncPacket, ProfileSyncPacket, ServerStatusPacket,
    StaffChatPacket, SyncAction,
};
pub use publisher::Publisher;
pub use subscriber::{ChannelListener, Subscriber};
pub use transport::{BrokerTransport, InMemoryBroker, WireMessage};

/// Maximum messages buffered per subscriber before the transport starts
/// dropping the oldest (broadcast lag).
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
