//! Broker error types.

use crate::channel::Channel;
use thiserror::Error;

/// Errors from the publish/subscribe layer.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Packet could not be serialized for the wire.
    #[error("serialization error: {0}")]
    Serialization(serde_json::Error),

    /// Incoming bytes could not be decoded into a packet.
    #[error("deserialization error: {0}")]
    Deserialization(serde_json::Error),

    /// The underlying broker could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    /// A listener is already bound to this channel.
    #[error("channel {0} already has a bound listener")]
    ChannelBound(Channel),

    /// No listener bound to this channel.
    #[error("no listener bound to channel {0}")]
    ListenerNotFound(Channel),

    /// Listener callback reported a failure for one message.
    #[error("listener error on channel {channel}: {message}")]
    Listener { channel: Channel, message: String },
}
