//! Transport seam between the pub/sub API and the actual broker.

use crate::error::BrokerError;
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

/// One message as it travels the broker: the channel's wire name plus the
/// already-encoded packet bytes.
#[derive(Debug, Clone)]
pub struct WireMessage {
    pub channel: String,
    pub body: Vec<u8>,
}

/// The seam to the underlying broker.
///
/// [`InMemoryBroker`] is the in-process implementation; a networked
/// deployment supplies its own transport (feeding `incoming` from its socket
/// reader) behind the same trait. Delivery is best effort: messages sent
/// while a node is detached are never replayed.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Sends one message toward all attached subscribers.
    async fn send(&self, message: WireMessage) -> Result<(), BrokerError>;

    /// Obtains a fresh stream of messages arriving from now on.
    fn incoming(&self) -> broadcast::Receiver<WireMessage>;
}

/// In-process broker over a `tokio::sync::broadcast` channel.
///
/// Multi-producer, multi-consumer; per-sender FIFO, which matches the
/// per-channel ordering guarantee of the real broker. Slow subscribers that
/// fall more than the capacity behind lose the oldest messages (lag), which
/// the subscriber loop surfaces as a warning.
pub struct InMemoryBroker {
    sender: broadcast::Sender<WireMessage>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Number of currently attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerTransport for InMemoryBroker {
    async fn send(&self, message: WireMessage) -> Result<(), BrokerError> {
        match self.sender.send(message) {
            Ok(receivers) => {
                debug!(receivers, "message sent on in-memory broker");
                Ok(())
            }
            // No receivers attached; the message is dropped, which is the
            // contract for a node publishing into an empty network.
            Err(_) => {
                debug!("message dropped, no subscribers attached");
                Ok(())
            }
        }
    }

    fn incoming(&self) -> broadcast::Receiver<WireMessage> {
        self.sender.subscribe()
    }
}
