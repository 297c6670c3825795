//! The publishing side of the broker.

use crate::packet::Packet;
use crate::transport::{BrokerTransport, WireMessage};
use std::sync::Arc;
use tracing::{debug, error};

/// Publishes packets on the shared broker.
///
/// Publish is fire-and-forget from the caller's perspective: serialization
/// or transport failures are logged and abandoned, never propagated. A
/// caller that cares re-publishes on its next mutation.
#[derive(Clone)]
pub struct Publisher {
    transport: Arc<dyn BrokerTransport>,
}

impl Publisher {
    pub fn new(transport: Arc<dyn BrokerTransport>) -> Self {
        Self { transport }
    }

    /// Serializes the packet and sends it on the packet's channel.
    pub async fn publish(&self, packet: Packet) {
        let channel = packet.channel();

        let body = match packet.encode() {
            Ok(body) => body,
            Err(e) => {
                error!(%channel, error = %e, "failed to serialize packet, dropping");
                return;
            }
        };

        let message = WireMessage {
            channel: channel.wire_name().to_string(),
            body,
        };

        if let Err(e) = self.transport.send(message).await {
            error!(%channel, error = %e, "broker publish failed, message abandoned");
        } else {
            debug!(%channel, "packet published");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{CashCachePacket, Packet};
    use crate::transport::InMemoryBroker;
    use nexus_types::PlayerId;

    #[tokio::test]
    async fn publish_reaches_transport_subscriber() {
        let broker = Arc::new(InMemoryBroker::new());
        let mut rx = broker.incoming();
        let publisher = Publisher::new(broker);

        let uuid = PlayerId::new();
        publisher
            .publish(Packet::CashCacheInvalidate(CashCachePacket {
                uuid,
                balance: Some(250),
            }))
            .await;

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.channel, "cash-cache-invalidate");
        let packet = Packet::decode(&msg.body).unwrap();
        match packet {
            Packet::CashCacheInvalidate(p) => assert_eq!(p.balance, Some(250)),
            other => panic!("wrong packet: {:?}", other),
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_error() {
        let publisher = Publisher::new(Arc::new(InMemoryBroker::new()));
        publisher
            .publish(Packet::CashCacheInvalidate(CashCachePacket {
                uuid: PlayerId::new(),
                balance: None,
            }))
            .await;
    }
}
