//! The subscribing side of the broker: listener binding and dispatch.

use crate::channel::Channel;
use crate::error::BrokerError;
use crate::packet::Packet;
use crate::transport::{BrokerTransport, WireMessage};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Handles packets arriving on one channel.
///
/// Invoked exactly once per delivered message, on the subscriber's dispatch
/// task rather than any caller's task. Implementations must synchronize
/// their own mutable caches; concurrent maps are the norm.
#[async_trait]
pub trait ChannelListener: Send + Sync {
    async fn on_message(&self, packet: Packet) -> Result<(), BrokerError>;
}

/// Receives broker messages and routes each to the channel's bound listener.
///
/// At most one listener per channel. Binding a second listener on an
/// occupied channel is rejected; use [`Subscriber::replace_listener`] for a
/// deliberate swap. Listener failures are contained per message so one bad
/// payload cannot deafen the node to the rest of the channel.
pub struct Subscriber {
    listeners: DashMap<Channel, Arc<dyn ChannelListener>>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

impl Subscriber {
    /// Attaches to the transport and starts the dispatch task.
    pub fn start(transport: &Arc<dyn BrokerTransport>) -> Arc<Self> {
        let subscriber = Arc::new(Self {
            listeners: DashMap::new(),
            dispatch: Mutex::new(None),
        });

        let rx = transport.incoming();
        let weak = Arc::downgrade(&subscriber);
        let handle = tokio::spawn(dispatch_loop(rx, weak));

        if let Ok(mut slot) = subscriber.dispatch.lock() {
            *slot = Some(handle);
        }

        subscriber
    }

    /// Binds `listener` to `channel`. Fails if the channel is already bound.
    pub fn register_listener(
        &self,
        channel: Channel,
        listener: Arc<dyn ChannelListener>,
    ) -> Result<(), BrokerError> {
        match self.listeners.entry(channel) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                warn!(%channel, "listener already bound, registration rejected");
                Err(BrokerError::ChannelBound(channel))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(listener);
                info!(%channel, "listener registered");
                Ok(())
            }
        }
    }

    /// Binds `listener` to `channel`, displacing any existing binding.
    pub fn replace_listener(&self, channel: Channel, listener: Arc<dyn ChannelListener>) {
        let displaced = self.listeners.insert(channel, listener).is_some();
        info!(%channel, displaced, "listener bound");
    }

    /// Removes the binding for `channel`.
    pub fn unregister_listener(&self, channel: Channel) -> Result<(), BrokerError> {
        if self.listeners.remove(&channel).is_some() {
            info!(%channel, "listener unregistered");
            Ok(())
        } else {
            warn!(%channel, "unregister on unbound channel");
            Err(BrokerError::ListenerNotFound(channel))
        }
    }

    /// Whether a listener is currently bound to `channel`.
    pub fn has_listener(&self, channel: Channel) -> bool {
        self.listeners.contains_key(&channel)
    }

    /// Drops all bindings and stops the dispatch task. Used at shutdown.
    pub fn shutdown(&self) {
        self.listeners.clear();
        if let Ok(mut slot) = self.dispatch.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        info!("subscriber shut down");
    }

    async fn deliver(&self, message: WireMessage) {
        let packet = match Packet::decode(&message.body) {
            Ok(packet) => packet,
            Err(e) => {
                // Malformed payload: drop the message, keep the loop alive.
                warn!(channel = %message.channel, error = %e, "dropping undecodable message");
                return;
            }
        };

        let channel = packet.channel();
        let listener = match self.listeners.get(&channel) {
            Some(entry) => Arc::clone(entry.value()),
            None => {
                debug!(%channel, "no listener bound, message ignored");
                return;
            }
        };

        // Contain both errors and panics to this one message.
        match AssertUnwindSafe(listener.on_message(packet))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(%channel, error = %e, "listener reported failure"),
            Err(_) => warn!(%channel, "listener panicked, message skipped"),
        }
    }
}

async fn dispatch_loop(mut rx: broadcast::Receiver<WireMessage>, subscriber: Weak<Subscriber>) {
    loop {
        match rx.recv().await {
            Ok(message) => {
                let Some(subscriber) = subscriber.upgrade() else {
                    break;
                };
                subscriber.deliver(message).await;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "subscriber lagged, messages lost");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("broker transport closed, dispatch loop ending");
                break;
            }
        }
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.dispatch.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}
