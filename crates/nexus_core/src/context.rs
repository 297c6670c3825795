//! The application context shared by every component.
//!
//! Replaces the global-singleton pattern: one `CoreContext` is constructed
//! at startup and handed (behind `Arc`) to every module, which lets tests
//! run multiple independent node instances in one process.

use crate::host::HostRuntime;
use crate::registry::ServiceRegistry;
use crate::scheduler::Scheduler;
use crate::store::Stores;
use nexus_broker::{BrokerTransport, Publisher, Subscriber};
use std::sync::Arc;

/// Everything a module needs to build its services: the registry, the
/// shared broker handles, the task scheduler, the store repositories and
/// the host runtime seam.
pub struct CoreContext {
    node_name: String,
    pub registry: ServiceRegistry,
    pub publisher: Publisher,
    pub subscriber: Arc<Subscriber>,
    pub scheduler: Scheduler,
    pub stores: Stores,
    pub host: Arc<dyn HostRuntime>,
}

impl CoreContext {
    /// Builds a context attached to the given broker transport. The
    /// subscriber's dispatch task starts immediately.
    pub fn new(
        node_name: impl Into<String>,
        transport: Arc<dyn BrokerTransport>,
        stores: Stores,
        host: Arc<dyn HostRuntime>,
    ) -> Arc<Self> {
        let subscriber = Subscriber::start(&transport);
        Arc::new(Self {
            node_name: node_name.into(),
            registry: ServiceRegistry::new(),
            publisher: Publisher::new(transport),
            subscriber,
            scheduler: Scheduler::new(),
            stores,
            host,
        })
    }

    /// The name this node announces on heartbeat channels.
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Full teardown: cancel timers, drop listeners, wipe the registry.
    /// Called once after `disable_all`.
    pub fn shutdown(&self) {
        self.scheduler.cancel_all();
        self.subscriber.shutdown();
        self.registry.clear();
    }
}
