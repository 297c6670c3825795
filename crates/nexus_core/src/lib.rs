//! # Nexus Core
//!
//! The lifecycle orchestrator and cross-node synchronization services of the
//! Nexus server network. A process bootstraps by constructing a
//! [`CoreContext`] (registry, broker handles, scheduler, store
//! repositories), registering its feature [`Module`]s with the
//! [`ModuleManager`], and enabling them in priority order. Modules construct
//! services, register them in the [`ServiceRegistry`], and bind channel
//! listeners on the shared subscriber; teardown runs in reverse order.
//!
//! The coherency contract for every stateful cache is update-only-if-
//! present: a sync packet for a key this node never loaded is a no-op, so
//! caches only grow from local demand and the persistent store remains the
//! single source of truth.

pub mod context;
pub mod error;
pub mod host;
pub mod module;
pub mod modules;
pub mod registry;
pub mod scheduler;
pub mod services;
pub mod store;

#[cfg(test)]
mod sync_integration_test;

pub use context::CoreContext;
pub use error::{CoreError, StoreError};
pub use host::{HostRuntime, NullHostRuntime};
pub use module::{Module, ModuleManager, ModuleState};
pub use registry::ServiceRegistry;
pub use scheduler::Scheduler;
pub use store::Stores;
