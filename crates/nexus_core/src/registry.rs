//! Process-wide typed service locator.

use crate::error::CoreError;
use dashmap::DashMap;
use std::any::Any;
use std::sync::Arc;
use tracing::{info, warn};

/// Lookup table mapping string service keys to singleton instances.
///
/// The registry is not a lifecycle owner: services belong to the module that
/// constructed them and live for that module's enabled period. Registration
/// happens during single-threaded module activation; lookups happen
/// concurrently from many callers afterwards, hence the concurrent map.
///
/// One instance per key: registering over an occupied key is rejected and
/// the original instance is retained.
#[derive(Default)]
pub struct ServiceRegistry {
    services: DashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    /// Binds `instance` under `key`. If the key is occupied the call is a
    /// logged no-op and the original binding wins.
    pub fn register<T: Any + Send + Sync>(&self, key: &str, instance: Arc<T>) {
        match self.services.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                warn!(key, "service key already bound, keeping original instance");
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(instance);
                info!(key, "service registered");
            }
        }
    }

    /// Removes the binding for `key`, if any.
    pub fn unregister(&self, key: &str) {
        if self.services.remove(key).is_some() {
            info!(key, "service unregistered");
        } else {
            warn!(key, "unregister on unbound service key");
        }
    }

    /// Looks up `key`, downcasting to `T`. A bound instance of the wrong
    /// type counts as absent (and is logged, since it means a key clash).
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let entry = self.services.get(key)?;
        match Arc::clone(entry.value()).downcast::<T>() {
            Ok(typed) => Some(typed),
            Err(_) => {
                warn!(key, "service bound under key has unexpected type");
                None
            }
        }
    }

    /// Like [`get`](Self::get) but signals `ServiceNotFound` when absent.
    /// Callers in module enable paths treat this as fatal to that module
    /// only.
    pub fn require<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>, CoreError> {
        self.get(key)
            .ok_or_else(|| CoreError::ServiceNotFound(key.to_string()))
    }

    /// Number of bound services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Wipes all bindings. Only used at full process shutdown.
    pub fn clear(&self) {
        let count = self.services.len();
        self.services.clear();
        info!(count, "service registry cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct CashService {
        balance: i64,
    }

    struct OtherService;

    #[test]
    fn register_and_get() {
        let registry = ServiceRegistry::new();
        registry.register("cash-service", Arc::new(CashService { balance: 100 }));

        let service = registry.get::<CashService>("cash-service").unwrap();
        assert_eq!(service.balance, 100);
    }

    #[test]
    fn duplicate_registration_keeps_original() {
        let registry = ServiceRegistry::new();
        registry.register("cash-service", Arc::new(CashService { balance: 1 }));
        registry.register("cash-service", Arc::new(CashService { balance: 2 }));

        let service = registry.get::<CashService>("cash-service").unwrap();
        assert_eq!(service.balance, 1);
    }

    #[test]
    fn require_on_empty_registry_signals_not_found() {
        let registry = ServiceRegistry::new();
        let err = registry.require::<CashService>("cash-service").unwrap_err();
        assert!(matches!(err, CoreError::ServiceNotFound(key) if key == "cash-service"));
    }

    #[test]
    fn wrong_type_counts_as_absent() {
        let registry = ServiceRegistry::new();
        registry.register("cash-service", Arc::new(OtherService));
        assert!(registry.get::<CashService>("cash-service").is_none());
    }

    #[test]
    fn unregister_and_clear() {
        let registry = ServiceRegistry::new();
        registry.register("a", Arc::new(OtherService));
        registry.register("b", Arc::new(OtherService));
        assert_eq!(registry.len(), 2);

        registry.unregister("a");
        assert_eq!(registry.len(), 1);

        registry.clear();
        assert!(registry.is_empty());
    }
}
