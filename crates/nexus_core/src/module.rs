//! Feature module lifecycle: registration, dependency-advisory priority
//! ordering, and failure-isolated enable/disable.

use crate::context::CoreContext;
use crate::error::CoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A named, priority-ordered feature unit with an enable/disable lifecycle.
///
/// Modules are constructed once per process at bootstrap and owned
/// exclusively by the [`ModuleManager`]. Lifecycle hooks run strictly
/// sequentially, never concurrently.
#[async_trait]
pub trait Module: Send + Sync {
    /// Unique module name. Duplicate registrations are rejected.
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        ""
    }

    /// Names of modules this one depends on. Advisory metadata for module
    /// authors to set priorities correctly; the manager orders by priority
    /// only and does not topologically sort these edges.
    fn dependencies(&self) -> &[&str] {
        &[]
    }

    /// Lower priority enables first.
    fn priority(&self) -> i32;

    async fn on_enable(&mut self, ctx: &Arc<CoreContext>) -> Result<(), CoreError>;

    async fn on_disable(&mut self, ctx: &Arc<CoreContext>) -> Result<(), CoreError>;
}

/// Lifecycle state of a registered module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Registered,
    Enabled,
    Disabled,
}

struct ModuleEntry {
    module: Box<dyn Module>,
    state: ModuleState,
}

/// Owns all modules of a process and drives their lifecycle.
#[derive(Default)]
pub struct ModuleManager {
    /// Registration order; index doubles as the ordering tie-breaker.
    entries: Vec<ModuleEntry>,
    index: HashMap<String, usize>,
}

impl ModuleManager {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Adds a module. Duplicate names are rejected and the first
    /// registration wins.
    pub fn register(&mut self, module: Box<dyn Module>) {
        let name = module.name().to_string();
        if self.index.contains_key(&name) {
            warn!(module = %name, "duplicate module registration rejected");
            return;
        }

        // Surface priority misconfiguration against declared dependencies
        // without changing the ordering contract.
        for dep in module.dependencies() {
            if let Some(&dep_idx) = self.index.get(*dep) {
                if self.entries[dep_idx].module.priority() > module.priority() {
                    warn!(
                        module = %name,
                        dependency = %dep,
                        "declared dependency has a later priority than the module itself"
                    );
                }
            }
        }

        info!(
            module = %name,
            version = module.version(),
            priority = module.priority(),
            "module registered"
        );
        self.index.insert(name, self.entries.len());
        self.entries.push(ModuleEntry {
            module,
            state: ModuleState::Registered,
        });
    }

    /// Enables all modules in ascending priority order, ties broken by
    /// registration order. Each module's failure is isolated: a failing
    /// `on_enable` leaves that module disabled and activation continues.
    pub async fn enable_all(&mut self, ctx: &Arc<CoreContext>) {
        let order = self.priority_order();
        info!(count = order.len(), "enabling all modules");
        for idx in order {
            self.enable_at(idx, ctx).await;
        }
    }

    /// Disables all modules in descending priority order (exact reverse of
    /// the enable order).
    pub async fn disable_all(&mut self, ctx: &Arc<CoreContext>) {
        let mut order = self.priority_order();
        order.reverse();
        info!(count = order.len(), "disabling all modules");
        for idx in order {
            self.disable_at(idx, ctx).await;
        }
    }

    /// Enables one module by name. Absent names log and return.
    pub async fn enable(&mut self, name: &str, ctx: &Arc<CoreContext>) {
        match self.index.get(name).copied() {
            Some(idx) => self.enable_at(idx, ctx).await,
            None => warn!(module = name, "enable on unknown module"),
        }
    }

    /// Disables one module by name. Absent names log and return.
    pub async fn disable(&mut self, name: &str, ctx: &Arc<CoreContext>) {
        match self.index.get(name).copied() {
            Some(idx) => self.disable_at(idx, ctx).await,
            None => warn!(module = name, "disable on unknown module"),
        }
    }

    /// Current lifecycle state of a module, if registered.
    pub fn state(&self, name: &str) -> Option<ModuleState> {
        self.index.get(name).map(|&idx| self.entries[idx].state)
    }

    /// Names of currently enabled modules, in registration order.
    pub fn enabled_modules(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.state == ModuleState::Enabled)
            .map(|e| e.module.name())
            .collect()
    }

    fn priority_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        // Stable sort keeps registration order for equal priorities.
        order.sort_by_key(|&idx| self.entries[idx].module.priority());
        order
    }

    async fn enable_at(&mut self, idx: usize, ctx: &Arc<CoreContext>) {
        let entry = &mut self.entries[idx];
        let name = entry.module.name().to_string();

        if entry.state == ModuleState::Enabled {
            warn!(module = %name, "enable on already-enabled module, no-op");
            return;
        }

        match entry.module.on_enable(ctx).await {
            Ok(()) => {
                entry.state = ModuleState::Enabled;
                info!(module = %name, "module enabled");
            }
            // Enable failure: the module stays disabled, activation of the
            // remaining modules continues.
            Err(e) => {
                error!(module = %name, error = %e, "module enable failed, staying disabled");
            }
        }
    }

    async fn disable_at(&mut self, idx: usize, ctx: &Arc<CoreContext>) {
        let entry = &mut self.entries[idx];
        let name = entry.module.name().to_string();

        if entry.state != ModuleState::Enabled {
            warn!(module = %name, "disable on non-enabled module, no-op");
            return;
        }

        match entry.module.on_disable(ctx).await {
            Ok(()) => {
                entry.state = ModuleState::Disabled;
                info!(module = %name, "module disabled");
            }
            // Disable failure: keep the enabled flag so a later retry does
            // not double-teardown.
            Err(e) => {
                error!(module = %name, error = %e, "module disable failed, flag unchanged");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullHostRuntime;
    use crate::store::Stores;
    use nexus_broker::{BrokerTransport, InMemoryBroker};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn test_context() -> Arc<CoreContext> {
        let transport: Arc<dyn BrokerTransport> = Arc::new(InMemoryBroker::new());
        CoreContext::new(
            "test-node",
            transport,
            Stores::in_memory(),
            Arc::new(NullHostRuntime),
        )
    }

    struct ProbeModule {
        name: String,
        priority: i32,
        fail_enable: bool,
        enable_calls: Arc<AtomicUsize>,
        enable_log: Arc<Mutex<Vec<String>>>,
    }

    impl ProbeModule {
        fn new(name: &str, priority: i32, log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name: name.to_string(),
                priority,
                fail_enable: false,
                enable_calls: Arc::new(AtomicUsize::new(0)),
                enable_log: log,
            }
        }
    }

    #[async_trait]
    impl Module for ProbeModule {
        fn name(&self) -> &str {
            &self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        async fn on_enable(&mut self, _ctx: &Arc<CoreContext>) -> Result<(), CoreError> {
            self.enable_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_enable {
                return Err(CoreError::Other("boom".to_string()));
            }
            self.enable_log.lock().unwrap().push(self.name.clone());
            Ok(())
        }

        async fn on_disable(&mut self, _ctx: &Arc<CoreContext>) -> Result<(), CoreError> {
            self.enable_log
                .lock()
                .unwrap()
                .push(format!("-{}", self.name));
            Ok(())
        }
    }

    #[tokio::test]
    async fn enable_all_orders_by_ascending_priority() {
        let ctx = test_context();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = ModuleManager::new();

        // Registered out of order on purpose.
        for (name, priority) in [("c", 35), ("a", 5), ("e", 100), ("b", 15), ("d", 50)] {
            manager.register(Box::new(ProbeModule::new(name, priority, log.clone())));
        }

        manager.enable_all(&ctx).await;
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c", "d", "e"]);
        ctx.shutdown();
    }

    #[tokio::test]
    async fn ties_resolve_by_registration_order() {
        let ctx = test_context();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = ModuleManager::new();

        for name in ["first", "second", "third"] {
            manager.register(Box::new(ProbeModule::new(name, 10, log.clone())));
        }

        manager.enable_all(&ctx).await;
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
        ctx.shutdown();
    }

    #[tokio::test]
    async fn double_enable_invokes_hook_once() {
        let ctx = test_context();
        let log = Arc::new(Mutex::new(Vec::new()));
        let module = ProbeModule::new("idempotent", 1, log);
        let calls = module.enable_calls.clone();

        let mut manager = ModuleManager::new();
        manager.register(Box::new(module));

        manager.enable("idempotent", &ctx).await;
        manager.enable("idempotent", &ctx).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state("idempotent"), Some(ModuleState::Enabled));
        ctx.shutdown();
    }

    #[tokio::test]
    async fn enable_failure_isolates_module() {
        let ctx = test_context();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = ModuleManager::new();

        let mut failing = ProbeModule::new("failing", 1, log.clone());
        failing.fail_enable = true;
        manager.register(Box::new(failing));
        manager.register(Box::new(ProbeModule::new("healthy", 2, log.clone())));

        manager.enable_all(&ctx).await;

        assert_eq!(manager.state("failing"), Some(ModuleState::Registered));
        assert_eq!(manager.state("healthy"), Some(ModuleState::Enabled));
        assert_eq!(*log.lock().unwrap(), vec!["healthy"]);
        ctx.shutdown();
    }

    #[tokio::test]
    async fn disable_all_runs_in_reverse_priority_order() {
        let ctx = test_context();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = ModuleManager::new();

        for (name, priority) in [("low", 5), ("high", 50)] {
            manager.register(Box::new(ProbeModule::new(name, priority, log.clone())));
        }

        manager.enable_all(&ctx).await;
        manager.disable_all(&ctx).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["low", "high", "-high", "-low"]
        );
        ctx.shutdown();
    }

    #[tokio::test]
    async fn duplicate_registration_first_wins() {
        let ctx = test_context();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = ModuleManager::new();

        manager.register(Box::new(ProbeModule::new("dup", 1, log.clone())));
        manager.register(Box::new(ProbeModule::new("dup", 99, log.clone())));

        manager.enable_all(&ctx).await;
        assert_eq!(*log.lock().unwrap(), vec!["dup"]);
        assert_eq!(manager.enabled_modules(), vec!["dup"]);
        ctx.shutdown();
    }

    #[tokio::test]
    async fn unknown_module_is_logged_not_fatal() {
        let ctx = test_context();
        let mut manager = ModuleManager::new();
        manager.enable("ghost", &ctx).await;
        manager.disable("ghost", &ctx).await;
        assert_eq!(manager.state("ghost"), None);
        ctx.shutdown();
    }
}
