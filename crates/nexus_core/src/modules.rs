//! The built-in feature modules.
//!
//! Bootstrap registers these with the [`ModuleManager`](crate::ModuleManager)
//! in an explicit list (no reflective scanning); priorities encode the
//! dependency order: services exist before the sync module binds listeners,
//! listeners exist before heartbeats start flowing.

use crate::context::CoreContext;
use crate::error::CoreError;
use crate::module::Module;
use crate::services::{
    keys, CashCacheListener, CashService, ChatListener, ChatService, HeartbeatService,
    PermissionService, PreferencesService, PreferencesSyncListener, ProfileService,
    ProfileSyncListener, TopologyListener, TopologyView,
};
use async_trait::async_trait;
use nexus_broker::Channel;
use std::sync::Arc;
use std::time::Duration;

const ROLE_EXPIRY_TASK: &str = "role-expiry-sweep";
const LEADERBOARD_TASK: &str = "leaderboard-refresh";
const HEARTBEAT_TASK: &str = "server-heartbeat";
const TOPOLOGY_SWEEP_TASK: &str = "topology-stale-sweep";

/// Profile and cash services. Everything else builds on these.
pub struct ProfileModule;

#[async_trait]
impl Module for ProfileModule {
    fn name(&self) -> &str {
        "profiles"
    }

    fn description(&self) -> &str {
        "profile documents, cash balances and audit logging"
    }

    fn priority(&self) -> i32 {
        10
    }

    async fn on_enable(&mut self, ctx: &Arc<CoreContext>) -> Result<(), CoreError> {
        let profiles = Arc::new(ProfileService::new(
            ctx.stores.profiles.clone(),
            ctx.stores.role_logs.clone(),
            ctx.publisher.clone(),
        ));
        let cash = Arc::new(CashService::new(
            ctx.stores.profiles.clone(),
            ctx.stores.cash_logs.clone(),
            ctx.publisher.clone(),
        ));
        ctx.registry.register(keys::PROFILE_SERVICE, profiles);
        ctx.registry.register(keys::CASH_SERVICE, cash);
        Ok(())
    }

    async fn on_disable(&mut self, ctx: &Arc<CoreContext>) -> Result<(), CoreError> {
        ctx.registry.unregister(keys::CASH_SERVICE);
        ctx.registry.unregister(keys::PROFILE_SERVICE);
        Ok(())
    }
}

/// Role table, permission resolution and the role-expiry sweep.
pub struct PermissionModule {
    pub expiry_sweep_interval: Duration,
}

impl Default for PermissionModule {
    fn default() -> Self {
        Self {
            expiry_sweep_interval: Duration::from_secs(60),
        }
    }
}

#[async_trait]
impl Module for PermissionModule {
    fn name(&self) -> &str {
        "permissions"
    }

    fn description(&self) -> &str {
        "weighted roles, permission resolution, timed grants"
    }

    fn dependencies(&self) -> &[&str] {
        &["profiles"]
    }

    fn priority(&self) -> i32 {
        15
    }

    async fn on_enable(&mut self, ctx: &Arc<CoreContext>) -> Result<(), CoreError> {
        let permissions = Arc::new(PermissionService::new(
            ctx.stores.roles.clone(),
            ctx.stores.counters.clone(),
        ));
        permissions.reload_roles().await?;
        ctx.registry.register(keys::PERMISSION_SERVICE, permissions.clone());

        let profiles: Arc<ProfileService> = ctx.registry.require(keys::PROFILE_SERVICE)?;
        ctx.scheduler.spawn_repeating(
            ROLE_EXPIRY_TASK,
            self.expiry_sweep_interval,
            move || {
                let profiles = profiles.clone();
                let permissions = permissions.clone();
                async move {
                    let now = nexus_types::current_timestamp_ms();
                    for uuid in profiles.sweep_expired_roles(now).await? {
                        permissions.clear_cache(uuid);
                    }
                    Ok(())
                }
            },
        );
        Ok(())
    }

    async fn on_disable(&mut self, ctx: &Arc<CoreContext>) -> Result<(), CoreError> {
        ctx.scheduler.cancel(ROLE_EXPIRY_TASK);
        if let Ok(permissions) = ctx
            .registry
            .require::<PermissionService>(keys::PERMISSION_SERVICE)
        {
            permissions.clear_all_cache();
        }
        ctx.registry.unregister(keys::PERMISSION_SERVICE);
        Ok(())
    }
}

/// Preference flags service.
pub struct PreferencesModule;

#[async_trait]
impl Module for PreferencesModule {
    fn name(&self) -> &str {
        "preferences"
    }

    fn priority(&self) -> i32 {
        20
    }

    async fn on_enable(&mut self, ctx: &Arc<CoreContext>) -> Result<(), CoreError> {
        let preferences = Arc::new(PreferencesService::new(
            ctx.stores.preferences.clone(),
            ctx.publisher.clone(),
        ));
        ctx.registry.register(keys::PREFERENCES_SERVICE, preferences);
        Ok(())
    }

    async fn on_disable(&mut self, ctx: &Arc<CoreContext>) -> Result<(), CoreError> {
        ctx.registry.unregister(keys::PREFERENCES_SERVICE);
        Ok(())
    }
}

/// Binds the cache-coherency listeners and schedules the leaderboard
/// refresh. Requires every cache service; a missing one fails this module
/// only.
pub struct SyncModule {
    pub leaderboard_interval: Duration,
}

impl Default for SyncModule {
    fn default() -> Self {
        Self {
            leaderboard_interval: Duration::from_secs(300),
        }
    }
}

#[async_trait]
impl Module for SyncModule {
    fn name(&self) -> &str {
        "sync"
    }

    fn description(&self) -> &str {
        "cross-node cache coherency listeners"
    }

    fn dependencies(&self) -> &[&str] {
        &["profiles", "permissions", "preferences"]
    }

    fn priority(&self) -> i32 {
        25
    }

    async fn on_enable(&mut self, ctx: &Arc<CoreContext>) -> Result<(), CoreError> {
        let profiles: Arc<ProfileService> = ctx.registry.require(keys::PROFILE_SERVICE)?;
        let cash: Arc<CashService> = ctx.registry.require(keys::CASH_SERVICE)?;
        let permissions: Arc<PermissionService> =
            ctx.registry.require(keys::PERMISSION_SERVICE)?;
        let preferences: Arc<PreferencesService> =
            ctx.registry.require(keys::PREFERENCES_SERVICE)?;

        ctx.subscriber
            .register_listener(
                Channel::ProfilesSync,
                Arc::new(ProfileSyncListener::new(
                    profiles,
                    cash.clone(),
                    permissions,
                )),
            )
            .ok();
        ctx.subscriber
            .register_listener(
                Channel::CashCacheInvalidate,
                Arc::new(CashCacheListener::new(cash.clone())),
            )
            .ok();
        ctx.subscriber
            .register_listener(
                Channel::PreferencesSync,
                Arc::new(PreferencesSyncListener::new(preferences)),
            )
            .ok();

        ctx.scheduler
            .spawn_repeating(LEADERBOARD_TASK, self.leaderboard_interval, move || {
                let cash = cash.clone();
                async move { cash.refresh_leaderboard().await }
            });
        Ok(())
    }

    async fn on_disable(&mut self, ctx: &Arc<CoreContext>) -> Result<(), CoreError> {
        ctx.scheduler.cancel(LEADERBOARD_TASK);
        ctx.subscriber.unregister_listener(Channel::ProfilesSync).ok();
        ctx.subscriber
            .unregister_listener(Channel::CashCacheInvalidate)
            .ok();
        ctx.subscriber
            .unregister_listener(Channel::PreferencesSync)
            .ok();
        Ok(())
    }
}

/// Staff chat and cross-node chat channels.
pub struct ChatModule;

#[async_trait]
impl Module for ChatModule {
    fn name(&self) -> &str {
        "chat"
    }

    fn dependencies(&self) -> &[&str] {
        &["profiles", "permissions"]
    }

    fn priority(&self) -> i32 {
        30
    }

    async fn on_enable(&mut self, ctx: &Arc<CoreContext>) -> Result<(), CoreError> {
        let profiles: Arc<ProfileService> = ctx.registry.require(keys::PROFILE_SERVICE)?;
        let permissions: Arc<PermissionService> =
            ctx.registry.require(keys::PERMISSION_SERVICE)?;

        let chat = Arc::new(ChatService::new(
            ctx.publisher.clone(),
            ctx.node_name().to_string(),
        ));
        ctx.registry.register(keys::CHAT_SERVICE, chat);

        let listener = Arc::new(ChatListener::new(ctx.host.clone(), profiles, permissions));
        ctx.subscriber
            .register_listener(Channel::StaffChat, listener.clone())
            .ok();
        ctx.subscriber
            .register_listener(Channel::ChatChannel, listener)
            .ok();
        Ok(())
    }

    async fn on_disable(&mut self, ctx: &Arc<CoreContext>) -> Result<(), CoreError> {
        ctx.subscriber.unregister_listener(Channel::StaffChat).ok();
        ctx.subscriber.unregister_listener(Channel::ChatChannel).ok();
        ctx.registry.unregister(keys::CHAT_SERVICE);
        Ok(())
    }
}

/// Own heartbeat publication plus the topology view of everyone else's.
pub struct HeartbeatModule {
    pub interval: Duration,
    pub stale_after: Duration,
    pub max_players: u32,
}

impl Default for HeartbeatModule {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            stale_after: Duration::from_secs(30),
            max_players: 100,
        }
    }
}

#[async_trait]
impl Module for HeartbeatModule {
    fn name(&self) -> &str {
        "heartbeat"
    }

    fn description(&self) -> &str {
        "server/arena status propagation and topology view"
    }

    fn priority(&self) -> i32 {
        40
    }

    async fn on_enable(&mut self, ctx: &Arc<CoreContext>) -> Result<(), CoreError> {
        let heartbeat = Arc::new(HeartbeatService::new(
            ctx.stores.servers.clone(),
            ctx.publisher.clone(),
            ctx.node_name(),
            self.max_players,
        ));
        let view = Arc::new(TopologyView::new());

        let listener = Arc::new(TopologyListener::new(view.clone()));
        ctx.subscriber
            .register_listener(Channel::ServerStatusUpdate, listener.clone())
            .ok();
        ctx.subscriber
            .register_listener(Channel::ArenaHeartbeat, listener.clone())
            .ok();
        ctx.subscriber
            .register_listener(Channel::ArenaReservation, listener)
            .ok();

        let beat = heartbeat.clone();
        ctx.scheduler
            .spawn_repeating(HEARTBEAT_TASK, self.interval, move || {
                let beat = beat.clone();
                async move { beat.beat().await }
            });

        let sweep_view = view.clone();
        let window_ms = self.stale_after.as_millis() as u64;
        ctx.scheduler
            .spawn_repeating(TOPOLOGY_SWEEP_TASK, self.stale_after, move || {
                let sweep_view = sweep_view.clone();
                async move {
                    sweep_view.sweep_stale(window_ms);
                    Ok(())
                }
            });

        ctx.registry.register(keys::HEARTBEAT_SERVICE, heartbeat);
        ctx.registry.register(keys::TOPOLOGY_VIEW, view);
        Ok(())
    }

    async fn on_disable(&mut self, ctx: &Arc<CoreContext>) -> Result<(), CoreError> {
        ctx.scheduler.cancel(HEARTBEAT_TASK);
        ctx.scheduler.cancel(TOPOLOGY_SWEEP_TASK);
        ctx.subscriber
            .unregister_listener(Channel::ServerStatusUpdate)
            .ok();
        ctx.subscriber.unregister_listener(Channel::ArenaHeartbeat).ok();
        ctx.subscriber
            .unregister_listener(Channel::ArenaReservation)
            .ok();

        if let Ok(heartbeat) = ctx
            .registry
            .require::<HeartbeatService>(keys::HEARTBEAT_SERVICE)
        {
            heartbeat.announce_shutdown().await;
        }
        ctx.registry.unregister(keys::HEARTBEAT_SERVICE);
        ctx.registry.unregister(keys::TOPOLOGY_VIEW);
        Ok(())
    }
}

/// The standard module set in registration order.
pub fn standard_modules() -> Vec<Box<dyn Module>> {
    vec![
        Box::new(ProfileModule),
        Box::new(PermissionModule::default()),
        Box::new(PreferencesModule),
        Box::new(SyncModule::default()),
        Box::new(ChatModule),
        Box::new(HeartbeatModule::default()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullHostRuntime;
    use crate::module::{ModuleManager, ModuleState};
    use crate::store::Stores;
    use nexus_broker::{BrokerTransport, InMemoryBroker};

    fn test_context() -> Arc<CoreContext> {
        let transport: Arc<dyn BrokerTransport> = Arc::new(InMemoryBroker::new());
        CoreContext::new(
            "test-node",
            transport,
            Stores::in_memory(),
            Arc::new(NullHostRuntime),
        )
    }

    #[tokio::test]
    async fn standard_set_enables_and_disables_cleanly() {
        let ctx = test_context();
        let mut manager = ModuleManager::new();
        for module in standard_modules() {
            manager.register(module);
        }

        manager.enable_all(&ctx).await;
        for name in ["profiles", "permissions", "preferences", "sync", "chat", "heartbeat"] {
            assert_eq!(manager.state(name), Some(ModuleState::Enabled), "{name}");
        }
        assert!(ctx.subscriber.has_listener(Channel::ProfilesSync));
        assert!(ctx.registry.get::<TopologyView>(keys::TOPOLOGY_VIEW).is_some());

        manager.disable_all(&ctx).await;
        assert!(!ctx.subscriber.has_listener(Channel::ProfilesSync));
        assert!(ctx.registry.get::<ProfileService>(keys::PROFILE_SERVICE).is_none());
        ctx.shutdown();
    }

    #[tokio::test]
    async fn sync_module_without_services_stays_disabled() {
        let ctx = test_context();
        let mut manager = ModuleManager::new();
        // Sync alone: its require() calls must fail and isolate the module.
        manager.register(Box::new(SyncModule::default()));

        manager.enable_all(&ctx).await;
        assert_eq!(manager.state("sync"), Some(ModuleState::Registered));
        assert!(!ctx.subscriber.has_listener(Channel::ProfilesSync));
        ctx.shutdown();
    }
}
