//! End-to-end tests: two independent node contexts wired to one broker
//! transport, exercising the full module bootstrap and the cache-coherency
//! protocol across "processes".

use crate::context::CoreContext;
use crate::error::CoreError;
use crate::host::NullHostRuntime;
use crate::module::{Module, ModuleManager, ModuleState};
use crate::modules::standard_modules;
use crate::services::{keys, CashService, ProfileService};
use crate::store::{ProfileRepository, Stores};
use async_trait::async_trait;
use nexus_broker::{BrokerTransport, InMemoryBroker};
use nexus_types::{PlayerId, Profile, RoleGrant, RoleId};
use std::sync::Arc;
use std::time::Duration;

fn node(name: &str, transport: &Arc<dyn BrokerTransport>, stores: &Stores) -> Arc<CoreContext> {
    CoreContext::new(
        name,
        transport.clone(),
        stores.clone(),
        Arc::new(NullHostRuntime),
    )
}

async fn bootstrap(ctx: &Arc<CoreContext>) -> ModuleManager {
    let mut manager = ModuleManager::new();
    for module in standard_modules() {
        manager.register(module);
    }
    manager.enable_all(ctx).await;
    manager
}

/// Polls until `check` passes or the deadline hits. Broker delivery runs on
/// its own task, so assertions after a publish must wait for it.
async fn eventually(check: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn cash_update_propagates_to_peer_cache() {
    let transport: Arc<dyn BrokerTransport> = Arc::new(InMemoryBroker::new());
    // Both nodes share one persistent store, as in production.
    let stores = Stores::in_memory();

    let node_a = node("node-a", &transport, &stores);
    let node_b = node("node-b", &transport, &stores);
    let mut manager_a = bootstrap(&node_a).await;
    let mut manager_b = bootstrap(&node_b).await;

    let uuid = PlayerId::new();
    let mut profile = Profile::new(uuid, "steve");
    profile.cash = 100;
    stores.profiles.upsert(&profile).await.unwrap();

    // Player is cached on node A only.
    let profiles_a: Arc<ProfileService> = node_a.registry.require(keys::PROFILE_SERVICE).unwrap();
    let cash_a: Arc<CashService> = node_a.registry.require(keys::CASH_SERVICE).unwrap();
    profiles_a.load(uuid, "steve").await.unwrap();
    cash_a.load(uuid).await.unwrap();
    assert_eq!(cash_a.cached(uuid), Some(100));

    // Node B performs the authoritative mutation and publishes.
    let cash_b: Arc<CashService> = node_b.registry.require(keys::CASH_SERVICE).unwrap();
    let balance = cash_b.add(uuid, 400, "quest reward").await.unwrap();
    assert_eq!(balance, 500);

    // Node A's listener applies the carried balance without a store read.
    eventually(|| cash_a.cached(uuid) == Some(500)).await;
    // Cash notices do not touch the profile cache; that entry still shows
    // the value from load time until a profile sync arrives.
    assert_eq!(profiles_a.cached(uuid).map(|p| p.cash), Some(100));

    // A profile mutation on node B publishes the full document, which
    // refreshes node A's cached profile (roles and carried cash alike).
    let profiles_b: Arc<ProfileService> = node_b.registry.require(keys::PROFILE_SERVICE).unwrap();
    profiles_b
        .grant_role(uuid, RoleGrant::permanent(RoleId(3)))
        .await
        .unwrap();
    eventually(|| profiles_a.cached(uuid).map(|p| p.cash) == Some(500)).await;
    eventually(|| {
        profiles_a
            .cached(uuid)
            .map(|p| p.roles.iter().any(|g| g.role_id == RoleId(3)))
            == Some(true)
    })
    .await;

    manager_a.disable_all(&node_a).await;
    manager_b.disable_all(&node_b).await;
    node_a.shutdown();
    node_b.shutdown();
}

#[tokio::test]
async fn sync_for_uncached_player_does_not_insert() {
    let transport: Arc<dyn BrokerTransport> = Arc::new(InMemoryBroker::new());
    let stores = Stores::in_memory();

    let node_a = node("node-a", &transport, &stores);
    let node_b = node("node-b", &transport, &stores);
    let mut manager_a = bootstrap(&node_a).await;
    let mut manager_b = bootstrap(&node_b).await;

    let uuid = PlayerId::new();
    stores
        .profiles
        .upsert(&Profile::new(uuid, "alex"))
        .await
        .unwrap();

    // Node A never loaded this player.
    let cash_a: Arc<CashService> = node_a.registry.require(keys::CASH_SERVICE).unwrap();
    let profiles_a: Arc<ProfileService> = node_a.registry.require(keys::PROFILE_SERVICE).unwrap();

    let cash_b: Arc<CashService> = node_b.registry.require(keys::CASH_SERVICE).unwrap();
    cash_b.add(uuid, 999, "jackpot").await.unwrap();

    // Give delivery a moment, then confirm the miss stayed a miss.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(cash_a.cached(uuid), None);
    assert!(profiles_a.cached(uuid).is_none());

    manager_a.disable_all(&node_a).await;
    manager_b.disable_all(&node_b).await;
    node_a.shutdown();
    node_b.shutdown();
}

#[tokio::test]
async fn heartbeats_build_peer_topology() {
    let transport: Arc<dyn BrokerTransport> = Arc::new(InMemoryBroker::new());
    let stores = Stores::in_memory();

    let node_a = node("lobby-1", &transport, &stores);
    let node_b = node("game-7", &transport, &stores);
    let mut manager_a = bootstrap(&node_a).await;
    let mut manager_b = bootstrap(&node_b).await;

    // Force a beat from B instead of waiting for the timer.
    let heartbeat_b: Arc<crate::services::HeartbeatService> =
        node_b.registry.require(keys::HEARTBEAT_SERVICE).unwrap();
    heartbeat_b.update_status(|s| {
        s.status = nexus_types::ServerState::Online;
        s.players = 9;
    });
    heartbeat_b.beat().await.unwrap();

    let view_a: Arc<crate::services::TopologyView> =
        node_a.registry.require(keys::TOPOLOGY_VIEW).unwrap();
    eventually(|| view_a.server("game-7").is_some()).await;
    assert_eq!(view_a.server("game-7").unwrap().players, 9);

    manager_a.disable_all(&node_a).await;
    manager_b.disable_all(&node_b).await;
    node_a.shutdown();
    node_b.shutdown();
}

#[tokio::test]
async fn dependency_metadata_does_not_override_priority() {
    struct MetadataModule {
        name: &'static str,
        priority: i32,
        deps: Vec<&'static str>,
        log: Arc<std::sync::Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Module for MetadataModule {
        fn name(&self) -> &str {
            self.name
        }

        fn dependencies(&self) -> &[&str] {
            &self.deps
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        async fn on_enable(&mut self, _ctx: &Arc<CoreContext>) -> Result<(), CoreError> {
            self.log.lock().unwrap().push(self.name);
            Ok(())
        }

        async fn on_disable(&mut self, _ctx: &Arc<CoreContext>) -> Result<(), CoreError> {
            Ok(())
        }
    }

    let transport: Arc<dyn BrokerTransport> = Arc::new(InMemoryBroker::new());
    let ctx = node("test", &transport, &Stores::in_memory());
    let log = Arc::new(std::sync::Mutex::new(Vec::new()));

    let mut manager = ModuleManager::new();
    // Priority 10 declares a dependency on the priority-5 module; ordering
    // is decided by priority alone, which here happens to satisfy it.
    manager.register(Box::new(MetadataModule {
        name: "dependent",
        priority: 10,
        deps: vec!["base"],
        log: log.clone(),
    }));
    manager.register(Box::new(MetadataModule {
        name: "base",
        priority: 5,
        deps: vec![],
        log: log.clone(),
    }));

    manager.enable_all(&ctx).await;
    assert_eq!(*log.lock().unwrap(), vec!["base", "dependent"]);
    assert_eq!(manager.state("dependent"), Some(ModuleState::Enabled));
    ctx.shutdown();
}
