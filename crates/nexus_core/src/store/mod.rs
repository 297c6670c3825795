//! Persistent store collaborators.
//!
//! The document-store driver itself is external; these traits are the
//! integration seam. Documents are simple serde structs keyed by UUID or
//! short string id, and integer ids come from a dedicated counters
//! collection via atomic increment-and-fetch.

pub mod memory;

use crate::error::StoreError;
use async_trait::async_trait;
use nexus_types::{CashLog, PlayerId, Preferences, Profile, Role, RoleId, RoleLog, ServerStatus};
use std::sync::Arc;

pub use memory::MemoryStore;

/// The `profiles` collection.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn find_by_uuid(&self, uuid: PlayerId) -> Result<Option<Profile>, StoreError>;
    async fn upsert(&self, profile: &Profile) -> Result<(), StoreError>;
    /// Top cash balances, descending. Backs the leaderboard cache.
    async fn top_balances(&self, limit: usize) -> Result<Vec<(PlayerId, i64)>, StoreError>;
}

/// The `roles` collection.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn find_by_id(&self, id: RoleId) -> Result<Option<Role>, StoreError>;
    async fn find_all(&self) -> Result<Vec<Role>, StoreError>;
    async fn upsert(&self, role: &Role) -> Result<(), StoreError>;
}

/// The `preferences` collection.
#[async_trait]
pub trait PreferencesRepository: Send + Sync {
    async fn find_by_uuid(&self, uuid: PlayerId) -> Result<Option<Preferences>, StoreError>;
    async fn upsert(&self, preferences: &Preferences) -> Result<(), StoreError>;
}

/// The `cashlogs` audit collection. Append-only.
#[async_trait]
pub trait CashLogRepository: Send + Sync {
    async fn insert(&self, log: &CashLog) -> Result<(), StoreError>;
}

/// The `rolelogs` audit collection. Append-only.
#[async_trait]
pub trait RoleLogRepository: Send + Sync {
    async fn insert(&self, log: &RoleLog) -> Result<(), StoreError>;
}

/// The `servers` collection, keyed by node name.
#[async_trait]
pub trait ServerRepository: Send + Sync {
    async fn upsert_status(&self, status: &ServerStatus) -> Result<(), StoreError>;
    async fn find_all(&self) -> Result<Vec<ServerStatus>, StoreError>;
}

/// The `counters` collection: atomic increment-and-fetch per counter name.
#[async_trait]
pub trait CounterRepository: Send + Sync {
    async fn next_id(&self, name: &str) -> Result<i64, StoreError>;
}

/// Bundle of repository handles carried by the core context.
///
/// One store connection per process, created at startup, closed at
/// shutdown; no per-request connection churn.
#[derive(Clone)]
pub struct Stores {
    pub profiles: Arc<dyn ProfileRepository>,
    pub roles: Arc<dyn RoleRepository>,
    pub preferences: Arc<dyn PreferencesRepository>,
    pub cash_logs: Arc<dyn CashLogRepository>,
    pub role_logs: Arc<dyn RoleLogRepository>,
    pub servers: Arc<dyn ServerRepository>,
    pub counters: Arc<dyn CounterRepository>,
}

impl Stores {
    /// All repositories backed by one in-memory store. Used by tests and
    /// single-node runs without an external database.
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            profiles: store.clone(),
            roles: store.clone(),
            preferences: store.clone(),
            cash_logs: store.clone(),
            role_logs: store.clone(),
            servers: store.clone(),
            counters: store,
        }
    }
}
