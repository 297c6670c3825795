//! In-memory implementation of the repository traits.

use super::{
    CashLogRepository, CounterRepository, PreferencesRepository, ProfileRepository,
    RoleLogRepository, RoleRepository, ServerRepository,
};
use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use nexus_types::{CashLog, PlayerId, Preferences, Profile, Role, RoleId, RoleLog, ServerStatus};
use std::sync::Mutex;

/// One store instance backing every collection, all in process memory.
#[derive(Default)]
pub struct MemoryStore {
    profiles: DashMap<PlayerId, Profile>,
    roles: DashMap<RoleId, Role>,
    preferences: DashMap<PlayerId, Preferences>,
    cash_logs: Mutex<Vec<CashLog>>,
    role_logs: Mutex<Vec<RoleLog>>,
    servers: DashMap<String, ServerStatus>,
    counters: DashMap<String, i64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the cash audit log, for tests and diagnostics.
    pub fn cash_log_entries(&self) -> Vec<CashLog> {
        self.cash_logs
            .lock()
            .map(|logs| logs.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the role audit log, for tests and diagnostics.
    pub fn role_log_entries(&self) -> Vec<RoleLog> {
        self.role_logs
            .lock()
            .map(|logs| logs.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProfileRepository for MemoryStore {
    async fn find_by_uuid(&self, uuid: PlayerId) -> Result<Option<Profile>, StoreError> {
        Ok(self.profiles.get(&uuid).map(|p| p.clone()))
    }

    async fn upsert(&self, profile: &Profile) -> Result<(), StoreError> {
        self.profiles.insert(profile.uuid, profile.clone());
        Ok(())
    }

    async fn top_balances(&self, limit: usize) -> Result<Vec<(PlayerId, i64)>, StoreError> {
        let mut balances: Vec<(PlayerId, i64)> = self
            .profiles
            .iter()
            .map(|p| (p.uuid, p.cash))
            .collect();
        balances.sort_by(|a, b| b.1.cmp(&a.1));
        balances.truncate(limit);
        Ok(balances)
    }
}

#[async_trait]
impl RoleRepository for MemoryStore {
    async fn find_by_id(&self, id: RoleId) -> Result<Option<Role>, StoreError> {
        Ok(self.roles.get(&id).map(|r| r.clone()))
    }

    async fn find_all(&self) -> Result<Vec<Role>, StoreError> {
        Ok(self.roles.iter().map(|r| r.clone()).collect())
    }

    async fn upsert(&self, role: &Role) -> Result<(), StoreError> {
        self.roles.insert(role.id, role.clone());
        Ok(())
    }
}

#[async_trait]
impl PreferencesRepository for MemoryStore {
    async fn find_by_uuid(&self, uuid: PlayerId) -> Result<Option<Preferences>, StoreError> {
        Ok(self.preferences.get(&uuid).map(|p| p.clone()))
    }

    async fn upsert(&self, preferences: &Preferences) -> Result<(), StoreError> {
        self.preferences.insert(preferences.uuid, preferences.clone());
        Ok(())
    }
}

#[async_trait]
impl CashLogRepository for MemoryStore {
    async fn insert(&self, log: &CashLog) -> Result<(), StoreError> {
        self.cash_logs
            .lock()
            .map_err(|_| StoreError::Backend("cash log mutex poisoned".to_string()))?
            .push(log.clone());
        Ok(())
    }
}

#[async_trait]
impl RoleLogRepository for MemoryStore {
    async fn insert(&self, log: &RoleLog) -> Result<(), StoreError> {
        self.role_logs
            .lock()
            .map_err(|_| StoreError::Backend("role log mutex poisoned".to_string()))?
            .push(log.clone());
        Ok(())
    }
}

#[async_trait]
impl ServerRepository for MemoryStore {
    async fn upsert_status(&self, status: &ServerStatus) -> Result<(), StoreError> {
        self.servers.insert(status.server.clone(), status.clone());
        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<ServerStatus>, StoreError> {
        Ok(self.servers.iter().map(|s| s.clone()).collect())
    }
}

#[async_trait]
impl CounterRepository for MemoryStore {
    async fn next_id(&self, name: &str) -> Result<i64, StoreError> {
        let mut entry = self.counters.entry(name.to_string()).or_insert(0);
        *entry += 1;
        Ok(*entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn profile_round_trip() {
        let store = MemoryStore::new();
        let uuid = PlayerId::new();
        let profile = Profile::new(uuid, "alex");

        ProfileRepository::upsert(&store, &profile).await.unwrap();
        let found = ProfileRepository::find_by_uuid(&store, uuid).await.unwrap();
        assert_eq!(found, Some(profile));

        let missing = ProfileRepository::find_by_uuid(&store, PlayerId::new())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn top_balances_sorted_descending() {
        let store = MemoryStore::new();
        for (name, cash) in [("a", 10), ("b", 500), ("c", 100)] {
            let mut profile = Profile::new(PlayerId::new(), name);
            profile.cash = cash;
            ProfileRepository::upsert(&store, &profile).await.unwrap();
        }

        let top = store.top_balances(2).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].1, 500);
        assert_eq!(top[1].1, 100);
    }

    #[tokio::test]
    async fn counters_increment_atomically() {
        let store = MemoryStore::new();
        assert_eq!(store.next_id("roles").await.unwrap(), 1);
        assert_eq!(store.next_id("roles").await.unwrap(), 2);
        assert_eq!(store.next_id("arenas").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cash_logs_append() {
        let store = MemoryStore::new();
        let log = CashLog {
            uuid: PlayerId::new(),
            delta: 50,
            balance: 150,
            reason: "minigame reward".to_string(),
            timestamp: 1,
        };
        CashLogRepository::insert(&store, &log).await.unwrap();
        assert_eq!(store.cash_log_entries(), vec![log]);
    }
}
