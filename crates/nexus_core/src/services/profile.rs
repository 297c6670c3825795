//! Profile cache and the profiles-sync coherency protocol.

use crate::error::CoreError;
use crate::services::cash::CashService;
use crate::services::permission::PermissionService;
use crate::store::{ProfileRepository, RoleLogRepository};
use async_trait::async_trait;
use dashmap::DashMap;
use nexus_broker::{
    BrokerError, ChannelListener, Packet, ProfileSyncPacket, Publisher, SyncAction,
};
use nexus_types::{
    current_timestamp_ms, PlayerId, Profile, RoleGrant, RoleId, RoleLog, RoleLogAction,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-node profile cache over the `profiles` collection.
///
/// Entries appear from local demand only (a player joining this node); a
/// sync packet for a player this node never loaded is a no-op. An absent
/// entry means the store must be consulted.
pub struct ProfileService {
    repo: Arc<dyn ProfileRepository>,
    role_logs: Arc<dyn RoleLogRepository>,
    cache: DashMap<PlayerId, Profile>,
    publisher: Publisher,
}

impl ProfileService {
    pub fn new(
        repo: Arc<dyn ProfileRepository>,
        role_logs: Arc<dyn RoleLogRepository>,
        publisher: Publisher,
    ) -> Self {
        Self {
            repo,
            role_logs,
            cache: DashMap::new(),
            publisher,
        }
    }

    /// Loads a profile into the cache, creating the document on first
    /// sight of the player. Called on local join.
    pub async fn load(&self, uuid: PlayerId, name: &str) -> Result<Profile, CoreError> {
        if let Some(cached) = self.cache.get(&uuid) {
            return Ok(cached.clone());
        }

        let mut profile = match self.repo.find_by_uuid(uuid).await? {
            Some(profile) => profile,
            None => {
                info!(%uuid, name, "first join, creating profile document");
                Profile::new(uuid, name)
            }
        };
        profile.name = name.to_string();
        profile.last_seen = current_timestamp_ms();
        self.repo.upsert(&profile).await?;

        self.cache.insert(uuid, profile.clone());
        debug!(%uuid, "profile cached");
        Ok(profile)
    }

    /// Cached copy, if this node holds one.
    pub fn cached(&self, uuid: PlayerId) -> Option<Profile> {
        self.cache.get(&uuid).map(|p| p.clone())
    }

    /// Drops the cache entry. Called on local quit.
    pub fn unload(&self, uuid: PlayerId) {
        if self.cache.remove(&uuid).is_some() {
            debug!(%uuid, "profile uncached");
        }
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    /// Grants a role (optionally expiring), writes the store, then notifies
    /// peers with the changed role list.
    pub async fn grant_role(&self, uuid: PlayerId, grant: RoleGrant) -> Result<(), CoreError> {
        let mut profile = self.authoritative(uuid).await?;
        if profile.roles.iter().any(|g| g.role_id == grant.role_id) {
            warn!(%uuid, role = %grant.role_id, "role already granted, no-op");
            return Ok(());
        }
        let role_id = grant.role_id;
        profile.roles.push(grant);
        self.save_and_sync(profile).await?;
        self.audit(uuid, role_id, RoleLogAction::Granted).await
    }

    /// Revokes a role, writes the store, then notifies peers.
    pub async fn revoke_role(&self, uuid: PlayerId, role_id: RoleId) -> Result<(), CoreError> {
        let mut profile = self.authoritative(uuid).await?;
        let before = profile.roles.len();
        profile.roles.retain(|g| g.role_id != role_id);
        if profile.roles.len() == before {
            warn!(%uuid, role = %role_id, "revoke on ungranted role, no-op");
            return Ok(());
        }
        self.save_and_sync(profile).await?;
        self.audit(uuid, role_id, RoleLogAction::Revoked).await
    }

    /// Removes expired role grants from every locally-cached profile.
    /// Returns the affected player ids so the caller can invalidate
    /// permission caches.
    pub async fn sweep_expired_roles(&self, now_ms: u64) -> Result<Vec<PlayerId>, CoreError> {
        let expired: Vec<PlayerId> = self
            .cache
            .iter()
            .filter(|p| p.roles.iter().any(|g| g.is_expired(now_ms)))
            .map(|p| p.uuid)
            .collect();

        let mut swept = Vec::new();
        for uuid in expired {
            let mut profile = self.authoritative(uuid).await?;
            let removed: Vec<RoleId> = profile
                .roles
                .iter()
                .filter(|g| g.is_expired(now_ms))
                .map(|g| g.role_id)
                .collect();
            if removed.is_empty() {
                continue;
            }
            profile.roles.retain(|g| !g.is_expired(now_ms));
            info!(%uuid, removed = removed.len(), "expired role grants swept");
            self.save_and_sync(profile).await?;
            for role_id in removed {
                self.audit(uuid, role_id, RoleLogAction::Expired).await?;
            }
            swept.push(uuid);
        }
        Ok(swept)
    }

    /// Coherency step 3: applies a peer's sync packet to the local cache,
    /// update-only-if-present.
    pub fn apply_sync(&self, packet: &ProfileSyncPacket) {
        match packet.action {
            SyncAction::Invalidate => {
                if self.cache.remove(&packet.uuid).is_some() {
                    debug!(uuid = %packet.uuid, "profile cache entry invalidated");
                }
            }
            SyncAction::Upsert => {
                let Some(mut entry) = self.cache.get_mut(&packet.uuid) else {
                    // Cache miss: no-op, the next local read hits the store.
                    debug!(uuid = %packet.uuid, "profile sync for uncached player ignored");
                    return;
                };
                if let Some(name) = &packet.name {
                    entry.name = name.clone();
                }
                if let Some(cash) = packet.cash {
                    entry.cash = cash;
                }
                if let Some(roles) = &packet.roles {
                    entry.roles = roles.clone();
                }
                debug!(uuid = %packet.uuid, "profile cache entry updated from sync");
            }
        }
    }

    /// Store read that falls back to the cache being stale: the store is
    /// ground truth for every mutation.
    async fn authoritative(&self, uuid: PlayerId) -> Result<Profile, CoreError> {
        self.repo
            .find_by_uuid(uuid)
            .await?
            .ok_or_else(|| CoreError::Other(format!("profile {uuid} not in store")))
    }

    async fn audit(
        &self,
        uuid: PlayerId,
        role_id: RoleId,
        action: RoleLogAction,
    ) -> Result<(), CoreError> {
        self.role_logs
            .insert(&RoleLog {
                uuid,
                role_id,
                action,
                timestamp: current_timestamp_ms(),
            })
            .await?;
        info!(%uuid, role = %role_id, %action, "role grant change logged");
        Ok(())
    }

    /// Coherency steps 1 and 2: authoritative write, then publish the
    /// changed fields so peers can apply without a round trip.
    async fn save_and_sync(&self, profile: Profile) -> Result<(), CoreError> {
        self.repo.upsert(&profile).await?;
        if self.cache.contains_key(&profile.uuid) {
            self.cache.insert(profile.uuid, profile.clone());
        }
        self.publisher
            .publish(Packet::ProfilesSync(ProfileSyncPacket {
                action: SyncAction::Upsert,
                uuid: profile.uuid,
                name: Some(profile.name.clone()),
                cash: Some(profile.cash),
                roles: Some(profile.roles.clone()),
            }))
            .await;
        Ok(())
    }
}

/// The single listener bound to the profiles-sync channel.
///
/// One channel, one listener: profile cache, cash cache and permission
/// cache all react to the same packet, so this listener coordinates all
/// three.
pub struct ProfileSyncListener {
    profiles: Arc<ProfileService>,
    cash: Arc<CashService>,
    permissions: Arc<PermissionService>,
}

impl ProfileSyncListener {
    pub fn new(
        profiles: Arc<ProfileService>,
        cash: Arc<CashService>,
        permissions: Arc<PermissionService>,
    ) -> Self {
        Self {
            profiles,
            cash,
            permissions,
        }
    }
}

#[async_trait]
impl ChannelListener for ProfileSyncListener {
    async fn on_message(&self, packet: Packet) -> Result<(), BrokerError> {
        let Packet::ProfilesSync(sync) = packet else {
            warn!("profiles-sync listener received foreign packet");
            return Ok(());
        };

        self.profiles.apply_sync(&sync);
        if let Some(cash) = sync.cash {
            self.cash.apply_balance(sync.uuid, Some(cash));
        }
        // Role list changes make any cached effective set stale.
        if sync.roles.is_some() || sync.action == SyncAction::Invalidate {
            self.permissions.clear_cache(sync.uuid);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Stores};
    use nexus_broker::InMemoryBroker;
    use nexus_types::RoleId;

    fn service() -> (Arc<MemoryStore>, ProfileService) {
        let store = Arc::new(MemoryStore::new());
        let publisher = Publisher::new(Arc::new(InMemoryBroker::new()));
        (
            store.clone(),
            ProfileService::new(store.clone(), store, publisher),
        )
    }

    #[tokio::test]
    async fn load_creates_and_caches() {
        let (_store, service) = service();
        let uuid = PlayerId::new();

        let profile = service.load(uuid, "alex").await.unwrap();
        assert_eq!(profile.name, "alex");
        assert_eq!(service.cached_count(), 1);

        // Second load is a cache hit.
        let again = service.load(uuid, "alex").await.unwrap();
        assert_eq!(again.uuid, uuid);
    }

    #[tokio::test]
    async fn sync_upsert_for_uncached_player_is_noop() {
        let (_store, service) = service();

        service.apply_sync(&ProfileSyncPacket {
            action: SyncAction::Upsert,
            uuid: PlayerId::new(),
            name: None,
            cash: Some(500),
            roles: None,
        });

        assert_eq!(service.cached_count(), 0);
    }

    #[tokio::test]
    async fn sync_upsert_updates_cached_entry_in_place() {
        let (_store, service) = service();
        let uuid = PlayerId::new();
        service.load(uuid, "alex").await.unwrap();

        service.apply_sync(&ProfileSyncPacket {
            action: SyncAction::Upsert,
            uuid,
            name: Some("alexis".to_string()),
            cash: Some(500),
            roles: None,
        });

        let cached = service.cached(uuid).unwrap();
        assert_eq!(cached.name, "alexis");
        assert_eq!(cached.cash, 500);
    }

    #[tokio::test]
    async fn sync_invalidate_drops_entry() {
        let (_store, service) = service();
        let uuid = PlayerId::new();
        service.load(uuid, "alex").await.unwrap();

        service.apply_sync(&ProfileSyncPacket::invalidate(uuid));
        assert!(service.cached(uuid).is_none());
    }

    #[tokio::test]
    async fn grant_and_expiry_sweep() {
        let (store, service) = service();
        let uuid = PlayerId::new();
        service.load(uuid, "alex").await.unwrap();

        service
            .grant_role(uuid, RoleGrant::until(RoleId(7), 1_000))
            .await
            .unwrap();
        service
            .grant_role(uuid, RoleGrant::permanent(RoleId(8)))
            .await
            .unwrap();

        let swept = service.sweep_expired_roles(2_000).await.unwrap();
        assert_eq!(swept, vec![uuid]);

        let stored = store.find_by_uuid(uuid).await.unwrap().unwrap();
        let ids: Vec<RoleId> = stored.role_ids().collect();
        assert_eq!(ids, vec![RoleId(8)]);

        // Sweep again: nothing left to remove.
        let swept = service.sweep_expired_roles(3_000).await.unwrap();
        assert!(swept.is_empty());

        // Two grants and one expiry in the audit trail.
        let logs = store.role_log_entries();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[2].action, nexus_types::RoleLogAction::Expired);
        assert_eq!(logs[2].role_id, RoleId(7));
    }

    #[tokio::test]
    async fn duplicate_grant_is_noop() {
        let (store, service) = service();
        let uuid = PlayerId::new();
        service.load(uuid, "alex").await.unwrap();

        service
            .grant_role(uuid, RoleGrant::permanent(RoleId(1)))
            .await
            .unwrap();
        service
            .grant_role(uuid, RoleGrant::permanent(RoleId(1)))
            .await
            .unwrap();

        let stored = store.find_by_uuid(uuid).await.unwrap().unwrap();
        assert_eq!(stored.roles.len(), 1);
    }

    #[tokio::test]
    async fn stores_bundle_compiles_with_service() {
        // Services take the repository seam, not the concrete store.
        let stores = Stores::in_memory();
        let publisher = Publisher::new(Arc::new(InMemoryBroker::new()));
        let service =
            ProfileService::new(stores.profiles.clone(), stores.role_logs.clone(), publisher);
        assert_eq!(service.cached_count(), 0);
    }
}
