//! Preference flags cache and the preferences-sync protocol.

use crate::error::CoreError;
use crate::store::PreferencesRepository;
use async_trait::async_trait;
use dashmap::DashMap;
use nexus_broker::{
    BrokerError, ChannelListener, Packet, PreferencesSyncPacket, Publisher, SyncAction,
};
use nexus_types::{PlayerId, Preferences};
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-node preferences cache. Same coherency shape as the profile cache:
/// entries appear from local demand, peers' packets update-only-if-present.
pub struct PreferencesService {
    repo: Arc<dyn PreferencesRepository>,
    cache: DashMap<PlayerId, Preferences>,
    publisher: Publisher,
}

impl PreferencesService {
    pub fn new(repo: Arc<dyn PreferencesRepository>, publisher: Publisher) -> Self {
        Self {
            repo,
            cache: DashMap::new(),
            publisher,
        }
    }

    /// Loads (or creates) a player's preferences into the cache.
    pub async fn load(&self, uuid: PlayerId) -> Result<Preferences, CoreError> {
        if let Some(cached) = self.cache.get(&uuid) {
            return Ok(cached.clone());
        }
        let preferences = self
            .repo
            .find_by_uuid(uuid)
            .await?
            .unwrap_or_else(|| Preferences::new(uuid));
        self.cache.insert(uuid, preferences.clone());
        Ok(preferences)
    }

    pub fn cached(&self, uuid: PlayerId) -> Option<Preferences> {
        self.cache.get(&uuid).map(|p| p.clone())
    }

    pub fn unload(&self, uuid: PlayerId) {
        self.cache.remove(&uuid);
    }

    /// Reads a flag for a locally-cached player, defaulting to `true` when
    /// the player (or the flag) is unknown.
    pub fn flag(&self, uuid: PlayerId, key: &str) -> bool {
        self.cache
            .get(&uuid)
            .map(|p| p.flag(key))
            .unwrap_or(true)
    }

    /// Sets one flag: authoritative write, then publish the changed flag so
    /// peers holding the entry apply it without a round trip.
    pub async fn set_flag(
        &self,
        uuid: PlayerId,
        key: &str,
        value: bool,
    ) -> Result<(), CoreError> {
        let mut preferences = self
            .repo
            .find_by_uuid(uuid)
            .await?
            .unwrap_or_else(|| Preferences::new(uuid));
        preferences.set_flag(key, value);
        self.repo.upsert(&preferences).await?;

        if self.cache.contains_key(&uuid) {
            self.cache.insert(uuid, preferences);
        }

        let mut flags = std::collections::HashMap::new();
        flags.insert(key.to_string(), value);
        self.publisher
            .publish(Packet::PreferencesSync(PreferencesSyncPacket {
                action: SyncAction::Upsert,
                uuid,
                flags,
            }))
            .await;
        Ok(())
    }

    /// Applies a peer's packet, update-only-if-present.
    pub fn apply_sync(&self, packet: &PreferencesSyncPacket) {
        match packet.action {
            SyncAction::Invalidate => {
                self.cache.remove(&packet.uuid);
            }
            SyncAction::Upsert => {
                let Some(mut entry) = self.cache.get_mut(&packet.uuid) else {
                    debug!(uuid = %packet.uuid, "preferences sync for uncached player ignored");
                    return;
                };
                for (key, value) in &packet.flags {
                    entry.set_flag(key.clone(), *value);
                }
            }
        }
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}

/// Listener bound to the preferences-sync channel.
pub struct PreferencesSyncListener {
    preferences: Arc<PreferencesService>,
}

impl PreferencesSyncListener {
    pub fn new(preferences: Arc<PreferencesService>) -> Self {
        Self { preferences }
    }
}

#[async_trait]
impl ChannelListener for PreferencesSyncListener {
    async fn on_message(&self, packet: Packet) -> Result<(), BrokerError> {
        let Packet::PreferencesSync(sync) = packet else {
            warn!("preferences listener received foreign packet");
            return Ok(());
        };
        self.preferences.apply_sync(&sync);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use nexus_broker::InMemoryBroker;

    fn service() -> PreferencesService {
        let store = Arc::new(MemoryStore::new());
        let publisher = Publisher::new(Arc::new(InMemoryBroker::new()));
        PreferencesService::new(store, publisher)
    }

    #[tokio::test]
    async fn flags_default_to_true() {
        let service = service();
        let uuid = PlayerId::new();
        assert!(service.flag(uuid, "private-messages"));

        service.load(uuid).await.unwrap();
        service
            .set_flag(uuid, "private-messages", false)
            .await
            .unwrap();
        assert!(!service.flag(uuid, "private-messages"));
    }

    #[tokio::test]
    async fn sync_for_uncached_player_is_noop() {
        let service = service();
        let mut flags = std::collections::HashMap::new();
        flags.insert("party-requests".to_string(), false);

        service.apply_sync(&PreferencesSyncPacket {
            action: SyncAction::Upsert,
            uuid: PlayerId::new(),
            flags,
        });
        assert_eq!(service.cached_count(), 0);
    }

    #[tokio::test]
    async fn sync_updates_cached_flags() {
        let service = service();
        let uuid = PlayerId::new();
        service.load(uuid).await.unwrap();

        let mut flags = std::collections::HashMap::new();
        flags.insert("party-requests".to_string(), false);
        service.apply_sync(&PreferencesSyncPacket {
            action: SyncAction::Upsert,
            uuid,
            flags,
        });

        assert!(!service.flag(uuid, "party-requests"));
        assert!(service.flag(uuid, "untouched-flag"));
    }
}
