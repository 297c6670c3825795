//! Cash balance cache, audit logging and the top-balance leaderboard.

use crate::error::CoreError;
use crate::store::{CashLogRepository, ProfileRepository};
use async_trait::async_trait;
use dashmap::DashMap;
use nexus_broker::{BrokerError, CashCachePacket, ChannelListener, Packet, Publisher};
use nexus_types::{current_timestamp_ms, CashLog, PlayerId};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Size of the cached leaderboard.
pub const LEADERBOARD_SIZE: usize = 10;

/// Per-node cash balance cache over the profile documents.
///
/// Balances follow the update-only-if-present rule; the leaderboard is a
/// periodic full refresh from the store rather than an incrementally
/// maintained view.
pub struct CashService {
    profiles: Arc<dyn ProfileRepository>,
    logs: Arc<dyn CashLogRepository>,
    publisher: Publisher,
    balances: DashMap<PlayerId, i64>,
    leaderboard: RwLock<Vec<(PlayerId, i64)>>,
}

impl CashService {
    pub fn new(
        profiles: Arc<dyn ProfileRepository>,
        logs: Arc<dyn CashLogRepository>,
        publisher: Publisher,
    ) -> Self {
        Self {
            profiles,
            logs,
            publisher,
            balances: DashMap::new(),
            leaderboard: RwLock::new(Vec::new()),
        }
    }

    /// Loads a player's balance into the cache from the store. Called on
    /// local join, alongside the profile load.
    pub async fn load(&self, uuid: PlayerId) -> Result<i64, CoreError> {
        if let Some(balance) = self.balances.get(&uuid) {
            return Ok(*balance);
        }
        let balance = self
            .profiles
            .find_by_uuid(uuid)
            .await?
            .map(|p| p.cash)
            .unwrap_or(0);
        self.balances.insert(uuid, balance);
        Ok(balance)
    }

    /// Cached balance, if this node holds one.
    pub fn cached(&self, uuid: PlayerId) -> Option<i64> {
        self.balances.get(&uuid).map(|b| *b)
    }

    /// Drops the cache entry. Called on local quit.
    pub fn unload(&self, uuid: PlayerId) {
        self.balances.remove(&uuid);
    }

    /// Seeds a cache entry directly. Used when the balance is already known
    /// from a fresh profile load.
    pub fn prime(&self, uuid: PlayerId, balance: i64) {
        self.balances.insert(uuid, balance);
    }

    /// Applies a delta: authoritative store write, audit log entry, local
    /// cache update, then the invalidation publish carrying the new
    /// balance. Returns the new balance.
    pub async fn add(&self, uuid: PlayerId, delta: i64, reason: &str) -> Result<i64, CoreError> {
        let mut profile = self
            .profiles
            .find_by_uuid(uuid)
            .await?
            .ok_or_else(|| CoreError::Other(format!("profile {uuid} not in store")))?;

        profile.cash = profile.cash.saturating_add(delta);
        let balance = profile.cash;
        self.profiles.upsert(&profile).await?;

        self.logs
            .insert(&CashLog {
                uuid,
                delta,
                balance,
                reason: reason.to_string(),
                timestamp: current_timestamp_ms(),
            })
            .await?;

        self.apply_balance(uuid, Some(balance));
        self.publisher
            .publish(Packet::CashCacheInvalidate(CashCachePacket {
                uuid,
                balance: Some(balance),
            }))
            .await;

        info!(%uuid, delta, balance, reason, "cash balance updated");
        Ok(balance)
    }

    /// Coherency step 3: applies a peer's notice, update-only-if-present.
    /// `None` balance means drop the cache line entirely.
    pub fn apply_balance(&self, uuid: PlayerId, balance: Option<i64>) {
        match balance {
            Some(balance) => {
                let Some(mut entry) = self.balances.get_mut(&uuid) else {
                    debug!(%uuid, "cash notice for uncached player ignored");
                    return;
                };
                *entry = balance;
                debug!(%uuid, balance, "cash cache entry updated");
            }
            None => {
                if self.balances.remove(&uuid).is_some() {
                    debug!(%uuid, "cash cache entry invalidated");
                }
            }
        }
    }

    /// Rebuilds the cached leaderboard from the store. Scheduled as a
    /// periodic task.
    pub async fn refresh_leaderboard(&self) -> Result<(), CoreError> {
        let top = self.profiles.top_balances(LEADERBOARD_SIZE).await?;
        if let Ok(mut cached) = self.leaderboard.write() {
            *cached = top;
        }
        debug!("leaderboard cache refreshed");
        Ok(())
    }

    /// The cached top balances, descending. May be stale up to one refresh
    /// interval.
    pub fn leaderboard(&self) -> Vec<(PlayerId, i64)> {
        self.leaderboard
            .read()
            .map(|l| l.clone())
            .unwrap_or_default()
    }
}

/// Listener bound to the cash-cache-invalidate channel.
pub struct CashCacheListener {
    cash: Arc<CashService>,
}

impl CashCacheListener {
    pub fn new(cash: Arc<CashService>) -> Self {
        Self { cash }
    }
}

#[async_trait]
impl ChannelListener for CashCacheListener {
    async fn on_message(&self, packet: Packet) -> Result<(), BrokerError> {
        let Packet::CashCacheInvalidate(notice) = packet else {
            warn!("cash listener received foreign packet");
            return Ok(());
        };
        self.cash.apply_balance(notice.uuid, notice.balance);
        Ok(())
    }
}
