//! Packet payloads and the channel-tagged packet union.
//!
//! Every packet crosses process boundaries through the broker, so payloads
//! carry plain data only: ids, enums, numbers, strings. Unknown JSON fields
//! are ignored on receipt so newer nodes can extend payloads without
//! breaking older peers.

use crate::channel::Channel;
use crate::error::BrokerError;
use nexus_types::{ArenaId, ArenaState, GameState, PlayerId, RoleGrant, ServerState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a sync packet asks peers to do with the keyed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    /// Apply the carried fields to an already-cached entry.
    Upsert,
    /// Drop the cached entry; next read goes to the store.
    Invalidate,
}

/// Profile mutation notice. Carries the cheap already-known fields so peers
/// can apply the update without a store round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSyncPacket {
    pub action: SyncAction,
    pub uuid: PlayerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<RoleGrant>>,
}

impl ProfileSyncPacket {
    pub fn invalidate(uuid: PlayerId) -> Self {
        Self {
            action: SyncAction::Invalidate,
            uuid,
            name: None,
            cash: None,
            roles: None,
        }
    }
}

/// Cosmetics selection change for a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CosmeticsSyncPacket {
    pub action: SyncAction,
    pub uuid: PlayerId,
    #[serde(default)]
    pub equipped: HashMap<String, String>,
}

/// Preference flag change for a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferencesSyncPacket {
    pub action: SyncAction,
    pub uuid: PlayerId,
    #[serde(default)]
    pub flags: HashMap<String, bool>,
}

/// Staff chat line, fanned out to staff on every node. No caching involved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffChatPacket {
    pub sender_uuid: PlayerId,
    pub sender_name: String,
    pub message: String,
}

/// Cross-node chat channel line, delivered to subscribed recipients who hold
/// the required permission (if any).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChannelPacket {
    pub channel_id: String,
    pub server_origin: String,
    pub sender_uuid: PlayerId,
    pub sender_name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_required: Option<String>,
}

/// Cash balance notice. `balance` piggybacks the new value so peers holding
/// a cache line avoid a store read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashCachePacket {
    pub uuid: PlayerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
}

/// Periodic node status announcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStatusPacket {
    pub server: String,
    pub status: ServerState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_state: Option<GameState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_name: Option<String>,
    pub can_shutdown: bool,
    pub players: u32,
    pub max_players: u32,
}

/// Periodic arena status announcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaHeartbeatPacket {
    pub arena_id: ArenaId,
    pub game_type: String,
    pub node_name: String,
    pub state: ArenaState,
    pub current_players: u32,
    pub max_players: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_name: Option<String>,
}

/// Routes a player toward an arena on a specific node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaReservationPacket {
    pub player_uuid: PlayerId,
    pub arena_id: ArenaId,
    pub target_node: String,
    pub timestamp: u64,
}

/// The closed union of everything that travels over the broker.
///
/// The wire format is `{"channel": "<wire-name>", "payload": {...}}`;
/// dispatch at the subscriber is a single match on the tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "payload")]
pub enum Packet {
    #[serde(rename = "profiles-sync")]
    ProfilesSync(ProfileSyncPacket),
    #[serde(rename = "cosmetics-sync")]
    CosmeticsSync(CosmeticsSyncPacket),
    #[serde(rename = "preferences-sync")]
    PreferencesSync(PreferencesSyncPacket),
    #[serde(rename = "staff-chat")]
    StaffChat(StaffChatPacket),
    #[serde(rename = "chat-channel")]
    ChatChannel(ChatChannelPacket),
    #[serde(rename = "cash-cache-invalidate")]
    CashCacheInvalidate(CashCachePacket),
    #[serde(rename = "server-status-update")]
    ServerStatusUpdate(ServerStatusPacket),
    #[serde(rename = "arena-heartbeat")]
    ArenaHeartbeat(ArenaHeartbeatPacket),
    #[serde(rename = "arena-reservation")]
    ArenaReservation(ArenaReservationPacket),
}

impl Packet {
    /// The channel this packet belongs to.
    pub fn channel(&self) -> Channel {
        match self {
            Packet::ProfilesSync(_) => Channel::ProfilesSync,
            Packet::CosmeticsSync(_) => Channel::CosmeticsSync,
            Packet::PreferencesSync(_) => Channel::PreferencesSync,
            Packet::StaffChat(_) => Channel::StaffChat,
            Packet::ChatChannel(_) => Channel::ChatChannel,
            Packet::CashCacheInvalidate(_) => Channel::CashCacheInvalidate,
            Packet::ServerStatusUpdate(_) => Channel::ServerStatusUpdate,
            Packet::ArenaHeartbeat(_) => Channel::ArenaHeartbeat,
            Packet::ArenaReservation(_) => Channel::ArenaReservation,
        }
    }

    /// Serializes for the wire.
    pub fn encode(&self) -> Result<Vec<u8>, BrokerError> {
        serde_json::to_vec(self).map_err(BrokerError::Serialization)
    }

    /// Reconstructs a packet from wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, BrokerError> {
        serde_json::from_slice(bytes).map_err(BrokerError::Deserialization)
    }
}
