//! Core types for the Nexus server network
//!
//! Shared identifiers and entity documents used across the synchronization
//! fabric: player and role ids, the canonical profile record, roles with
//! weighted inheritance, per-player preferences, and the server/arena
//! status snapshots carried by heartbeat packets.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub mod time;

pub use time::{current_timestamp_ms, format_duration, parse_duration, DurationParseError};

// ============================================================================
// Core Identifiers
// ============================================================================

/// Unique identifier for a player across the whole network.
///
/// Wrapper around UUID so player ids cannot be confused with other id kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Creates a new random player ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a player ID from its string representation.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Integer identifier for a role, allocated from the counters collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleId(pub i32);

impl std::fmt::Display for RoleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an arena instance hosted on some node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArenaId(pub Uuid);

impl ArenaId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ArenaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Profile
// ============================================================================

/// A role assignment on a profile, optionally expiring.
///
/// `expires_at` is a unix timestamp in milliseconds; `None` means permanent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role_id: RoleId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl RoleGrant {
    pub fn permanent(role_id: RoleId) -> Self {
        Self {
            role_id,
            expires_at: None,
        }
    }

    pub fn until(role_id: RoleId, expires_at: u64) -> Self {
        Self {
            role_id,
            expires_at: Some(expires_at),
        }
    }

    /// Whether this grant has expired as of `now_ms`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now_ms)
    }
}

/// The canonical per-player record held in the persistent store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub uuid: PlayerId,
    pub name: String,
    #[serde(default)]
    pub roles: Vec<RoleGrant>,
    /// Individually granted permissions on top of role permissions.
    #[serde(default)]
    pub extra_permissions: Vec<String>,
    #[serde(default)]
    pub cash: i64,
    /// Unix timestamp (ms) of the player's last network activity.
    #[serde(default)]
    pub last_seen: u64,
}

impl Profile {
    pub fn new(uuid: PlayerId, name: impl Into<String>) -> Self {
        Self {
            uuid,
            name: name.into(),
            roles: Vec::new(),
            extra_permissions: Vec::new(),
            cash: 0,
            last_seen: 0,
        }
    }

    pub fn role_ids(&self) -> impl Iterator<Item = RoleId> + '_ {
        self.roles.iter().map(|g| g.role_id)
    }
}

// ============================================================================
// Role
// ============================================================================

/// A named permission bundle with a seniority weight.
///
/// Permission entries may include `*` (grant everything), `-perm` (explicit
/// deny) and suffix wildcards (`foo.*` grants `foo.bar`). `inherits` lists
/// other role ids whose permissions are merged in transitively; the graph
/// may contain cycles and resolvers must guard against them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    /// Higher weight means more senior; determines the primary role.
    pub weight: i32,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub inherits: Vec<RoleId>,
}

impl Role {
    pub fn new(id: RoleId, name: impl Into<String>, weight: i32) -> Self {
        Self {
            id,
            name: name.into(),
            weight,
            permissions: Vec::new(),
            inherits: Vec::new(),
        }
    }

    pub fn with_permissions(mut self, perms: &[&str]) -> Self {
        self.permissions = perms.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_inherits(mut self, ids: &[RoleId]) -> Self {
        self.inherits = ids.to_vec();
        self
    }
}

// ============================================================================
// Preferences
// ============================================================================

/// Per-player preference flags, synchronized across nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub uuid: PlayerId,
    /// Open flag map so feature modules can add settings without schema churn.
    #[serde(default)]
    pub flags: HashMap<String, bool>,
}

impl Preferences {
    pub fn new(uuid: PlayerId) -> Self {
        Self {
            uuid,
            flags: HashMap::new(),
        }
    }

    /// Reads a flag, defaulting to `true` when unset (opt-out semantics).
    pub fn flag(&self, key: &str) -> bool {
        self.flags.get(key).copied().unwrap_or(true)
    }

    pub fn set_flag(&mut self, key: impl Into<String>, value: bool) {
        self.flags.insert(key.into(), value);
    }
}

// ============================================================================
// Server and Arena State
// ============================================================================

/// Coarse availability of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    Online,
    Starting,
    Stopping,
    Offline,
}

/// Phase of the minigame hosted by a node, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameState {
    Lobby,
    Starting,
    InGame,
    Ending,
}

/// Snapshot of one node's status, propagated on the heartbeat channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStatus {
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

impl ServerStatus {
    pub fn offline(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            status: ServerState::Offline,
            game_state: None,
            map_name: None,
            can_shutdown: true,
            players: 0,
            max_players: 0,
        }
    }
}

/// Lifecycle state of an arena instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArenaState {
    Waiting,
    Starting,
    InGame,
    Ending,
    Restarting,
}

/// Snapshot of one arena's status, propagated on the arena heartbeat channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaStatus {
    pub arena_id: ArenaId,
    pub game_type: String,
    pub node_name: String,
    pub state: ArenaState,
    pub current_players: u32,
    pub max_players: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_name: Option<String>,
}

// ============================================================================
// Audit documents
// ============================================================================

/// One cash mutation, written to the audit log on every balance change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashLog {
    pub uuid: PlayerId,
    pub delta: i64,
    pub balance: i64,
    pub reason: String,
    pub timestamp: u64,
}

/// What happened to a role grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleLogAction {
    Granted,
    Revoked,
    Expired,
}

impl std::fmt::Display for RoleLogAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RoleLogAction::Granted => "granted",
            RoleLogAction::Revoked => "revoked",
            RoleLogAction::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// One role grant change, written to the audit log alongside the profile
/// update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleLog {
    pub uuid: PlayerId,
    pub role_id: RoleId,
    pub action: RoleLogAction,
    pub timestamp: u64,
}
