//! The closed set of logical pub/sub topics.

use serde::{Deserialize, Serialize};

/// A logical topic on the shared broker.
///
/// The set is closed on purpose: this is not a general message bus, and
/// every channel carries exactly one packet kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    ProfilesSync,
    CosmeticsSync,
    PreferencesSync,
    StaffChat,
    ChatChannel,
    CashCacheInvalidate,
    ServerStatusUpdate,
    ArenaHeartbeat,
    ArenaReservation,
}

impl Channel {
    /// All channels, in a stable order. Used by subscribers that want to
    /// assert full coverage and by diagnostics.
    pub const ALL: [Channel; 9] = [
        Channel::ProfilesSync,
        Channel::CosmeticsSync,
        Channel::PreferencesSync,
        Channel::StaffChat,
        Channel::ChatChannel,
        Channel::CashCacheInvalidate,
        Channel::ServerStatusUpdate,
        Channel::ArenaHeartbeat,
        Channel::ArenaReservation,
    ];

    /// Stable wire name for this channel (the JSON tag on packets).
    pub fn wire_name(&self) -> &'static str {
        match self {
            Channel::ProfilesSync => "profiles-sync",
            Channel::CosmeticsSync => "cosmetics-sync",
            Channel::PreferencesSync => "preferences-sync",
            Channel::StaffChat => "staff-chat",
            Channel::ChatChannel => "chat-channel",
            Channel::CashCacheInvalidate => "cash-cache-invalidate",
            Channel::ServerStatusUpdate => "server-status-update",
            Channel::ArenaHeartbeat => "arena-heartbeat",
            Channel::ArenaReservation => "arena-reservation",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}
