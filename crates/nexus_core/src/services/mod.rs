//! Cross-node synchronization services and their channel listeners.
//!
//! Every stateful service follows the same coherency shape: authoritative
//! write to the persistent store, then a publish on the service's channel;
//! every peer's listener updates its local cache only if it already holds
//! an entry for that key. Chat services are pure fanout with no caches.

pub mod cash;
pub mod chat;
pub mod heartbeat;
pub mod permission;
pub mod preferences;
pub mod profile;

pub use cash::{CashCacheListener, CashService};
pub use chat::{ChatListener, ChatService};
pub use heartbeat::{HeartbeatService, TopologyListener, TopologyView};
pub use permission::PermissionService;
pub use preferences::{PreferencesService, PreferencesSyncListener};
pub use profile::{ProfileService, ProfileSyncListener};

/// Registry keys for the service singletons.
pub mod keys {
    pub const PROFILE_SERVICE: &str = "profile-service";
    pub const CASH_SERVICE: &str = "cash-service";
    pub const PERMISSION_SERVICE: &str = "permission-service";
    pub const PREFERENCES_SERVICE: &str = "preferences-service";
    pub const CHAT_SERVICE: &str = "chat-service";
    pub const HEARTBEAT_SERVICE: &str = "heartbeat-service";
    pub const TOPOLOGY_VIEW: &str = "topology-view";
}
