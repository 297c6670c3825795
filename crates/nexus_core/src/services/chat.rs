//! Staff chat and cross-node chat channel fanout.
//!
//! Unlike the sync services these carry no caches: every packet fans out to
//! the recipients currently connected to this node and is then forgotten.

use crate::host::HostRuntime;
use crate::services::permission::PermissionService;
use crate::services::profile::ProfileService;
use async_trait::async_trait;
use nexus_broker::{
    BrokerError, ChannelListener, ChatChannelPacket, Packet, Publisher, StaffChatPacket,
};
use nexus_types::PlayerId;
use std::sync::Arc;
use tracing::{debug, warn};

/// Permission gating staff chat delivery.
pub const STAFF_CHAT_PERMISSION: &str = "nexus.staffchat";

/// Sends and receives cross-node chat lines.
pub struct ChatService {
    publisher: Publisher,
    node_name: String,
}

impl ChatService {
    pub fn new(publisher: Publisher, node_name: impl Into<String>) -> Self {
        Self {
            publisher,
            node_name: node_name.into(),
        }
    }

    /// Publishes a staff chat line to the whole network, this node included.
    pub async fn send_staff_chat(&self, sender: PlayerId, sender_name: &str, message: &str) {
        self.publisher
            .publish(Packet::StaffChat(StaffChatPacket {
                sender_uuid: sender,
                sender_name: sender_name.to_string(),
                message: message.to_string(),
            }))
            .await;
    }

    /// Publishes a line on a named chat channel, optionally gated by a
    /// permission on the receiving side.
    pub async fn send_channel(
        &self,
        channel_id: &str,
        sender: PlayerId,
        sender_name: &str,
        message: &str,
        permission_required: Option<&str>,
    ) {
        self.publisher
            .publish(Packet::ChatChannel(ChatChannelPacket {
                channel_id: channel_id.to_string(),
                server_origin: self.node_name.clone(),
                sender_uuid: sender,
                sender_name: sender_name.to_string(),
                message: message.to_string(),
                permission_required: permission_required.map(|p| p.to_string()),
            }))
            .await;
    }
}

/// Listener bound to both chat channels; fans each line out to eligible
/// locally-connected players.
///
/// Permission checks need a profile, so only players whose profile this
/// node has cached (i.e. players actually joined here) can receive.
pub struct ChatListener {
    host: Arc<dyn HostRuntime>,
    profiles: Arc<ProfileService>,
    permissions: Arc<PermissionService>,
}

impl ChatListener {
    pub fn new(
        host: Arc<dyn HostRuntime>,
        profiles: Arc<ProfileService>,
        permissions: Arc<PermissionService>,
    ) -> Self {
        Self {
            host,
            profiles,
            permissions,
        }
    }

    async fn fan_out(&self, required: Option<&str>, line: &str) {
        let mut delivered = 0usize;
        for uuid in self.host.connected_players() {
            if let Some(required) = required {
                let Some(profile) = self.profiles.cached(uuid) else {
                    continue;
                };
                if !self.permissions.has_permission(&profile, required) {
                    continue;
                }
            }
            self.host.deliver_chat(uuid, line).await;
            delivered += 1;
        }
        debug!(delivered, "chat line fanned out");
    }
}

#[async_trait]
impl ChannelListener for ChatListener {
    async fn on_message(&self, packet: Packet) -> Result<(), BrokerError> {
        match packet {
            Packet::StaffChat(chat) => {
                let line = format!("[Staff] {}: {}", chat.sender_name, chat.message);
                self.fan_out(Some(STAFF_CHAT_PERMISSION), &line).await;
            }
            Packet::ChatChannel(chat) => {
                let line = format!(
                    "[{}] {}: {}",
                    chat.channel_id, chat.sender_name, chat.message
                );
                self.fan_out(chat.permission_required.as_deref(), &line).await;
            }
            _ => warn!("chat listener received foreign packet"),
        }
        Ok(())
    }
}
