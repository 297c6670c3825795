//! Periodic server/arena status announcements and the topology view built
//! from everyone else's announcements.

use crate::error::CoreError;
use crate::store::ServerRepository;
use async_trait::async_trait;
use dashmap::DashMap;
use nexus_broker::{
    ArenaHeartbeatPacket, ArenaReservationPacket, BrokerError, ChannelListener, Packet, Publisher,
    ServerStatusPacket,
};
use nexus_types::{
    current_timestamp_ms, ArenaId, ArenaState, ArenaStatus, GameState, PlayerId, ServerState,
    ServerStatus,
};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Announces this node's status on the heartbeat channel.
///
/// The status snapshot is mutated by the host integration (player counts,
/// game state) and flushed periodically: authoritative write to the
/// `servers` collection first, then the broadcast.
pub struct HeartbeatService {
    repo: Arc<dyn ServerRepository>,
    publisher: Publisher,
    status: RwLock<ServerStatus>,
    arenas: DashMap<ArenaId, ArenaStatus>,
}

impl HeartbeatService {
    pub fn new(
        repo: Arc<dyn ServerRepository>,
        publisher: Publisher,
        node_name: &str,
        max_players: u32,
    ) -> Self {
        let mut status = ServerStatus::offline(node_name);
        status.status = ServerState::Starting;
        status.max_players = max_players;
        Self {
            repo,
            publisher,
            status: RwLock::new(status),
            arenas: DashMap::new(),
        }
    }

    /// Mutates the local snapshot; the next beat carries it.
    pub fn update_status(&self, f: impl FnOnce(&mut ServerStatus)) {
        if let Ok(mut status) = self.status.write() {
            f(&mut status);
        }
    }

    pub fn set_game_state(&self, state: GameState) {
        self.update_status(|s| s.game_state = Some(state));
    }

    pub fn set_player_count(&self, players: u32) {
        self.update_status(|s| s.players = players);
    }

    pub fn status(&self) -> ServerStatus {
        self.status
            .read()
            .map(|s| s.clone())
            .unwrap_or_else(|_| ServerStatus::offline("unknown"))
    }

    /// Registers or updates a locally-hosted arena; announced on its own
    /// channel by the next beat.
    pub fn update_arena(&self, status: ArenaStatus) {
        self.arenas.insert(status.arena_id, status);
    }

    pub fn remove_arena(&self, arena_id: ArenaId) {
        self.arenas.remove(&arena_id);
    }

    /// One heartbeat: store write, then status and arena broadcasts.
    /// Scheduled as a repeating task.
    pub async fn beat(&self) -> Result<(), CoreError> {
        let status = self.status();
        self.repo.upsert_status(&status).await?;

        self.publisher
            .publish(Packet::ServerStatusUpdate(ServerStatusPacket {
                server: status.server.clone(),
                status: status.status,
                game_state: status.game_state,
                map_name: status.map_name.clone(),
                can_shutdown: status.can_shutdown,
                players: status.players,
                max_players: status.max_players,
            }))
            .await;

        for arena in self.arenas.iter() {
            self.publisher
                .publish(Packet::ArenaHeartbeat(ArenaHeartbeatPacket {
                    arena_id: arena.arena_id,
                    game_type: arena.game_type.clone(),
                    node_name: arena.node_name.clone(),
                    state: arena.state,
                    current_players: arena.current_players,
                    max_players: arena.max_players,
                    map_name: arena.map_name.clone(),
                }))
                .await;
        }
        Ok(())
    }

    /// Final announcement before the process exits.
    pub async fn announce_shutdown(&self) {
        self.update_status(|s| {
            s.status = ServerState::Offline;
            s.players = 0;
        });
        if let Err(e) = self.beat().await {
            warn!(error = %e, "shutdown heartbeat failed");
        }
    }

    /// Publishes a reservation routing `player` to an arena on this node.
    pub async fn reserve(&self, player: PlayerId, arena_id: ArenaId, target_node: &str) {
        self.publisher
            .publish(Packet::ArenaReservation(ArenaReservationPacket {
                player_uuid: player,
                arena_id,
                target_node: target_node.to_string(),
                timestamp: current_timestamp_ms(),
            }))
            .await;
    }
}

struct SeenServer {
    status: ServerStatus,
    last_seen: u64,
}

struct SeenArena {
    status: ArenaStatus,
    last_seen: u64,
}

/// Everything this node knows about the rest of the network, built purely
/// from heartbeat packets. Entries without a beat inside the staleness
/// window are evicted by a periodic sweep.
#[derive(Default)]
pub struct TopologyView {
    servers: DashMap<String, SeenServer>,
    arenas: DashMap<ArenaId, SeenArena>,
    reservations: DashMap<PlayerId, ArenaReservationPacket>,
}

impl TopologyView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_server_status(&self, packet: ServerStatusPacket) {
        let status = ServerStatus {
            server: packet.server.clone(),
            status: packet.status,
            game_state: packet.game_state,
            map_name: packet.map_name,
            can_shutdown: packet.can_shutdown,
            players: packet.players,
            max_players: packet.max_players,
        };
        self.servers.insert(
            packet.server,
            SeenServer {
                status,
                last_seen: current_timestamp_ms(),
            },
        );
    }

    pub fn apply_arena_heartbeat(&self, packet: ArenaHeartbeatPacket) {
        let status = ArenaStatus {
            arena_id: packet.arena_id,
            game_type: packet.game_type,
            node_name: packet.node_name,
            state: packet.state,
            current_players: packet.current_players,
            max_players: packet.max_players,
            map_name: packet.map_name,
        };
        self.arenas.insert(
            packet.arena_id,
            SeenArena {
                status,
                last_seen: current_timestamp_ms(),
            },
        );
    }

    pub fn apply_reservation(&self, packet: ArenaReservationPacket) {
        debug!(player = %packet.player_uuid, arena = %packet.arena_id, "reservation recorded");
        self.reservations.insert(packet.player_uuid, packet);
    }

    pub fn server(&self, name: &str) -> Option<ServerStatus> {
        self.servers.get(name).map(|s| s.status.clone())
    }

    pub fn servers(&self) -> Vec<ServerStatus> {
        self.servers.iter().map(|s| s.status.clone()).collect()
    }

    pub fn arenas(&self) -> Vec<ArenaStatus> {
        self.arenas.iter().map(|a| a.status.clone()).collect()
    }

    /// Arenas of `game_type` still accepting players, fullest first. Backs
    /// arena selection on the proxy side.
    pub fn joinable_arenas(&self, game_type: &str) -> Vec<ArenaStatus> {
        let mut joinable: Vec<ArenaStatus> = self
            .arenas
            .iter()
            .map(|a| a.status.clone())
            .filter(|a| {
                a.game_type == game_type
                    && matches!(a.state, ArenaState::Waiting | ArenaState::Starting)
                    && a.current_players < a.max_players
            })
            .collect();
        joinable.sort_by(|a, b| b.current_players.cmp(&a.current_players));
        joinable
    }

    /// Consumes the pending reservation for `player`, if one arrived.
    pub fn take_reservation(&self, player: PlayerId) -> Option<ArenaReservationPacket> {
        self.reservations.remove(&player).map(|(_, r)| r)
    }

    /// Evicts entries with no heartbeat inside the window. Scheduled as a
    /// repeating task.
    pub fn sweep_stale(&self, window_ms: u64) {
        let now = current_timestamp_ms();
        let cutoff = now.saturating_sub(window_ms);

        let stale_servers: Vec<String> = self
            .servers
            .iter()
            .filter(|s| s.last_seen < cutoff)
            .map(|s| s.key().clone())
            .collect();
        for name in stale_servers {
            info!(server = %name, "server heartbeat stale, evicting from topology");
            self.servers.remove(&name);
        }

        let stale_arenas: Vec<ArenaId> = self
            .arenas
            .iter()
            .filter(|a| a.last_seen < cutoff)
            .map(|a| *a.key())
            .collect();
        for id in stale_arenas {
            self.arenas.remove(&id);
        }

        // Reservations are short-lived routing hints; same window applies.
        let stale_reservations: Vec<PlayerId> = self
            .reservations
            .iter()
            .filter(|r| r.timestamp < cutoff)
            .map(|r| *r.key())
            .collect();
        for player in stale_reservations {
            self.reservations.remove(&player);
        }
    }
}

/// Listener bound to the three topology channels.
pub struct TopologyListener {
    view: Arc<TopologyView>,
}

impl TopologyListener {
    pub fn new(view: Arc<TopologyView>) -> Self {
        Self { view }
    }
}

#[async_trait]
impl ChannelListener for TopologyListener {
    async fn on_message(&self, packet: Packet) -> Result<(), BrokerError> {
        match packet {
            Packet::ServerStatusUpdate(p) => self.view.apply_server_status(p),
            Packet::ArenaHeartbeat(p) => self.view.apply_arena_heartbeat(p),
            Packet::ArenaReservation(p) => self.view.apply_reservation(p),
            _ => warn!("topology listener received foreign packet"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use nexus_broker::InMemoryBroker;

    fn heartbeat() -> (Arc<MemoryStore>, HeartbeatService) {
        let store = Arc::new(MemoryStore::new());
        let publisher = Publisher::new(Arc::new(InMemoryBroker::new()));
        (
            store.clone(),
            HeartbeatService::new(store, publisher, "game-7", 100),
        )
    }

    fn arena(game_type: &str, players: u32, max: u32, state: ArenaState) -> ArenaStatus {
        ArenaStatus {
            arena_id: ArenaId::new(),
            game_type: game_type.to_string(),
            node_name: "game-7".to_string(),
            state,
            current_players: players,
            max_players: max,
            map_name: None,
        }
    }

    #[tokio::test]
    async fn beat_writes_store_first() {
        let (store, service) = heartbeat();
        service.update_status(|s| {
            s.status = ServerState::Online;
            s.players = 12;
        });

        service.beat().await.unwrap();

        let all = store.find_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].server, "game-7");
        assert_eq!(all[0].players, 12);
    }

    #[tokio::test]
    async fn shutdown_announces_offline() {
        let (store, service) = heartbeat();
        service.update_status(|s| s.status = ServerState::Online);
        service.announce_shutdown().await;

        let all = store.find_all().await.unwrap();
        assert_eq!(all[0].status, ServerState::Offline);
    }

    #[test]
    fn joinable_arenas_filters_and_sorts() {
        let view = TopologyView::new();
        for status in [
            arena("skywars", 2, 12, ArenaState::Waiting),
            arena("skywars", 8, 12, ArenaState::Waiting),
            arena("skywars", 12, 12, ArenaState::Waiting), // full
            arena("skywars", 3, 12, ArenaState::InGame),   // running
            arena("bedwars", 1, 8, ArenaState::Waiting),   // other game
        ] {
            view.apply_arena_heartbeat(ArenaHeartbeatPacket {
                arena_id: status.arena_id,
                game_type: status.game_type.clone(),
                node_name: status.node_name.clone(),
                state: status.state,
                current_players: status.current_players,
                max_players: status.max_players,
                map_name: None,
            });
        }

        let joinable = view.joinable_arenas("skywars");
        assert_eq!(joinable.len(), 2);
        assert_eq!(joinable[0].current_players, 8); // fullest first
    }

    #[test]
    fn stale_entries_are_swept() {
        let view = TopologyView::new();
        view.apply_server_status(ServerStatusPacket {
            server: "lobby-1".to_string(),
            status: ServerState::Online,
            game_state: None,
            map_name: None,
            can_shutdown: true,
            players: 0,
            max_players: 50,
        });
        assert!(view.server("lobby-1").is_some());

        // Wide window keeps it.
        view.sweep_stale(60_000);
        assert!(view.server("lobby-1").is_some());

        // Zero window evicts everything seen before "now".
        std::thread::sleep(std::time::Duration::from_millis(5));
        view.sweep_stale(0);
        assert!(view.server("lobby-1").is_none());
    }

    #[test]
    fn reservation_is_consumed_once() {
        let view = TopologyView::new();
        let player = PlayerId::new();
        view.apply_reservation(ArenaReservationPacket {
            player_uuid: player,
            arena_id: ArenaId::new(),
            target_node: "game-7".to_string(),
            timestamp: current_timestamp_ms(),
        });

        assert!(view.take_reservation(player).is_some());
        assert!(view.take_reservation(player).is_none());
    }
}
