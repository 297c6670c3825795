//! Interface to the host game-server runtime.
//!
//! The core only needs two things from the host: whether a player is
//! connected to this node, and a way to hand work to the tick-synchronous
//! main context. Everything else (world, inventory, rendering) stays on the
//! host side of this seam.

use async_trait::async_trait;
use nexus_types::PlayerId;
use tracing::debug;

/// The host runtime collaborator.
///
/// `run_on_main` must marshal the closure onto the host's tick loop; async
/// work is forbidden from touching host-owned objects directly.
#[async_trait]
pub trait HostRuntime: Send + Sync {
    /// Whether the player is currently connected to this node.
    fn is_player_connected(&self, uuid: PlayerId) -> bool;

    /// Players currently connected to this node. Used by chat fanout.
    fn connected_players(&self) -> Vec<PlayerId>;

    /// Delivers a chat line to a locally-connected player.
    async fn deliver_chat(&self, uuid: PlayerId, message: &str);

    /// Schedules a closure onto the host's main (tick) context.
    fn run_on_main(&self, task: Box<dyn FnOnce() + Send>);
}

/// Host stub for headless operation and tests: nobody is connected, chat
/// goes to the log, main-context tasks run inline.
#[derive(Default)]
pub struct NullHostRuntime;

#[async_trait]
impl HostRuntime for NullHostRuntime {
    fn is_player_connected(&self, _uuid: PlayerId) -> bool {
        false
    }

    fn connected_players(&self) -> Vec<PlayerId> {
        Vec::new()
    }

    async fn deliver_chat(&self, uuid: PlayerId, message: &str) {
        debug!(%uuid, message, "chat delivery on null host");
    }

    fn run_on_main(&self, task: Box<dyn FnOnce() + Send>) {
        task();
    }
}
