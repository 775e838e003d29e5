#![allow(clippy::too_many_arguments)]

//! The simulation boundary named in spec §1: a trait specifying exactly the
//! callbacks the network engine drives, rather than a deep inheritance
//! hierarchy. Converted from: myq2-server's `GameExport`/`GameImport`
//! struct-of-function-pointers (`sv_game.rs`), generalized into an
//! idiomatic Rust trait per the "interface, not inheritance hierarchy"
//! design note — the FFI `.dll`/`.so` loading the teacher used to bind a
//! `GameExport` has no counterpart here; an instance is just a boxed trait
//! object the router owns directly.

pub mod demo;

use teeserve_common::snapshot::Snapshot;

/// A single buffered input command from a client (spec §3's `usercmd`
/// shape): the tick it was generated for and its raw payload words.
#[derive(Debug, Clone, Default)]
pub struct UserCmd {
    pub game_tick: i32,
    pub data: Vec<i32>,
}

/// Readiness/class queries the router needs answered without reaching into
/// instance-private state.
pub trait GameInstance: Send {
    /// Called once right after the instance (and its map) is loaded.
    fn on_init(&mut self);

    /// Advance the simulation by one tick. `inputs` holds the most recent
    /// buffered command for every INGAME client routed to this instance,
    /// keyed by client id.
    fn on_tick(&mut self, inputs: &[(usize, UserCmd)]);

    /// Build the authoritative snapshot a given client should see this
    /// tick (visibility filtering, interest management, etc. live here).
    fn on_snap(&mut self, client_id: usize) -> Snapshot;

    /// A gameplay (non-system) message arrived from a client.
    fn on_message(&mut self, client_id: usize, msg_id: i32, payload: &[u8]);

    fn on_client_connected(&mut self, client_id: usize);
    fn on_client_enter(&mut self, client_id: usize);
    fn on_client_drop(&mut self, client_id: usize, reason: &str);
    fn on_client_direct_input(&mut self, client_id: usize, cmd: &UserCmd);
    fn on_client_predicted_input(&mut self, client_id: usize, cmd: &UserCmd);

    /// Whether the client may transition READY -> INGAME (spec §4.H).
    fn is_client_ready(&self, client_id: usize) -> bool;
    /// Whether the client occupies a "player" slot vs. spectator, used by
    /// the server-browser player/client count split (spec §4.M).
    fn is_client_player(&self, client_id: usize) -> bool;

    /// The protocol/content version string exchanged in `NETMSG_INFO`.
    fn net_version(&self) -> &str;
    fn game_type(&self) -> &str;
    fn version(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::DemoGame;

    #[test]
    fn demo_game_implements_trait_object_safely() {
        let mut game: Box<dyn GameInstance> = Box::new(DemoGame::new("dm1"));
        game.on_init();
        game.on_client_connected(0);
        assert!(!game.is_client_ready(0));
    }
}
