// demo.rs — a small reference `GameInstance` implementation, exercising
// the trait end to end for server-crate integration tests and as the
// default instance when no game module is configured.
// Converted from: myq2-game's g_main.rs init/run_frame shape and
// `fng2.h`'s controller boundary (Tick/Snap/OnCharacterSpawn), reduced to
// the handful of fields this port's trait actually calls.

use std::collections::HashMap;

use bitflags::bitflags;

use teeserve_common::snapshot::Snapshot;

use crate::{GameInstance, UserCmd};

bitflags! {
    /// The third `usercmd` word, decoded as a button mask the way
    /// `fng2.h`'s controller reads `m_Jump`/`m_Fire`/`m_Hook` out of its own
    /// input struct — kept as a bitmask here since the wire layout is still
    /// a single packed `i32`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    struct PlayerInputFlags: i32 {
        const FIRE = 1 << 0;
        const JUMP = 1 << 1;
        const HOOK = 1 << 2;
    }
}

#[derive(Debug, Clone, Default)]
struct PlayerState {
    connected: bool,
    entered: bool,
    pos: (i32, i32),
}

/// A minimal deathmatch-shaped instance: players spawn at the origin and
/// drift by whatever their last input carried, with no collision or
/// weapons. Enough to prove the `GameInstance` seam end to end.
pub struct DemoGame {
    map_name: String,
    tick: i64,
    players: HashMap<usize, PlayerState>,
}

impl DemoGame {
    pub fn new(map_name: &str) -> Self {
        Self {
            map_name: map_name.to_string(),
            tick: 0,
            players: HashMap::new(),
        }
    }
}

impl GameInstance for DemoGame {
    fn on_init(&mut self) {
        self.tick = 0;
        self.players.clear();
    }

    fn on_tick(&mut self, inputs: &[(usize, UserCmd)]) {
        self.tick += 1;
        for (client_id, cmd) in inputs {
            let Some(player) = self.players.get_mut(client_id) else {
                continue;
            };
            if !player.entered {
                continue;
            }
            let dx = cmd.data.first().copied().unwrap_or(0);
            let dy = cmd.data.get(1).copied().unwrap_or(0);
            let buttons = PlayerInputFlags::from_bits_truncate(cmd.data.get(2).copied().unwrap_or(0));
            player.pos.0 += dx;
            player.pos.1 += dy;
            if buttons.contains(PlayerInputFlags::JUMP) {
                player.pos.1 -= 1;
            }
        }
    }

    fn on_snap(&mut self, client_id: usize) -> Snapshot {
        let mut snap = Snapshot::new();
        for (&id, player) in &self.players {
            if !player.entered {
                continue;
            }
            let _ = snap.add_item(1, id as u16, vec![player.pos.0, player.pos.1]);
        }
        let _ = client_id; // every client currently sees the same world view
        snap
    }

    fn on_message(&mut self, _client_id: usize, _msg_id: i32, _payload: &[u8]) {
        // No gameplay chat/vote commands in this reference instance.
    }

    fn on_client_connected(&mut self, client_id: usize) {
        self.players.entry(client_id).or_default().connected = true;
    }

    fn on_client_enter(&mut self, client_id: usize) {
        let player = self.players.entry(client_id).or_default();
        player.entered = true;
        player.pos = (0, 0);
    }

    fn on_client_drop(&mut self, client_id: usize, _reason: &str) {
        self.players.remove(&client_id);
    }

    fn on_client_direct_input(&mut self, _client_id: usize, _cmd: &UserCmd) {}

    fn on_client_predicted_input(&mut self, _client_id: usize, _cmd: &UserCmd) {}

    fn is_client_ready(&self, client_id: usize) -> bool {
        self.players.get(&client_id).map(|p| p.connected).unwrap_or(false)
    }

    fn is_client_player(&self, client_id: usize) -> bool {
        self.players.get(&client_id).map(|p| p.entered).unwrap_or(false)
    }

    fn net_version(&self) -> &str {
        "0.6 626fce9a778df4d4"
    }

    fn game_type(&self) -> &str {
        "DM"
    }

    fn version(&self) -> &str {
        let _ = &self.map_name;
        "1.0"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_lifecycle_drives_snapshot_contents() {
        let mut game = DemoGame::new("dm1");
        game.on_init();
        game.on_client_connected(0);
        assert!(game.is_client_ready(0));
        assert!(!game.is_client_player(0));

        game.on_client_enter(0);
        assert!(game.is_client_player(0));

        game.on_tick(&[(0, UserCmd { game_tick: 1, data: vec![5, -3] })]);
        let snap = game.on_snap(0);
        let item = snap.find(1, 0).unwrap();
        assert_eq!(item.words, vec![5, -3]);

        game.on_client_drop(0, "timeout");
        assert!(!game.is_client_ready(0));
    }

    #[test]
    fn jump_button_nudges_position_up() {
        let mut game = DemoGame::new("dm1");
        game.on_init();
        game.on_client_connected(0);
        game.on_client_enter(0);

        game.on_tick(&[(0, UserCmd { game_tick: 1, data: vec![0, 0, PlayerInputFlags::JUMP.bits()] })]);
        let snap = game.on_snap(0);
        let item = snap.find(1, 0).unwrap();
        assert_eq!(item.words, vec![0, -1]);
    }
}
