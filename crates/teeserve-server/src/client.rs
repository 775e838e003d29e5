// client.rs — client slot table and state machine (module H).
// Converted from: myq2-server's server.rs `ClientState`/`Server` struct
// conventions (`#[repr(i32)]` enum with a `#[default]` variant, plain data
// struct for per-slot state), re-targeted at this protocol's
// EMPTY/AUTH/CONNECTING/READY/INGAME lifecycle (spec §3, §4.H) instead of
// Quake's cs_free/cs_connected/cs_spawned.

use std::net::SocketAddr;
use std::time::Instant;

use teeserve_common::snapshot::SnapshotHistory;
use teeserve_common::wire::{AuthedLevel, MAX_INPUT_SIZE};

use teeserve_game::UserCmd;

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientState {
    #[default]
    Empty = 0,
    Auth = 1,
    Connecting = 2,
    Ready = 3,
    InGame = 4,
}

/// Per-tick snapshot cadence gate (spec glossary / §4.L `DoSnapshot`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapRate {
    #[default]
    Init,
    Recover,
    Full,
}

pub const INPUT_RING_SIZE: usize = 200;

#[derive(Debug, Clone, Default)]
pub struct InputEntry {
    pub game_tick: i32,
    pub data: [i32; MAX_INPUT_SIZE],
}

/// One client's map-download cursor state (spec §4.G).
#[derive(Debug, Clone, Default)]
pub struct MapCursor {
    pub last_ask_chunk: i32,
    pub last_sent_chunk: i32,
    pub last_ask_tick: i64,
}

/// A single client slot, one of `MAX_CLIENTS` in the fixed table the tick
/// loop exclusively owns.
pub struct ClientSlot {
    pub state: ClientState,
    pub addr: Option<SocketAddr>,
    pub name: String,
    pub clan: String,
    pub country: i32,
    pub score: i32,
    pub authed: AuthedLevel,
    pub auth_tries: u32,
    pub instance_id: u32,

    input_ring: [InputEntry; INPUT_RING_SIZE],
    input_index: usize,
    pub latest_input: InputEntry,
    pub last_input_tick: i32,

    pub last_acked_snapshot_tick: Option<i32>,
    pub snap_rate: SnapRate,
    pub latency_ms: u32,

    pub traffic_ewma: f64,
    pub traffic_epoch: Instant,

    pub preferred_team: i32,
    pub version: String,
    pub unknown_flags: u32,

    pub map_cursor: MapCursor,
    pub snapshot_history: SnapshotHistory,
}

impl Default for ClientSlot {
    fn default() -> Self {
        Self {
            state: ClientState::Empty,
            addr: None,
            name: String::new(),
            clan: String::new(),
            country: -1,
            score: 0,
            authed: AuthedLevel::No,
            auth_tries: 0,
            instance_id: 0,
            input_ring: std::array::from_fn(|_| InputEntry::default()),
            input_index: 0,
            latest_input: InputEntry::default(),
            last_input_tick: -1,
            last_acked_snapshot_tick: None,
            snap_rate: SnapRate::Init,
            latency_ms: 0,
            traffic_ewma: 0.0,
            traffic_epoch: Instant::now(),
            preferred_team: -2,
            version: String::new(),
            unknown_flags: 0,
            map_cursor: MapCursor::default(),
            snapshot_history: SnapshotHistory::new(),
        }
    }
}

impl ClientSlot {
    /// Resets the slot back to EMPTY, clearing address, name, snapshot
    /// history, and auth state.
    pub fn clear(&mut self) {
        *self = ClientSlot::default();
    }

    /// Resets the slot to CONNECTING for a fresh map transfer while
    /// preserving the client's preferred team — used for map reload and
    /// instance moves (spec §4.K, §4.L), which are not full disconnects.
    pub fn reset_for_map_change(&mut self) {
        let preferred_team = self.preferred_team;
        let addr = self.addr;
        let name = self.name.clone();
        let clan = self.clan.clone();
        let country = self.country;
        let authed = self.authed;
        let instance_id = self.instance_id;
        *self = ClientSlot::default();
        self.preferred_team = preferred_team;
        self.addr = addr;
        self.name = name;
        self.clan = clan;
        self.country = country;
        self.authed = authed;
        self.instance_id = instance_id;
        self.state = ClientState::Connecting;
    }

    pub fn push_input(&mut self, game_tick: i32, data: &[i32]) {
        let mut entry = InputEntry {
            game_tick,
            data: [0; MAX_INPUT_SIZE],
        };
        let n = data.len().min(MAX_INPUT_SIZE);
        entry.data[..n].copy_from_slice(&data[..n]);

        self.input_index = (self.input_index + 1) % INPUT_RING_SIZE;
        self.input_ring[self.input_index] = entry.clone();
        self.latest_input = entry;
        self.last_input_tick = game_tick;
    }

    pub fn input_for_tick(&self, game_tick: i32) -> Option<UserCmd> {
        self.input_ring
            .iter()
            .find(|e| e.game_tick == game_tick)
            .map(|e| UserCmd {
                game_tick: e.game_tick,
                data: e.data.to_vec(),
            })
    }
}

/// The fixed-size client table the tick loop owns.
pub struct ClientTable {
    pub slots: Vec<ClientSlot>,
}

impl ClientTable {
    pub fn new(max_clients: usize) -> Self {
        Self {
            slots: (0..max_clients).map(|_| ClientSlot::default()).collect(),
        }
    }

    pub fn find_free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|c| c.state == ClientState::Empty)
    }

    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<usize> {
        self.slots.iter().position(|c| c.addr == Some(addr))
    }

    pub fn count_in_state_at_least(&self, min: ClientState) -> usize {
        self.slots.iter().filter(|c| c.state as i32 >= min as i32).count()
    }

    /// Picks a unique advisory name by appending `"(n)"` with increasing
    /// `n` when another slot in state >= READY already holds it (spec
    /// §4.H auto-rename, §8 invariant).
    pub fn unique_name(&self, proposed: &str, exclude_slot: usize) -> String {
        let trimmed = trim_name(proposed);
        if !self.name_taken(&trimmed, exclude_slot) {
            return trimmed;
        }
        for n in 1..100 {
            let candidate = format!("({}){}", n, trimmed);
            if !self.name_taken(&candidate, exclude_slot) {
                return candidate;
            }
        }
        trimmed
    }

    fn name_taken(&self, name: &str, exclude_slot: usize) -> bool {
        self.slots.iter().enumerate().any(|(i, c)| {
            i != exclude_slot && c.state as i32 >= ClientState::Ready as i32 && c.name == name
        })
    }
}

/// Trims name bytes, treating any byte `< 0x20` as whitespace —
/// matching the original's byte-classifier trim rather than full Unicode
/// whitespace classes, per the observable-behavior note in spec §9 (the
/// port still accepts arbitrary UTF-8 names otherwise).
pub fn trim_name(name: &str) -> String {
    let bytes = name.as_bytes();
    let start = bytes.iter().position(|&b| b >= 0x20).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|&b| b >= 0x20).map(|i| i + 1).unwrap_or(start);
    String::from_utf8_lossy(&bytes[start..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_resets_to_empty() {
        let mut slot = ClientSlot::default();
        slot.state = ClientState::InGame;
        slot.name = "player".into();
        slot.clear();
        assert_eq!(slot.state, ClientState::Empty);
        assert_eq!(slot.name, "");
    }

    #[test]
    fn unique_name_appends_suffix_on_collision() {
        let mut table = ClientTable::new(4);
        table.slots[0].state = ClientState::Ready;
        table.slots[0].name = "foo".into();
        let name = table.unique_name("foo", 1);
        assert_eq!(name, "(1)foo");
    }

    #[test]
    fn unique_name_leaves_non_colliding_name_alone() {
        let table = ClientTable::new(4);
        assert_eq!(table.unique_name("bar", 0), "bar");
    }

    #[test]
    fn input_ring_records_latest_and_lookup_by_tick() {
        let mut slot = ClientSlot::default();
        slot.push_input(5, &[1, 2, 3]);
        slot.push_input(6, &[4, 5, 6]);
        assert_eq!(slot.last_input_tick, 6);
        let found = slot.input_for_tick(5).unwrap();
        assert_eq!(&found.data[..3], &[1, 2, 3]);
    }

    #[test]
    fn trim_name_strips_control_bytes() {
        assert_eq!(trim_name("\x01\x01hello\x02"), "hello");
    }

    #[test]
    fn count_in_state_at_least_counts_ready_and_above() {
        let mut table = ClientTable::new(4);
        table.slots[0].state = ClientState::Ready;
        table.slots[1].state = ClientState::InGame;
        table.slots[2].state = ClientState::Connecting;
        assert_eq!(table.count_in_state_at_least(ClientState::Ready), 2);
    }
}
