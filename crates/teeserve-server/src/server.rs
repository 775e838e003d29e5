// server.rs — ServerContext: wires every subsystem module together and
// drives the connectionless/per-client packet dispatch that the tick loop
// calls into.
// Converted from: myq2-server's server.rs `Server` struct (single struct
// owning the client array, net channel, and cvar-driven config) and
// sv_main.rs's `SV_ConnectionlessPacket`/`SV_ReadPackets` dispatch shape,
// re-targeted at this protocol's message set instead of Quake's.

use std::net::SocketAddr;
use std::time::Instant;

use teeserve_common::ban::BanTable;
use teeserve_common::cmd::CmdContext;
use teeserve_common::common::{com_printf, com_error, ErrCode};
use teeserve_common::crc::crc_block;
use teeserve_common::cvar::CvarContext;
use teeserve_common::packer::{Packer, Unpacker, UnpackStringOpts};
use teeserve_common::snap_id_pool::SnapIdPool;
use teeserve_common::snapshot::DeltaSizeTable;
use teeserve_common::wire::{
    pack_msg_header, unpack_msg_header, AuthedLevel, NetMsg, MAX_NAME_LENGTH, MAX_SNAPSHOT_PACKSIZE,
};

use teeserve_game::{GameInstance, UserCmd};

use crate::ban as ban_admin;
use crate::browser::{self, ClientBrowserInfo, ServerInfo};
use crate::client::{ClientState, ClientTable, SnapRate};
use crate::db::DbWorker;
use crate::instances::InstanceTable;
use crate::map_transfer;
use crate::rcon::{try_auth, CurrentCaller, DribbleIterator, RconAuthOutcome, RconAuthState, RconCommandTable};
use crate::tick;
use crate::transport::traffic_limit::{TrafficMeter, OVERLOAD_BAN_SECONDS};
use crate::transport::Transport;

const RETRANSMIT_TICKS: i64 = 50; // ~1s at 50Hz, spec §4.G

/// Room for the header ints (msg id, tick, crc, etc.) on top of a
/// near-`MAX_SNAPSHOT_PACKSIZE`-sized raw payload.
const PACKET_HEADROOM: usize = 64;

/// Per-client bookkeeping the tick loop/dispatch needs but that doesn't
/// belong on the wire-facing `ClientSlot` itself.
struct ClientRuntime {
    traffic: TrafficMeter,
    rcon_auth: RconAuthState,
    dribble: Option<DribbleIterator>,
    ticks_since_last_snap: i32,
}

impl ClientRuntime {
    fn new(now: Instant) -> Self {
        Self {
            traffic: TrafficMeter::new(now),
            rcon_auth: RconAuthState::default(),
            dribble: None,
            ticks_since_last_snap: 0,
        }
    }
}

pub struct ServerContext {
    pub cvars: CvarContext,
    pub cmds: CmdContext,
    pub clients: ClientTable,
    pub transport: Transport,
    pub ban_table: BanTable,
    pub instances: InstanceTable,
    pub rcon_commands: RconCommandTable,
    pub db: Option<DbWorker>,
    pub map_bytes: Vec<u8>,
    pub map_name: String,
    pub tick: i64,
    pub snap_ids: SnapIdPool,
    pub delta_sizes: DeltaSizeTable,
    runtimes: Vec<ClientRuntime>,
    /// Per-client cache of full snapshots by tick, used to reconstruct the
    /// delta baseline for `last_acked_snapshot_tick`. `ClientSlot`'s own
    /// `snapshot_history` stores the encoded wire deltas for
    /// retransmit/debugging; this cache holds the pre-delta `Snapshot`
    /// objects the encoder actually diffs against.
    snapshot_cache: Vec<std::collections::HashMap<i32, teeserve_common::snapshot::Snapshot>>,
    shutting_down: bool,
    /// Reads a map's bytes by name, called from `run_tick`'s reload gate
    /// when `SvMap` no longer matches the loaded map. `server.rs` has no
    /// filesystem access of its own; `main.rs` wires its `read_map_file`
    /// in here the same way it wires `CmdContext::load_file`.
    pub map_loader: Option<Box<dyn Fn(&str) -> Vec<u8> + Send>>,
}

impl ServerContext {
    pub fn new(
        cvars: CvarContext,
        cmds: CmdContext,
        transport: Transport,
        default_instance: Box<dyn GameInstance>,
        map_name: &str,
        map_bytes: Vec<u8>,
    ) -> Self {
        let max_clients = cvars.variable_value("SvMaxClients").max(1.0) as usize;
        let now = Instant::now();
        let runtimes = (0..max_clients).map(|_| ClientRuntime::new(now)).collect();
        Self {
            cvars,
            cmds,
            clients: ClientTable::new(max_clients),
            transport,
            ban_table: BanTable::new(),
            instances: InstanceTable::new(default_instance, map_name),
            rcon_commands: RconCommandTable::new(),
            db: None,
            map_bytes,
            map_name: map_name.to_string(),
            tick: 0,
            snap_ids: SnapIdPool::new(),
            delta_sizes: DeltaSizeTable::new(),
            snapshot_cache: (0..max_clients).map(|_| std::collections::HashMap::new()).collect(),
            runtimes,
            shutting_down: false,
            map_loader: None,
        }
    }

    fn now_ms(&self) -> i64 {
        self.tick * 1000 / i64::from(teeserve_common::wire::SERVER_TICK_SPEED)
    }

    /// Entry point for every inbound datagram (spec §4.F/§6). Dispatches
    /// connectionless server-browser probes before falling through to the
    /// per-client protocol.
    pub fn handle_packet(&mut self, data: &[u8], from: SocketAddr) {
        if self.ban_table.is_banned(from.ip(), self.now_ms()) {
            return;
        }

        if let Some(reply) = self.try_handle_browse_probe(data) {
            let _ = self.transport.send_to(&reply, from);
            return;
        }

        let slot = match self.clients.find_by_addr(from) {
            Some(idx) => idx,
            None => match self.accept_new_connection(from) {
                Some(idx) => idx,
                None => return, // server full or faulty packet, silently dropped
            },
        };

        let len = data.len();
        let overloaded = self.runtimes[slot].traffic.record(
            Instant::now(),
            len as u64,
            self.cvars.variable_value("SvNetlimitAlpha") as f64,
            self.cvars.variable_value("SvNetlimit") as f64 * 1024.0,
        );
        if overloaded {
            let _ = ban_admin::ban_addr(
                &mut self.ban_table,
                &self.clients,
                from.ip(),
                Some(OVERLOAD_BAN_SECONDS),
                "exceeded the traffic limit",
                self.now_ms(),
                None,
                AuthedLevel::Admin,
                true,
            );
            self.clients.slots[slot].clear();
            return;
        }

        self.dispatch_client_message(slot, data);
    }

    fn try_handle_browse_probe(&self, data: &[u8]) -> Option<Vec<u8>> {
        let clients: Vec<ClientBrowserInfo> = self
            .clients
            .slots
            .iter()
            .filter(|c| c.state as i32 >= ClientState::Ready as i32)
            .map(|c| ClientBrowserInfo {
                name: c.name.clone(),
                clan: c.clan.clone(),
                country: c.country,
                score: c.score,
                is_player: c.state == ClientState::InGame,
            })
            .collect();

        let info = ServerInfo {
            name: self.cvars.variable_string("SvName"),
            map_name: &self.map_name,
            game_type: self.instances.get(0).map(|r| r.instance.game_type()).unwrap_or("DM"),
            version: self.instances.get(0).map(|r| r.instance.net_version()).unwrap_or(""),
            password_protected: !self.cvars.variable_string("Password").is_empty(),
            max_clients: self.clients.slots.len(),
            clients: &clients,
        };
        // The probe's own token is the single byte right after the 8-byte
        // magic prefix (both GETINFO and GETINFO64 are 8 bytes); echoed
        // back in the reply as its decimal string form (spec §4.M).
        let token = data.get(8).map(|b| b.to_string()).unwrap_or_default();
        browser::handle_probe(data, &token, &info)
    }

    /// Places a never-before-seen address into a free slot in AUTH,
    /// rejecting outright when the table is full or the per-IP cap is hit
    /// (spec §4.H).
    fn accept_new_connection(&mut self, from: SocketAddr) -> Option<usize> {
        let per_ip_cap = self.cvars.variable_value("SvMaxClientsPerIP").max(1.0) as usize;
        let existing_from_ip = self
            .clients
            .slots
            .iter()
            .filter(|c| c.addr.map(|a| a.ip()) == Some(from.ip()))
            .count();
        if existing_from_ip >= per_ip_cap {
            return None;
        }

        let idx = self.clients.find_free_slot()?;
        self.clients.slots[idx].clear();
        self.clients.slots[idx].addr = Some(from);
        self.clients.slots[idx].state = ClientState::Auth;
        self.runtimes[idx] = ClientRuntime::new(Instant::now());
        Some(idx)
    }

    fn dispatch_client_message(&mut self, slot: usize, data: &[u8]) {
        let mut u = Unpacker::new(data);
        let header = u.get_int();
        let (msg_id, _system) = unpack_msg_header(header);
        let Some(msg) = NetMsg::from_i32(msg_id) else {
            return; // unknown message id, ignored rather than dropped (§7 Protocol)
        };

        match msg {
            NetMsg::Info => self.on_info(slot, &mut u),
            NetMsg::RequestMapData => self.on_request_map_data(slot, &mut u),
            NetMsg::Ready => self.on_ready(slot),
            NetMsg::EnterGame => self.on_enter_game(slot),
            NetMsg::Input => self.on_input(slot, &mut u),
            NetMsg::RconAuth => self.on_rcon_auth(slot, &mut u),
            NetMsg::RconCmd => self.on_rcon_cmd(slot, &mut u),
            NetMsg::Ping => self.on_ping(slot),
            _ => {} // the remaining ids are server-to-client only
        }
    }

    fn on_info(&mut self, slot: usize, u: &mut Unpacker<'_>) {
        let version = u.get_string(UnpackStringOpts::default());
        let password = u.get_string(UnpackStringOpts::default());
        if u.error() {
            return;
        }

        let expected_version = self.instances.get(0).map(|r| r.instance.net_version()).unwrap_or("").to_string();
        if version != expected_version {
            com_error(
                ErrCode::ErrDrop,
                &format!("Wrong version. Server is running '{}' and client '{}'", expected_version, version),
            );
            self.clients.slots[slot].clear();
            return;
        }

        let expected = self.cvars.variable_string("Password");
        if !expected.is_empty() && password != expected {
            com_error(ErrCode::ErrDrop, "client supplied wrong server password");
            self.clients.slots[slot].clear();
            return;
        }

        self.clients.slots[slot].version = version;
        self.clients.slots[slot].state = ClientState::Connecting;
        self.send_map_change(slot);
    }

    fn send_map_change(&mut self, slot: usize) {
        let Some(addr) = self.clients.slots[slot].addr else { return };
        let mut p = Packer::new(MAX_SNAPSHOT_PACKSIZE);
        p.add_int(pack_msg_header(NetMsg::MapChange as i32, true));
        p.add_string(&self.map_name, 64);
        p.add_int(crc_block(&self.map_bytes) as i32);
        p.add_int(self.map_bytes.len() as i32);
        let _ = self.transport.send_to(&p.into_bytes(), addr);
    }

    fn on_request_map_data(&mut self, slot: usize, u: &mut Unpacker<'_>) {
        let chunk_index = u.get_int();
        if u.error() {
            return;
        }
        let Some(addr) = self.clients.slots[slot].addr else { return };
        let crc = crc_block(&self.map_bytes) as i32;
        let cursor = &mut self.clients.slots[slot].map_cursor;
        if let Some(chunk) = map_transfer::handle_request(cursor, &self.map_bytes, chunk_index, self.tick) {
            let mut p = Packer::new(MAX_SNAPSHOT_PACKSIZE + PACKET_HEADROOM);
            p.add_int(pack_msg_header(NetMsg::MapData as i32, true));
            p.add_int(chunk.is_last as i32);
            p.add_int(crc);
            p.add_int(chunk.chunk_index);
            p.add_int(chunk.bytes.len() as i32);
            p.add_raw(chunk.bytes);
            let _ = self.transport.send_to(&p.into_bytes(), addr);
        }
    }

    /// Pushes map chunks proactively when `SvHighBandwidth` is set,
    /// called once per client per tick alongside the pull-mode handler
    /// above (spec §4.G).
    fn push_map_chunks_if_high_bandwidth(&mut self, slot: usize) {
        if self.cvars.variable_value("SvHighBandwidth") == 0.0 {
            return;
        }
        if self.clients.slots[slot].state != ClientState::Connecting {
            return;
        }
        let Some(addr) = self.clients.slots[slot].addr else { return };
        let window = self.cvars.variable_value("SvMapWindow").max(1.0) as i32;
        let crc = crc_block(&self.map_bytes) as i32;
        let cursor = &mut self.clients.slots[slot].map_cursor;
        let chunks = map_transfer::push_chunks(cursor, &self.map_bytes, window, self.tick, RETRANSMIT_TICKS);
        for chunk in chunks {
            let mut p = Packer::new(MAX_SNAPSHOT_PACKSIZE + PACKET_HEADROOM);
            p.add_int(pack_msg_header(NetMsg::MapData as i32, true));
            p.add_int(chunk.is_last as i32);
            p.add_int(crc);
            p.add_int(chunk.chunk_index);
            p.add_int(chunk.bytes.len() as i32);
            p.add_raw(chunk.bytes);
            let _ = self.transport.send_to(&p.into_bytes(), addr);
        }
    }

    fn on_ready(&mut self, slot: usize) {
        if self.clients.slots[slot].state != ClientState::Connecting {
            return;
        }
        self.clients.slots[slot].state = ClientState::Ready;
        let instance_id = self.clients.slots[slot].instance_id;
        if let Some(rec) = self.instances.get_mut(instance_id) {
            rec.instance.on_client_connected(slot);
        }

        if let Some(addr) = self.clients.slots[slot].addr {
            let mut p = Packer::new(16);
            p.add_int(pack_msg_header(NetMsg::ConReady as i32, true));
            let _ = self.transport.send_to(&p.into_bytes(), addr);
        }
    }

    fn on_enter_game(&mut self, slot: usize) {
        if self.clients.slots[slot].state != ClientState::Ready {
            return;
        }
        let proposed = self.clients.slots[slot].name.clone();
        let unique = self.clients.unique_name(&crate::client::trim_name(&proposed), slot);
        self.clients.slots[slot].name = unique;
        self.clients.slots[slot].state = ClientState::InGame;

        let instance_id = self.clients.slots[slot].instance_id;
        if let Some(rec) = self.instances.get_mut(instance_id) {
            rec.instance.on_client_enter(slot);
        }
    }

    fn on_input(&mut self, slot: usize, u: &mut Unpacker<'_>) {
        if self.clients.slots[slot].state != ClientState::InGame {
            return;
        }
        let game_tick = u.get_int();
        let mut data = Vec::new();
        for _ in 0..teeserve_common::wire::MAX_INPUT_SIZE {
            let v = u.get_int();
            if u.error() {
                break;
            }
            data.push(v);
        }
        if data.is_empty() {
            return;
        }
        self.clients.slots[slot].push_input(game_tick, &data);

        let instance_id = self.clients.slots[slot].instance_id;
        let cmd = UserCmd { game_tick, data };
        if let Some(rec) = self.instances.get_mut(instance_id) {
            rec.instance.on_client_direct_input(slot, &cmd);
        }

        if let Some(addr) = self.clients.slots[slot].addr {
            let mut p = Packer::new(16);
            p.add_int(pack_msg_header(NetMsg::InputTiming as i32, true));
            let _ = self.transport.send_to(&p.into_bytes(), addr);
        }
    }

    fn on_rcon_auth(&mut self, slot: usize, u: &mut Unpacker<'_>) {
        let attempt = u.get_string(UnpackStringOpts::default());
        if u.error() {
            return;
        }
        let max_tries = self.cvars.variable_value("SvRconMaxTries").max(1.0) as u32;
        let admin_pw = self.cvars.variable_string("SvRconPassword").to_string();
        let mod_pw = self.cvars.variable_string("SvRconModPassword").to_string();

        let outcome = try_auth(&mut self.runtimes[slot].rcon_auth, &attempt, &admin_pw, &mod_pw, max_tries);
        let Some(addr) = self.clients.slots[slot].addr else { return };

        match outcome {
            RconAuthOutcome::Granted(level) => {
                self.clients.slots[slot].authed = level;
                self.runtimes[slot].dribble = Some(DribbleIterator::new(&self.rcon_commands, level));
                let mut p = Packer::new(64);
                p.add_int(pack_msg_header(NetMsg::RconAuthStatus as i32, true));
                p.add_int(1);
                p.add_int(1);
                let _ = self.transport.send_to(&p.into_bytes(), addr);
            }
            RconAuthOutcome::Denied { attempt } => {
                let mut p = Packer::new(64);
                p.add_int(pack_msg_header(NetMsg::RconAuthStatus as i32, true));
                p.add_int(0);
                p.add_int(0);
                let _ = self.transport.send_to(&p.into_bytes(), addr);

                let mut line = Packer::new(320);
                line.add_int(pack_msg_header(NetMsg::RconLine as i32, true));
                line.add_string(&format!("Wrong password {attempt}/{max_tries}."), 256);
                let _ = self.transport.send_to(&line.into_bytes(), addr);
            }
            RconAuthOutcome::TooManyTries => {
                let ban_seconds = (self.cvars.variable_value("SvRconBantime") * 60.0) as i64;
                let _ = ban_admin::ban_addr(
                    &mut self.ban_table,
                    &self.clients,
                    addr.ip(),
                    if ban_seconds > 0 { Some(ban_seconds) } else { None },
                    "too many rcon auth attempts",
                    self.now_ms(),
                    None,
                    AuthedLevel::Admin,
                    true,
                );
                self.clients.slots[slot].clear();
            }
        }
    }

    fn on_rcon_cmd(&mut self, slot: usize, u: &mut Unpacker<'_>) {
        let line = u.get_string(UnpackStringOpts::default());
        if u.error() {
            return;
        }
        let level = self.clients.slots[slot].authed;
        if level == AuthedLevel::No {
            return;
        }

        com_printf(&format!("Rcon({}): {}\n", slot, line));
        let caller = CurrentCaller { client_id: Some(slot), level };
        let _ = caller; // the caller context would gate console-command access were IConsole in scope (§1 Non-goals)
        self.cmds.cbuf_add_text(&format!("{}\n", line));
        self.cmds.cbuf_execute();
    }

    fn on_ping(&mut self, slot: usize) {
        let Some(addr) = self.clients.slots[slot].addr else { return };
        let mut p = Packer::new(16);
        p.add_int(pack_msg_header(NetMsg::PingReply as i32, true));
        let _ = self.transport.send_to(&p.into_bytes(), addr);
    }

    /// Dribbles up to `MAX_RCONCMD_SEND` queued command names to one
    /// round-robin rcon-authed client per tick (spec §4.I).
    fn dribble_rcon_commands(&mut self) {
        let candidate = (self.tick as usize) % self.clients.slots.len().max(1);
        if self.clients.slots[candidate].authed == AuthedLevel::No {
            return;
        }
        let Some(addr) = self.clients.slots[candidate].addr else { return };
        if self.runtimes[candidate].dribble.is_none() {
            self.runtimes[candidate].dribble =
                Some(DribbleIterator::new(&self.rcon_commands, self.clients.slots[candidate].authed));
        }
        let Some(it) = self.runtimes[candidate].dribble.as_mut() else { return };
        if it.is_done() {
            return;
        }
        for name in it.next_batch() {
            let mut p = Packer::new(256);
            p.add_int(pack_msg_header(NetMsg::RconCmdAdd as i32, true));
            p.add_string(&name, MAX_NAME_LENGTH * 4);
            let _ = self.transport.send_to(&p.into_bytes(), addr);
        }
    }

    /// If `SvMap` no longer names the loaded map, reloads it, restarts the
    /// default instance, and pushes every client past AUTH back through a
    /// fresh map transfer without a full disconnect (spec §4.L step 1).
    fn reload_map_if_changed(&mut self) {
        let wanted = self.cvars.variable_string("SvMap").to_string();
        if wanted.is_empty() || wanted == self.map_name {
            return;
        }
        let Some(loader) = self.map_loader.as_ref() else { return };
        self.map_bytes = loader(&wanted);
        self.map_name = wanted;

        if let Some(rec) = self.instances.get_mut(0) {
            rec.instance.on_init();
        }
        self.snap_ids.timeout_all();

        for slot in 0..self.clients.slots.len() {
            if (self.clients.slots[slot].state as i32) > (ClientState::Auth as i32) {
                self.clients.slots[slot].reset_for_map_change();
                self.send_map_change(slot);
            }
        }
    }

    /// One 50Hz tick: advance simulation, snapshot, dribble, and prune
    /// expired bans (spec §4.L `CServer::Run`).
    pub fn run_tick(&mut self) {
        self.tick += 1;
        self.reload_map_if_changed();
        ban_admin::update(&mut self.ban_table, self.now_ms());

        let snapshot_tick = tick::is_snapshot_tick(self.cvars.variable_value("SvHighBandwidth") != 0.0, self.tick);

        for slot in 0..self.clients.slots.len() {
            if !tick::participates_in_tick(self.clients.slots[slot].state) {
                continue;
            }
            self.push_map_chunks_if_high_bandwidth(slot);

            let instance_id = self.clients.slots[slot].instance_id;
            if let Some(input) = self.clients.slots[slot].input_for_tick(self.tick as i32) {
                if let Some(rec) = self.instances.get_mut(instance_id) {
                    rec.instance.on_client_predicted_input(slot, &input);
                }
            }
        }

        for id in self.instances.ids().collect::<Vec<_>>() {
            let client_ids: Vec<usize> = self
                .clients
                .slots
                .iter()
                .enumerate()
                .filter(|(_, c)| c.instance_id == id && tick::participates_in_tick(c.state))
                .map(|(i, _)| i)
                .collect();
            let inputs: Vec<(usize, UserCmd)> = client_ids
                .iter()
                .filter_map(|&i| self.clients.slots[i].input_for_tick(self.tick as i32).map(|cmd| (i, cmd)))
                .collect();
            if let Some(rec) = self.instances.get_mut(id) {
                rec.instance.on_tick(&inputs);
            }
        }

        if snapshot_tick {
            self.do_snapshots();
        }

        self.dribble_rcon_commands();
    }

    fn do_snapshots(&mut self) {
        for slot in 0..self.clients.slots.len() {
            if self.clients.slots[slot].state != ClientState::InGame {
                continue;
            }
            let rate = tick::effective_rate(
                self.clients.slots[slot].snap_rate,
                self.clients.slots[slot].last_acked_snapshot_tick,
            );
            self.runtimes[slot].ticks_since_last_snap += 1;
            if !tick::should_snapshot(rate, self.runtimes[slot].ticks_since_last_snap) {
                continue;
            }
            self.runtimes[slot].ticks_since_last_snap = 0;
            if rate == SnapRate::Recover {
                self.clients.slots[slot].snap_rate = SnapRate::Recover;
            }

            let instance_id = self.clients.slots[slot].instance_id;
            let Some(rec) = self.instances.get_mut(instance_id) else { continue };
            let snap = rec.instance.on_snap(slot);

            let baseline_tick = self.clients.slots[slot].last_acked_snapshot_tick;
            let baseline = baseline_tick
                .and_then(|t| self.snapshot_cache[slot].get(&t))
                .cloned()
                .unwrap_or_default();
            let delta_tick_distance = baseline_tick.map(|t| self.tick as i32 - t).unwrap_or(0);

            let delta = teeserve_common::snapshot::create_delta(&baseline, &snap, &self.delta_sizes);

            if let Some(addr) = self.clients.slots[slot].addr {
                if delta.is_empty() {
                    let mut p = Packer::new(MAX_SNAPSHOT_PACKSIZE);
                    p.add_int(pack_msg_header(NetMsg::SnapEmpty as i32, true));
                    p.add_int(self.tick as i32);
                    p.add_int(delta_tick_distance);
                    let _ = self.transport.send_to(&p.into_bytes(), addr);
                } else {
                    let encoded = teeserve_common::intcompress::compress(&delta);
                    let crc = crc_block(&encoded) as i32;
                    if encoded.len() <= MAX_SNAPSHOT_PACKSIZE {
                        let mut p = Packer::new(MAX_SNAPSHOT_PACKSIZE + PACKET_HEADROOM);
                        p.add_int(pack_msg_header(NetMsg::SnapSingle as i32, true));
                        p.add_int(self.tick as i32);
                        p.add_int(delta_tick_distance);
                        p.add_int(crc);
                        p.add_int(encoded.len() as i32);
                        p.add_raw(&encoded);
                        let _ = self.transport.send_to(&p.into_bytes(), addr);
                    } else {
                        let chunks: Vec<&[u8]> = encoded.chunks(MAX_SNAPSHOT_PACKSIZE).collect();
                        let num_packets = chunks.len() as i32;
                        for (index, chunk) in chunks.iter().enumerate() {
                            let mut p = Packer::new(MAX_SNAPSHOT_PACKSIZE + PACKET_HEADROOM);
                            p.add_int(pack_msg_header(NetMsg::Snap as i32, true));
                            p.add_int(self.tick as i32);
                            p.add_int(delta_tick_distance);
                            p.add_int(num_packets);
                            p.add_int(index as i32);
                            p.add_int(crc);
                            p.add_int(chunk.len() as i32);
                            p.add_raw(chunk);
                            let _ = self.transport.send_to(&p.into_bytes(), addr);
                        }
                    }
                }
            }

            self.clients
                .slots[slot]
                .snapshot_history
                .add(self.tick as i32, self.tick, delta);
            self.clients.slots[slot].snapshot_history.evict_stale(self.tick as i32);
            let cutoff = self.tick as i32 - 3 * teeserve_common::wire::SERVER_TICK_SPEED;
            self.snapshot_cache[slot].insert(self.tick as i32, snap);
            self.snapshot_cache[slot].retain(|&t, _| t >= cutoff);
        }
    }

    /// Drops every connected client with `reason` ahead of process exit
    /// (spec §4.L shutdown sequence: drop clients before tearing down the
    /// simulation).
    pub fn shutdown(&mut self, reason: &str) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        for slot in 0..self.clients.slots.len() {
            if self.clients.slots[slot].state == ClientState::Empty {
                continue;
            }
            let instance_id = self.clients.slots[slot].instance_id;
            if let Some(rec) = self.instances.get_mut(instance_id) {
                rec.instance.on_client_drop(slot, reason);
            }
            self.clients.slots[slot].clear();
        }
        if let Some(db) = self.db.take() {
            db.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teeserve_game::demo::DemoGame;

    fn make_server() -> ServerContext {
        let mut cvars = CvarContext::new();
        cvars.register_defaults();
        cvars.force_set("SvMaxClients", "4"); // SvMaxClients is CVAR_LATCH; force_set applies immediately for test setup
        let cmds = CmdContext::new();
        let transport = Transport::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        ServerContext::new(cvars, cmds, transport, Box::new(DemoGame::new("dm1")), "dm1", vec![1, 2, 3, 4])
    }

    #[test]
    fn new_connection_goes_to_auth_state() {
        let mut server = make_server();
        let from: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let idx = server.accept_new_connection(from).unwrap();
        assert_eq!(server.clients.slots[idx].state, ClientState::Auth);
    }

    #[test]
    fn per_ip_cap_rejects_beyond_limit() {
        let mut server = make_server();
        server.cvars.set("SvMaxClientsPerIP", "1");
        let ip = "10.0.0.5".to_string();
        let first: SocketAddr = format!("{ip}:1").parse().unwrap();
        let second: SocketAddr = format!("{ip}:2").parse().unwrap();
        let a = server.accept_new_connection(first);
        assert!(a.is_some());
        server.clients.slots[a.unwrap()].addr = Some(first);
        let b = server.accept_new_connection(second);
        assert!(b.is_none());
    }

    #[test]
    fn shutdown_clears_every_connected_slot() {
        let mut server = make_server();
        let from: SocketAddr = "127.0.0.1:40001".parse().unwrap();
        let idx = server.accept_new_connection(from).unwrap();
        server.clients.slots[idx].state = ClientState::InGame;
        server.shutdown("server shutdown");
        assert_eq!(server.clients.slots[idx].state, ClientState::Empty);
    }

    #[test]
    fn tick_advances_and_snapshots_ingame_clients() {
        let mut server = make_server();
        let from: SocketAddr = "127.0.0.1:40002".parse().unwrap();
        let idx = server.accept_new_connection(from).unwrap();
        server.clients.slots[idx].state = ClientState::InGame;
        server.run_tick();
        assert_eq!(server.tick, 1);
    }
}
