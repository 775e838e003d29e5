// browser.rs — connectionless server-browser info replies (module M):
// standard and extended ("64") probe/response pairs.
// Converted from: myq2-server's sv_main.rs `SVC_Info`/`SVC_Status`
// connectionless handlers (token echo, player-count summary), re-targeted
// at this protocol's packed-string wire format instead of Quake's
// space-delimited text reply.

use teeserve_common::packer::Packer;
use teeserve_common::wire::{
    AuthedLevel, DDNET_MAX_CLIENTS, SERVERBROWSE_GETINFO, SERVERBROWSE_GETINFO64, SERVERBROWSE_INFO,
    SERVERBROWSE_INFO64, VANILLA_MAX_CLIENTS,
};

#[derive(Debug, Clone)]
pub struct ClientBrowserInfo {
    pub name: String,
    pub clan: String,
    pub country: i32,
    pub score: i32,
    pub is_player: bool,
}

pub struct ServerInfo<'a> {
    pub name: &'a str,
    pub map_name: &'a str,
    pub game_type: &'a str,
    pub version: &'a str,
    pub password_protected: bool,
    pub max_clients: usize,
    pub clients: &'a [ClientBrowserInfo],
}

/// Dispatches on the leading magic of an inbound connectionless packet,
/// returning the reply bytes if it matched a recognized probe.
pub fn handle_probe(packet: &[u8], token: &str, info: &ServerInfo<'_>) -> Option<Vec<u8>> {
    if packet.starts_with(SERVERBROWSE_GETINFO64) {
        Some(build_info(token, info, true))
    } else if packet.starts_with(SERVERBROWSE_GETINFO) {
        Some(build_info(token, info, false))
    } else {
        None
    }
}

fn build_info(token: &str, info: &ServerInfo<'_>, extended: bool) -> Vec<u8> {
    let truncate_to = if extended { DDNET_MAX_CLIENTS } else { VANILLA_MAX_CLIENTS };
    let over_vanilla_capacity = info.max_clients > VANILLA_MAX_CLIENTS;

    const UNBOUNDED: usize = 1024;
    let mut p = Packer::new(8192);
    p.add_raw(if extended { SERVERBROWSE_INFO64 } else { SERVERBROWSE_INFO });
    p.add_string(token, UNBOUNDED);
    p.add_string(info.version, UNBOUNDED);

    let display_name = if !extended && over_vanilla_capacity {
        format!("{} 64+[{}/{}]", info.name, info.clients.len(), info.max_clients)
    } else {
        info.name.to_string()
    };
    p.add_string(&display_name, UNBOUNDED);
    p.add_string(info.map_name, UNBOUNDED);
    p.add_string(info.game_type, UNBOUNDED);
    p.add_string(if info.password_protected { "1" } else { "0" }, UNBOUNDED);

    let shown = &info.clients[..info.clients.len().min(truncate_to)];
    p.add_string(&shown.iter().filter(|c| c.is_player).count().to_string(), UNBOUNDED);
    p.add_string(&info.max_clients.min(truncate_to).to_string(), UNBOUNDED);
    p.add_string(&shown.len().to_string(), UNBOUNDED);
    p.add_string(&truncate_to.to_string(), UNBOUNDED);

    if extended {
        p.add_int(0);
    }

    for c in shown {
        p.add_string(&c.name, UNBOUNDED);
        p.add_string(&c.clan, UNBOUNDED);
        p.add_int(c.country);
        p.add_int(c.score);
        p.add_string(if c.is_player { "1" } else { "0" }, UNBOUNDED);
    }

    p.into_bytes()
}

/// Whether a client's authed level is allowed to appear in browser output
/// at all — reserved for future spectator/hidden-admin gating; currently
/// every connected client is listed regardless of authed level.
pub fn visible_in_browser(_level: AuthedLevel) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_clients() -> Vec<ClientBrowserInfo> {
        vec![
            ClientBrowserInfo { name: "alice".into(), clan: "AAA".into(), country: 1, score: 10, is_player: true },
            ClientBrowserInfo { name: "spec".into(), clan: "".into(), country: -1, score: 0, is_player: false },
        ]
    }

    #[test]
    fn standard_getinfo_is_recognized_and_replied() {
        let clients = sample_clients();
        let info = ServerInfo {
            name: "my server",
            map_name: "dm1",
            game_type: "DM",
            version: "0.6",
            password_protected: false,
            max_clients: 16,
            clients: &clients,
        };
        let mut packet = SERVERBROWSE_GETINFO.to_vec();
        packet.extend_from_slice(b"tok1");
        let reply = handle_probe(&packet, "tok1", &info).expect("should recognize standard probe");
        assert!(reply.starts_with(SERVERBROWSE_INFO));
    }

    #[test]
    fn extended_getinfo_includes_extra_int_field() {
        let clients = sample_clients();
        let info = ServerInfo {
            name: "my server",
            map_name: "dm1",
            game_type: "DM",
            version: "0.6",
            password_protected: true,
            max_clients: 64,
            clients: &clients,
        };
        let standard = build_info("tok", &info, false);
        let extended = build_info("tok", &info, true);
        assert!(extended.len() > standard.len());
    }

    #[test]
    fn unrecognized_packet_returns_none() {
        let clients = sample_clients();
        let info = ServerInfo {
            name: "srv",
            map_name: "dm1",
            game_type: "DM",
            version: "0.6",
            password_protected: false,
            max_clients: 16,
            clients: &clients,
        };
        assert!(handle_probe(b"garbage", "tok", &info).is_none());
    }

    #[test]
    fn client_list_truncates_to_vanilla_capacity_for_standard_probe() {
        let many: Vec<ClientBrowserInfo> = (0..20)
            .map(|i| ClientBrowserInfo { name: format!("p{i}"), clan: String::new(), country: -1, score: 0, is_player: true })
            .collect();
        let info = ServerInfo {
            name: "srv",
            map_name: "dm1",
            game_type: "DM",
            version: "0.6",
            password_protected: false,
            max_clients: 64,
            clients: &many,
        };
        let reply = build_info("tok", &info, false);
        // Sanity: the reply must at least contain the magic and be non-trivially sized.
        assert!(reply.starts_with(SERVERBROWSE_INFO));
        assert!(reply.len() > SERVERBROWSE_INFO.len());
    }
}
