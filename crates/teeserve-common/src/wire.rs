// wire.rs — wire protocol constants (module O): message ids, flags,
// tick rate, and the server-browser magic strings.
// Converted from: myq2-common's qcommon.rs (SVC_*/CLC_* const-block idiom),
// generalized to this protocol's message set (spec §6).

/// Simulation rate. Every client slot's input/snapshot cadence is expressed
/// in ticks of this length.
pub const SERVER_TICK_SPEED: i32 = 50;

pub const MAX_CLIENTS: usize = 64;
pub const VANILLA_MAX_CLIENTS: usize = 16;
pub const DDNET_MAX_CLIENTS: usize = 64;

pub const MAX_INPUT_SIZE: usize = 32;
pub const MAX_NAME_LENGTH: usize = 16;
pub const MAX_SNAPSHOT_PACKSIZE: usize = 900;
pub const MAP_CHUNK_SIZE: usize = 1024 - 128;

pub const MAX_RCONCMD_SEND: usize = 4;

/// System-message IDs (bit 0 of the first wire byte is the system/gameplay
/// flag; these values are the unshifted message id).
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetMsg {
    Info = 1,
    MapChange = 2,
    MapData = 3,
    ConReady = 4,
    Snap = 5,
    SnapEmpty = 6,
    SnapSingle = 7,
    Input = 8,
    InputTiming = 9,
    RconAuth = 10,
    RconAuthStatus = 11,
    RconLine = 12,
    RconCmd = 13,
    RconCmdAdd = 14,
    RconCmdRem = 15,
    Ping = 16,
    PingReply = 17,
    Ready = 18,
    EnterGame = 19,
    RequestMapData = 20,
}

impl NetMsg {
    pub fn from_i32(v: i32) -> Option<Self> {
        use NetMsg::*;
        Some(match v {
            1 => Info,
            2 => MapChange,
            3 => MapData,
            4 => ConReady,
            5 => Snap,
            6 => SnapEmpty,
            7 => SnapSingle,
            8 => Input,
            9 => InputTiming,
            10 => RconAuth,
            11 => RconAuthStatus,
            12 => RconLine,
            13 => RconCmd,
            14 => RconCmdAdd,
            15 => RconCmdRem,
            16 => Ping,
            17 => PingReply,
            18 => Ready,
            19 => EnterGame,
            20 => RequestMapData,
            _ => return None,
        })
    }
}

/// First-byte framing: `(msg_id << 1) | system_flag`.
pub fn pack_msg_header(msg_id: i32, system: bool) -> i32 {
    (msg_id << 1) | (system as i32)
}

/// Inverse of `pack_msg_header`; returns `(msg_id, system)`.
pub fn unpack_msg_header(header: i32) -> (i32, bool) {
    (header >> 1, (header & 1) != 0)
}

pub const SERVERBROWSE_GETINFO: &[u8] = b"\xff\xff\xff\xffgief";
pub const SERVERBROWSE_GETINFO64: &[u8] = b"\xff\xff\xff\xfffstd";
pub const SERVERBROWSE_INFO: &[u8] = b"\xff\xff\xff\xffinf5";
pub const SERVERBROWSE_INFO64: &[u8] = b"\xff\xff\xff\xffdtsf";

/// Authed access level, granted by rcon password (spec glossary).
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum AuthedLevel {
    #[default]
    No = 0,
    Mod = 1,
    Admin = 2,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        for id in 0..32 {
            for sys in [true, false] {
                let h = pack_msg_header(id, sys);
                assert_eq!(unpack_msg_header(h), (id, sys));
            }
        }
    }

    #[test]
    fn netmsg_round_trips() {
        for v in 1..=20 {
            assert_eq!(NetMsg::from_i32(v).unwrap() as i32, v);
        }
        assert!(NetMsg::from_i32(0).is_none());
        assert!(NetMsg::from_i32(21).is_none());
    }

    #[test]
    fn authed_level_orders() {
        assert!(AuthedLevel::No < AuthedLevel::Mod);
        assert!(AuthedLevel::Mod < AuthedLevel::Admin);
    }
}
