#![allow(clippy::too_many_arguments)]

pub mod ban;
pub mod cmd;
pub mod common;
pub mod crc;
pub mod cvar;
pub mod intcompress;
pub mod packer;
pub mod snap_id_pool;
pub mod snapshot;
pub mod wildcards;
pub mod wire;
