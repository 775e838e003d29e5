// tick.rs — the fixed-rate simulation loop (module L).
// Converted from: myq2-server's sv_main.rs `SV_Frame` cadence (advance
// ticks, run world frame, send updates, `NET_Sleep`), re-targeted at a
// fixed 50Hz tick with per-client snapshot-rate gating instead of Quake's
// variable frame time.

use teeserve_common::wire::SERVER_TICK_SPEED;

use crate::client::{ClientState, SnapRate};

pub const RECOVER_PERIOD_TICKS: i32 = SERVER_TICK_SPEED as i32 / 1; // 1 snap per 50 ticks (see rate table below)
pub const INIT_PERIOD_TICKS: i32 = SERVER_TICK_SPEED as i32 / 10; // 1 snap per 5 ticks

/// Per-client snapshot cadence gate, called once per client per tick.
/// RECOVER sends 1/50 ticks, INIT sends 1/5 ticks, FULL sends every tick
/// (subject to the server-wide `SvHighBandwidth || tick % 2 == 0` gate
/// applied by the caller first).
pub fn should_snapshot(rate: SnapRate, tick_since_last: i32) -> bool {
    match rate {
        SnapRate::Recover => tick_since_last >= 50,
        SnapRate::Init => tick_since_last >= 5,
        SnapRate::Full => true,
    }
}

/// Whether this server tick is a snapshot tick at all, before per-client
/// rate gating (spec §4.L: `SvHighBandwidth || tick % 2 == 0`).
pub fn is_snapshot_tick(sv_high_bandwidth: bool, tick: i64) -> bool {
    sv_high_bandwidth || tick % 2 == 0
}

/// Picks the effective rate for a client about to be snapshotted: FULL is
/// downgraded to RECOVER when the client has no acknowledged snapshot yet
/// to delta against (spec §4.L: "downgrade FULL to RECOVER when no last
/// acked snapshot is found").
pub fn effective_rate(requested: SnapRate, last_acked_snapshot_tick: Option<i32>) -> SnapRate {
    if requested == SnapRate::Full && last_acked_snapshot_tick.is_none() {
        SnapRate::Recover
    } else {
        requested
    }
}

/// Whether a client in `state` should be considered for the per-tick
/// input/simulation/snapshot pipeline at all.
pub fn participates_in_tick(state: ClientState) -> bool {
    state as i32 >= ClientState::Ready as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recover_rate_gates_every_fifty_ticks() {
        assert!(!should_snapshot(SnapRate::Recover, 10));
        assert!(should_snapshot(SnapRate::Recover, 50));
        assert!(should_snapshot(SnapRate::Recover, 51));
    }

    #[test]
    fn init_rate_gates_every_five_ticks() {
        assert!(!should_snapshot(SnapRate::Init, 4));
        assert!(should_snapshot(SnapRate::Init, 5));
    }

    #[test]
    fn full_rate_always_snapshots() {
        assert!(should_snapshot(SnapRate::Full, 0));
    }

    #[test]
    fn snapshot_tick_gate_follows_high_bandwidth_or_even_ticks() {
        assert!(is_snapshot_tick(false, 0));
        assert!(!is_snapshot_tick(false, 1));
        assert!(is_snapshot_tick(true, 1));
    }

    #[test]
    fn full_rate_downgrades_to_recover_without_an_acked_snapshot() {
        assert_eq!(effective_rate(SnapRate::Full, None), SnapRate::Recover);
        assert_eq!(effective_rate(SnapRate::Full, Some(5)), SnapRate::Full);
    }

    #[test]
    fn only_ready_and_above_participate_in_the_tick() {
        assert!(!participates_in_tick(ClientState::Connecting));
        assert!(participates_in_tick(ClientState::Ready));
        assert!(participates_in_tick(ClientState::InGame));
    }
}
