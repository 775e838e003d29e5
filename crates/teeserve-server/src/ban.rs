// ban.rs — ban admin logic (module J): self-protection checks and the
// connected-client scan/drop side effect layered on top of
// teeserve_common::ban's address/range table.
// Converted from: myq2-common's cvar.rs access-checked mutation idiom
// (validate, then mutate, returning a descriptive error), applied to
// `BanAddr`/`BanRange` instead of cvar writes.

use std::net::IpAddr;

use teeserve_common::ban::{validate_range, BanTable, BanTarget};
use teeserve_common::wire::AuthedLevel;

use crate::client::ClientTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanError {
    /// Refuses to let a caller ban their own connection.
    SelfBan,
    /// Refuses to ban a connected, equal-or-higher-authed client unless
    /// `force` is set (spec §4.J self-protection).
    ProtectedTarget,
    InvalidRange,
}

/// Bans a single address, scanning the client table for matching
/// connected clients to drop. `caller_addr` and `caller_level` implement
/// the self-protection check; pass `force = true` to bypass it.
pub fn ban_addr(
    table: &mut BanTable,
    clients: &ClientTable,
    addr: IpAddr,
    seconds: Option<i64>,
    reason: &str,
    now: i64,
    caller_addr: Option<IpAddr>,
    caller_level: AuthedLevel,
    force: bool,
) -> Result<Vec<usize>, BanError> {
    if !force && caller_addr == Some(addr) {
        return Err(BanError::SelfBan);
    }

    if !force {
        for slot in &clients.slots {
            if slot.addr.map(|a| a.ip()) == Some(addr) && slot.authed >= caller_level {
                return Err(BanError::ProtectedTarget);
            }
        }
    }

    let expiry = seconds.map(|s| now + s);
    table.add(BanTarget::Addr(addr), expiry, reason.to_string());

    let dropped = clients
        .slots
        .iter()
        .enumerate()
        .filter(|(_, slot)| slot.addr.map(|a| a.ip()) == Some(addr))
        .map(|(i, _)| i)
        .collect();
    Ok(dropped)
}

/// Bans a CIDR range after validating it is non-degenerate.
pub fn ban_range(
    table: &mut BanTable,
    clients: &ClientTable,
    range_addr: IpAddr,
    prefix_len: u8,
    seconds: Option<i64>,
    reason: &str,
    now: i64,
) -> Result<Vec<usize>, BanError> {
    if !validate_range(&range_addr, prefix_len) {
        return Err(BanError::InvalidRange);
    }
    let expiry = seconds.map(|s| now + s);
    table.add(BanTarget::Range { addr: range_addr, prefix_len }, expiry, reason.to_string());

    let dropped = clients
        .slots
        .iter()
        .enumerate()
        .filter(|(_, slot)| {
            slot.addr
                .map(|a| table.is_banned(a.ip(), now))
                .unwrap_or(false)
        })
        .map(|(i, _)| i)
        .collect();
    Ok(dropped)
}

/// Drops every expired entry; called once per tick.
pub fn update(table: &mut BanTable, now: i64) {
    table.prune_expired(now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn refuses_self_ban() {
        let mut table = BanTable::new();
        let clients = ClientTable::new(4);
        let addr = v4(1, 1, 1, 1);
        let result = ban_addr(&mut table, &clients, addr, None, "test", 0, Some(addr), AuthedLevel::Admin, false);
        assert_eq!(result, Err(BanError::SelfBan));
    }

    #[test]
    fn refuses_banning_equal_authed_connected_client_without_force() {
        let mut table = BanTable::new();
        let mut clients = ClientTable::new(4);
        let addr = v4(2, 2, 2, 2);
        clients.slots[0].addr = Some((addr, 1000).into());
        clients.slots[0].authed = AuthedLevel::Admin;

        let result = ban_addr(&mut table, &clients, addr, None, "test", 0, None, AuthedLevel::Admin, false);
        assert_eq!(result, Err(BanError::ProtectedTarget));

        let forced = ban_addr(&mut table, &clients, addr, None, "test", 0, None, AuthedLevel::Admin, true);
        assert!(forced.is_ok());
    }

    #[test]
    fn ban_range_rejects_degenerate_range() {
        let mut table = BanTable::new();
        let clients = ClientTable::new(4);
        let result = ban_range(&mut table, &clients, v4(10, 0, 0, 0), 32, None, "test", 0);
        assert_eq!(result, Err(BanError::InvalidRange));
    }

    #[test]
    fn ban_addr_reports_connected_victims_to_drop() {
        let mut table = BanTable::new();
        let mut clients = ClientTable::new(4);
        let addr = v4(3, 3, 3, 3);
        clients.slots[2].addr = Some((addr, 1000).into());
        let dropped = ban_addr(&mut table, &clients, addr, Some(60), "flood", 0, None, AuthedLevel::Admin, false).unwrap();
        assert_eq!(dropped, vec![2]);
    }
}
