// ban.rs — ban table primitives (module J data model): address and CIDR
// range entries with expiry, looked up on every inbound datagram.
// Converted from: myq2-common's cvar.rs Vec-backed table idiom, re-pointed
// at std::net addresses instead of the teacher's own NetAdr type (spec §9
// doesn't need NetAdr's legacy IPv4/IPv6-distinction granularity).

use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanTarget {
    Addr(IpAddr),
    /// CIDR range: `addr` masked to its first `prefix_len` bits.
    Range { addr: IpAddr, prefix_len: u8 },
}

#[derive(Debug, Clone)]
pub struct BanEntry {
    pub target: BanTarget,
    /// `None` is permanent.
    pub expiry: Option<i64>,
    pub reason: String,
}

fn max_prefix_len(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn addr_bits(addr: &IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => u32::from(*v4) as u128,
        IpAddr::V6(v6) => u128::from(*v6),
    }
}

/// A CIDR range is non-degenerate when it neither collapses to a single
/// address (`prefix_len == max`) nor spans the entire address family
/// (`prefix_len == 0`).
pub fn validate_range(addr: &IpAddr, prefix_len: u8) -> bool {
    let max = max_prefix_len(addr);
    prefix_len > 0 && prefix_len < max
}

fn range_contains(range_addr: &IpAddr, prefix_len: u8, candidate: &IpAddr) -> bool {
    let (IpAddr::V4(_), IpAddr::V4(_)) | (IpAddr::V6(_), IpAddr::V6(_)) = (range_addr, candidate)
    else {
        return false;
    };
    let max = max_prefix_len(range_addr);
    if prefix_len > max {
        return false;
    }
    if prefix_len == 0 {
        return true;
    }
    let shift = max - prefix_len;
    let mask = if shift >= 128 { 0 } else { !0u128 << shift };
    (addr_bits(range_addr) & mask) == (addr_bits(candidate) & mask)
}

#[derive(Default)]
pub struct BanTable {
    entries: Vec<BanEntry>,
}

impl BanTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, target: BanTarget, expiry: Option<i64>, reason: String) {
        self.entries.push(BanEntry { target, expiry, reason });
    }

    /// Returns the first matching, still-live entry for `addr`.
    pub fn find(&self, addr: IpAddr, now: i64) -> Option<&BanEntry> {
        self.entries.iter().find(|e| {
            if e.expiry.is_some_and(|exp| exp <= now) {
                return false;
            }
            match e.target {
                BanTarget::Addr(a) => a == addr,
                BanTarget::Range { addr: range_addr, prefix_len } => {
                    range_contains(&range_addr, prefix_len, &addr)
                }
            }
        })
    }

    pub fn is_banned(&self, addr: IpAddr, now: i64) -> bool {
        self.find(addr, now).is_some()
    }

    /// Drops every entry whose expiry has elapsed.
    pub fn prune_expired(&mut self, now: i64) {
        self.entries.retain(|e| !e.expiry.is_some_and(|exp| exp <= now));
    }

    pub fn entries(&self) -> &[BanEntry] {
        &self.entries
    }

    /// Removes every entry matching `addr` exactly (used to unban).
    pub fn remove_addr(&mut self, addr: IpAddr) {
        self.entries.retain(|e| !matches!(e.target, BanTarget::Addr(a) if a == addr));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn addr_ban_matches_exact_address_only() {
        let mut t = BanTable::new();
        t.add(BanTarget::Addr(v4(1, 2, 3, 4)), None, "test".into());
        assert!(t.is_banned(v4(1, 2, 3, 4), 0));
        assert!(!t.is_banned(v4(1, 2, 3, 5), 0));
    }

    #[test]
    fn range_ban_matches_prefix() {
        let mut t = BanTable::new();
        t.add(
            BanTarget::Range { addr: v4(10, 0, 0, 0), prefix_len: 24 },
            None,
            "range".into(),
        );
        assert!(t.is_banned(v4(10, 0, 0, 200), 0));
        assert!(!t.is_banned(v4(10, 0, 1, 1), 0));
    }

    #[test]
    fn expired_entry_does_not_match() {
        let mut t = BanTable::new();
        t.add(BanTarget::Addr(v4(1, 1, 1, 1)), Some(100), "temp".into());
        assert!(t.is_banned(v4(1, 1, 1, 1), 50));
        assert!(!t.is_banned(v4(1, 1, 1, 1), 150));
    }

    #[test]
    fn prune_expired_removes_stale_entries() {
        let mut t = BanTable::new();
        t.add(BanTarget::Addr(v4(1, 1, 1, 1)), Some(100), "temp".into());
        t.add(BanTarget::Addr(v4(2, 2, 2, 2)), None, "perm".into());
        t.prune_expired(200);
        assert_eq!(t.entries().len(), 1);
    }

    #[test]
    fn validate_range_rejects_degenerate_bounds() {
        let addr = v4(10, 0, 0, 0);
        assert!(!validate_range(&addr, 0));
        assert!(!validate_range(&addr, 32));
        assert!(validate_range(&addr, 24));
    }
}
