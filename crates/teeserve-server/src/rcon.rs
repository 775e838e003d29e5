// rcon.rs — RCON auth/exec (module I): password auth, access-level gate,
// anti-brute-force, and the command dribble cadence.
// Converted from: myq2-common's cvar.rs O(1) name-indexed-table idiom,
// applied to a rcon command registry rather than a console command table
// — the real `IConsole` the original binds to is out of scope (spec §1),
// so this supplements the spec with the dribble/ADD/REM cadence named in
// `original_source/server.cpp`'s `UpdateClientRconCommands`/
// `ConchainModCommandUpdate` against this generalized table.

use std::collections::HashMap;

use teeserve_common::wire::{AuthedLevel, MAX_RCONCMD_SEND};

#[derive(Debug, Clone)]
pub struct RconCommand {
    pub name: String,
    pub description: String,
    pub access_level: AuthedLevel,
}

/// Access-level-gated name -> description registry, standing in for the
/// real console command table (out of scope, spec §1).
#[derive(Default)]
pub struct RconCommandTable {
    commands: Vec<RconCommand>,
    index: HashMap<String, usize>,
}

impl RconCommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, description: &str, access_level: AuthedLevel) {
        let idx = self.commands.len();
        self.commands.push(RconCommand {
            name: name.to_string(),
            description: description.to_string(),
            access_level,
        });
        self.index.insert(name.to_string(), idx);
    }

    pub fn set_access_level(&mut self, name: &str, level: AuthedLevel) -> Option<AuthedLevel> {
        let idx = *self.index.get(name)?;
        let old = self.commands[idx].access_level;
        self.commands[idx].access_level = level;
        Some(old)
    }

    pub fn visible_to(&self, level: AuthedLevel) -> Vec<&RconCommand> {
        self.commands.iter().filter(|c| c.access_level <= level).collect()
    }
}

/// A per-client cursor into the filtered command list, advanced by the
/// per-tick dribble.
pub struct DribbleIterator {
    names: Vec<String>,
    pos: usize,
}

impl DribbleIterator {
    pub fn new(table: &RconCommandTable, level: AuthedLevel) -> Self {
        Self {
            names: table.visible_to(level).into_iter().map(|c| c.name.clone()).collect(),
            pos: 0,
        }
    }

    pub fn is_done(&self) -> bool {
        self.pos >= self.names.len()
    }

    /// Pulls up to `MAX_RCONCMD_SEND` more names to send as
    /// `NETMSG_RCON_CMD_ADD` entries.
    pub fn next_batch(&mut self) -> Vec<String> {
        let end = (self.pos + MAX_RCONCMD_SEND).min(self.names.len());
        let batch = self.names[self.pos..end].to_vec();
        self.pos = end;
        batch
    }
}

/// One client's auth-attempt state against the admin/mod passwords.
#[derive(Debug, Default)]
pub struct RconAuthState {
    pub tries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RconAuthOutcome {
    Granted(AuthedLevel),
    /// Wrong password; carries the attempt number just consumed.
    Denied { attempt: u32 },
    /// Attempt count has now reached the configured maximum: the caller
    /// must ban/drop the address.
    TooManyTries,
}

/// Compares `attempt` against the admin password first, then the mod
/// password, mirroring `ProcessClientPacket`'s `NETMSG_RCON_AUTH` handler.
pub fn try_auth(
    state: &mut RconAuthState,
    attempt: &str,
    admin_password: &str,
    mod_password: &str,
    max_tries: u32,
) -> RconAuthOutcome {
    if !admin_password.is_empty() && attempt == admin_password {
        state.tries = 0;
        return RconAuthOutcome::Granted(AuthedLevel::Admin);
    }
    if !mod_password.is_empty() && attempt == mod_password {
        state.tries = 0;
        return RconAuthOutcome::Granted(AuthedLevel::Mod);
    }

    state.tries += 1;
    if state.tries >= max_tries {
        RconAuthOutcome::TooManyTries
    } else {
        RconAuthOutcome::Denied { attempt: state.tries }
    }
}

/// The process-scoped "current rcon caller" set around console execution
/// (spec §4.I): client id + authed level, restored after the command
/// runs. Lives on the server context rather than a static, per spec §9's
/// no-statics guidance.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentCaller {
    pub client_id: Option<usize>,
    pub level: AuthedLevel,
}

impl CurrentCaller {
    /// A caller may only act against a target whose authed level is
    /// strictly below their own (spec §4.I: "forbids banning/kicking a
    /// target whose authed level is >= caller's").
    pub fn may_act_on(&self, target_level: AuthedLevel) -> bool {
        self.level > target_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_grants_admin_over_mod() {
        let mut state = RconAuthState::default();
        let outcome = try_auth(&mut state, "adminpw", "adminpw", "modpw", 3);
        assert_eq!(outcome, RconAuthOutcome::Granted(AuthedLevel::Admin));
    }

    #[test]
    fn three_wrong_attempts_trip_too_many_tries() {
        let mut state = RconAuthState::default();
        assert_eq!(try_auth(&mut state, "x", "secret", "", 3), RconAuthOutcome::Denied { attempt: 1 });
        assert_eq!(try_auth(&mut state, "x", "secret", "", 3), RconAuthOutcome::Denied { attempt: 2 });
        assert_eq!(try_auth(&mut state, "x", "secret", "", 3), RconAuthOutcome::TooManyTries);
    }

    #[test]
    fn dribble_batches_respect_max_send() {
        let mut table = RconCommandTable::new();
        for i in 0..10 {
            table.register(&format!("cmd{i}"), "desc", AuthedLevel::Admin);
        }
        let mut it = DribbleIterator::new(&table, AuthedLevel::Admin);
        let first = it.next_batch();
        assert_eq!(first.len(), MAX_RCONCMD_SEND);
        assert!(!it.is_done());
    }

    #[test]
    fn visible_to_filters_by_access_level() {
        let mut table = RconCommandTable::new();
        table.register("status", "desc", AuthedLevel::Mod);
        table.register("shutdown", "desc", AuthedLevel::Admin);
        let mod_visible = table.visible_to(AuthedLevel::Mod);
        assert_eq!(mod_visible.len(), 1);
        assert_eq!(mod_visible[0].name, "status");
    }

    #[test]
    fn current_caller_cannot_act_on_equal_or_higher_level() {
        let caller = CurrentCaller { client_id: Some(1), level: AuthedLevel::Mod };
        assert!(!caller.may_act_on(AuthedLevel::Mod));
        assert!(!caller.may_act_on(AuthedLevel::Admin));
        assert!(caller.may_act_on(AuthedLevel::No));
    }
}
