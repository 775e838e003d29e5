// cvar.rs — dynamic variable tracking for server configuration.
// Converted from: myq2-common's cvar.rs (Cvar/CvarContext), dropping the
// q_shared.rs info-string plumbing this port has no use for and the
// process-wide CVAR_CTX singleton in favor of a context handle the caller
// owns and threads through explicitly.

use std::collections::HashMap;

use crate::common::com_printf;
use crate::wildcards::wildcardfit;

pub const CVAR_ARCHIVE: i32 = 1 << 0;
pub const CVAR_USERINFO: i32 = 1 << 1;
pub const CVAR_SERVERINFO: i32 = 1 << 2;
pub const CVAR_NOSET: i32 = 1 << 3;
pub const CVAR_LATCH: i32 = 1 << 4;

/// A single configuration variable: a string with a cached float parse,
/// matching how the config keys in spec §6 are read (`SvPort` as a number,
/// `SvName` as a string) through one uniform accessor.
#[derive(Clone, Debug)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    pub latched_string: Option<String>,
    pub flags: i32,
    pub modified: bool,
    pub value: f32,
}

/// The config system. One instance lives inside the server context and is
/// threaded through by reference rather than reached via a global.
#[derive(Default)]
pub struct CvarContext {
    cvar_vars: Vec<Cvar>,
    cvar_index: HashMap<String, usize>,
}

impl CvarContext {
    pub fn new() -> Self {
        Self {
            cvar_vars: Vec::new(),
            cvar_index: HashMap::new(),
        }
    }

    fn info_validate(s: &str) -> bool {
        !s.contains('\\') && !s.contains('"') && !s.contains(';')
    }

    pub fn find_var_index(&self, name: &str) -> Option<usize> {
        self.cvar_index.get(name).copied()
    }

    pub fn find_var(&self, name: &str) -> Option<&Cvar> {
        self.cvar_index.get(name).map(|&idx| &self.cvar_vars[idx])
    }

    pub fn find_var_mut(&mut self, name: &str) -> Option<&mut Cvar> {
        let idx = *self.cvar_index.get(name)?;
        Some(&mut self.cvar_vars[idx])
    }

    /// Get the floating-point value of a cvar. Returns 0 if not found.
    pub fn variable_value(&self, name: &str) -> f32 {
        self.find_var(name).map_or(0.0, |var| var.value)
    }

    /// Get the string value of a cvar. Returns "" if not found.
    pub fn variable_string(&self, name: &str) -> &str {
        self.find_var(name).map_or("", |var| var.string.as_str())
    }

    pub fn complete_variable(&self, partial: &str) -> Option<&str> {
        if partial.is_empty() {
            return None;
        }
        if let Some(var) = self.cvar_vars.iter().find(|v| v.name == partial) {
            return Some(&var.name);
        }
        self.cvar_vars
            .iter()
            .find(|v| v.name.starts_with(partial))
            .map(|v| v.name.as_str())
    }

    /// Get or create a cvar. If it already exists, the value is left alone
    /// and the flags are OR'd in — matches the teacher's `Cvar_Get`.
    pub fn get(&mut self, name: &str, value: &str, flags: i32) -> Option<usize> {
        if flags & (CVAR_USERINFO | CVAR_SERVERINFO) != 0 && !Self::info_validate(name) {
            com_printf("invalid info cvar name\n");
            return None;
        }

        if let Some(&idx) = self.cvar_index.get(name) {
            self.cvar_vars[idx].flags |= flags;
            return Some(idx);
        }

        if flags & (CVAR_USERINFO | CVAR_SERVERINFO) != 0 && !Self::info_validate(value) {
            com_printf("invalid info cvar value\n");
            return None;
        }

        let float_val = value.parse::<f32>().unwrap_or(0.0);
        let idx = self.cvar_vars.len();
        self.cvar_vars.push(Cvar {
            name: name.to_string(),
            string: value.to_string(),
            latched_string: None,
            flags,
            modified: true,
            value: float_val,
        });
        self.cvar_index.insert(name.to_string(), idx);
        Some(idx)
    }

    fn set2(&mut self, name: &str, value: &str, force: bool) -> Option<usize> {
        let idx = match self.find_var_index(name) {
            Some(idx) => idx,
            None => return self.get(name, value, 0),
        };

        if self.cvar_vars[idx].flags & (CVAR_USERINFO | CVAR_SERVERINFO) != 0
            && !Self::info_validate(value)
        {
            com_printf("invalid info cvar value\n");
            return Some(idx);
        }

        if !force {
            if self.cvar_vars[idx].flags & CVAR_NOSET != 0 {
                com_printf(&format!("{} is write protected.\n", name));
                return Some(idx);
            }
            if self.cvar_vars[idx].flags & CVAR_LATCH != 0 {
                self.cvar_vars[idx].latched_string = Some(value.to_string());
                return Some(idx);
            }
        } else {
            self.cvar_vars[idx].latched_string = None;
        }

        if value == self.cvar_vars[idx].string {
            return Some(idx);
        }

        self.cvar_vars[idx].modified = true;
        self.cvar_vars[idx].string = value.to_string();
        self.cvar_vars[idx].value = value.parse::<f32>().unwrap_or(0.0);
        Some(idx)
    }

    /// Set a cvar value (respects NOSET and LATCH flags).
    pub fn set(&mut self, name: &str, value: &str) -> Option<usize> {
        self.set2(name, value, false)
    }

    /// Force-set a cvar value (ignores NOSET and LATCH) — used for a few
    /// values the engine itself computes rather than the operator.
    pub fn force_set(&mut self, name: &str, value: &str) -> Option<usize> {
        self.set2(name, value, true)
    }

    pub fn set_value(&mut self, name: &str, value: f32) {
        let val_str = if value == (value as i32) as f32 {
            format!("{}", value as i32)
        } else {
            format!("{}", value)
        };
        self.set(name, &val_str);
    }

    /// Apply any SvRconMaxTries-style latched changes queued by `set` on a
    /// CVAR_LATCH variable (e.g. `SvMaxClients`, which only takes effect on
    /// the next map load, matching `SV_SpawnServer`'s use of `Cvar_GetLatchedVars`).
    pub fn get_latched_vars(&mut self) {
        for var in &mut self.cvar_vars {
            if let Some(latched) = var.latched_string.take() {
                var.string = latched;
                var.value = var.string.parse::<f32>().unwrap_or(0.0);
            }
        }
    }

    pub fn write_variables(&self, writer: &mut dyn std::io::Write) -> std::io::Result<()> {
        for var in &self.cvar_vars {
            if var.flags & CVAR_ARCHIVE != 0 {
                writeln!(writer, "set {} \"{}\"", var.name, var.string)?;
            }
        }
        Ok(())
    }

    pub fn list(&self, pattern: Option<&str>) -> (usize, usize) {
        let wc = pattern.unwrap_or("*");
        let mut total = 0;
        let mut matching = 0;
        for var in &self.cvar_vars {
            total += 1;
            if wildcardfit(wc, &var.name) {
                matching += 1;
                let archive = if var.flags & CVAR_ARCHIVE != 0 { '*' } else { ' ' };
                let noset = if var.flags & CVAR_NOSET != 0 {
                    '-'
                } else if var.flags & CVAR_LATCH != 0 {
                    'L'
                } else {
                    ' '
                };
                com_printf(&format!(
                    "{}{} {} \"{}\"\n",
                    archive, noset, var.name, var.string
                ));
            }
        }
        com_printf(&format!("{} cvars, {} matching\n", total, matching));
        (total, matching)
    }

    /// Register the config keys spec §6 names, with the defaults
    /// `original_source/`'s config table uses where it names one, otherwise
    /// a value documented in DESIGN.md.
    pub fn register_defaults(&mut self) {
        let defaults: &[(&str, &str, i32)] = &[
            ("SvName", "unnamed server", CVAR_ARCHIVE | CVAR_SERVERINFO),
            ("SvPort", "8303", CVAR_ARCHIVE),
            ("Bindaddr", "", CVAR_ARCHIVE),
            ("SvMap", "", CVAR_ARCHIVE),
            ("SvMaxClients", "64", CVAR_ARCHIVE | CVAR_SERVERINFO | CVAR_LATCH),
            ("SvMaxClientsPerIP", "4", CVAR_ARCHIVE),
            ("SvSpectatorSlots", "0", CVAR_ARCHIVE | CVAR_SERVERINFO),
            ("Password", "", CVAR_ARCHIVE),
            ("SvRconPassword", "", CVAR_ARCHIVE),
            ("SvRconModPassword", "", CVAR_ARCHIVE),
            ("SvRconMaxTries", "3", CVAR_ARCHIVE),
            ("SvRconBantime", "0", CVAR_ARCHIVE),
            ("SvNetlimit", "800", CVAR_ARCHIVE),
            ("SvNetlimitAlpha", "20", CVAR_ARCHIVE),
            ("SvHighBandwidth", "0", CVAR_ARCHIVE | CVAR_SERVERINFO),
            ("SvMapWindow", "5", CVAR_ARCHIVE),
            ("SvAutoDemoRecord", "0", CVAR_ARCHIVE),
            ("SvAutoDemoMax", "10", CVAR_ARCHIVE),
            ("SvSqliteFile", "", CVAR_ARCHIVE),
            ("SvUseSql", "0", CVAR_ARCHIVE),
            ("SvProxyCheck", "0", CVAR_ARCHIVE),
            ("SvProxyCheckBan", "0", CVAR_ARCHIVE),
            ("Debug", "0", 0),
            ("ConsoleOutputLevel", "0", CVAR_ARCHIVE),
        ];
        for &(name, value, flags) in defaults {
            self.get(name, value, flags);
        }
    }
}
