// cmd.rs — command buffer used for autoexec.cfg, CLI passthrough args, and
// rcon command execution (spec §4.I, §6).
// Converted from: myq2-common's cmd.rs (Cbuf_*/Cmd_* family), dropping the
// early/late CLI-arg scanning the teacher needs for `+set` style launch
// options (out of scope here — this port's CLI is `-s` plus passthrough
// text fed straight to the buffer, per spec §6) and the process-wide
// singleton, in favor of an owned `CmdContext`.

use std::collections::HashMap;

use crate::common::com_printf;
use crate::wildcards::wildcardfit;

pub const MAX_ALIAS_NAME: usize = 32;
pub const ALIAS_LOOP_COUNT: i32 = 16;
pub const MAX_STRING_CHARS: usize = 1024;
pub const MAX_STRING_TOKENS: usize = 80;

pub const EXEC_NOW: i32 = 0;
pub const EXEC_INSERT: i32 = 1;
pub const EXEC_APPEND: i32 = 2;

#[derive(Clone)]
pub struct CmdAlias {
    pub name: String,
    pub value: String,
}

pub struct CmdFunction {
    pub name: String,
    pub function: Option<Box<dyn Fn(&mut CmdContext) + Send>>,
}

struct CmdTextBuf {
    data: Vec<u8>,
    cursize: usize,
    maxsize: usize,
}

impl CmdTextBuf {
    fn new(maxsize: usize) -> Self {
        Self {
            data: vec![0u8; maxsize],
            cursize: 0,
            maxsize,
        }
    }

    fn clear(&mut self) {
        self.cursize = 0;
    }

    fn write(&mut self, src: &[u8]) {
        if self.cursize + src.len() > self.maxsize {
            return;
        }
        self.data[self.cursize..self.cursize + src.len()].copy_from_slice(src);
        self.cursize += src.len();
    }
}

/// Looks up a config file's contents for the `exec` builtin. Returns `None`
/// if the file doesn't exist.
pub type LoadFileFn = Box<dyn Fn(&str) -> Option<Vec<u8>> + Send>;
/// Looks up a cvar's string value, used for `$name` macro expansion.
pub type CvarVariableStringFn = Box<dyn Fn(&str) -> String + Send>;
/// Handles `name value` as a cvar set, or `name` as a cvar print. Returns
/// true if the line was a cvar reference.
pub type CvarCommandFn = Box<dyn Fn(&mut CmdContext) -> bool + Send>;

/// Command buffer + registry, owned by the server context and threaded
/// through explicitly rather than reached via a global.
pub struct CmdContext {
    cmd_text: CmdTextBuf,
    defer_text_buf: Vec<u8>,
    cmd_wait: bool,

    cmd_alias: Vec<CmdAlias>,
    cmd_alias_index: HashMap<String, usize>,
    alias_count: i32,

    cmd_argc: usize,
    cmd_argv: Vec<String>,
    cmd_args: String,

    cmd_functions: Vec<CmdFunction>,
    cmd_functions_index: HashMap<String, usize>,

    pub load_file: Option<LoadFileFn>,
    pub cvar_variable_string: Option<CvarVariableStringFn>,
    pub cvar_command: Option<CvarCommandFn>,
}

impl CmdContext {
    pub fn new() -> Self {
        Self {
            cmd_text: CmdTextBuf::new(65536),
            defer_text_buf: vec![0u8; 65536],
            cmd_wait: false,
            cmd_alias: Vec::new(),
            cmd_alias_index: HashMap::new(),
            alias_count: 0,
            cmd_argc: 0,
            cmd_argv: Vec::new(),
            cmd_args: String::new(),
            cmd_functions: Vec::new(),
            cmd_functions_index: HashMap::new(),
            load_file: None,
            cvar_variable_string: None,
            cvar_command: None,
        }
    }

    pub fn cbuf_add_text(&mut self, text: &str) {
        let bytes = text.as_bytes();
        if self.cmd_text.cursize + bytes.len() >= self.cmd_text.maxsize {
            com_printf("Cbuf_AddText: overflow\n");
            return;
        }
        self.cmd_text.write(bytes);
    }

    pub fn cbuf_insert_text(&mut self, text: &str) {
        let templen = self.cmd_text.cursize;
        let temp = if templen > 0 {
            let mut t = vec![0u8; templen];
            t.copy_from_slice(&self.cmd_text.data[..templen]);
            self.cmd_text.clear();
            Some(t)
        } else {
            None
        };

        self.cbuf_add_text(text);

        if let Some(t) = temp {
            self.cmd_text.write(&t);
        }
    }

    pub fn cbuf_copy_to_defer(&mut self) {
        let cursize = self.cmd_text.cursize;
        self.defer_text_buf[..cursize].copy_from_slice(&self.cmd_text.data[..cursize]);
        self.defer_text_buf[cursize] = 0;
        self.cmd_text.cursize = 0;
    }

    pub fn cbuf_insert_from_defer(&mut self) {
        let len = self.defer_text_buf.iter().position(|&b| b == 0).unwrap_or(0);
        if len > 0 {
            let text = String::from_utf8_lossy(&self.defer_text_buf[..len]).to_string();
            self.cbuf_insert_text(&text);
        }
        self.defer_text_buf[0] = 0;
    }

    pub fn cbuf_execute_text(&mut self, exec_when: i32, text: &str) {
        match exec_when {
            EXEC_NOW => self.cmd_execute_string(text),
            EXEC_INSERT => self.cbuf_insert_text(text),
            EXEC_APPEND => self.cbuf_add_text(text),
            _ => com_printf("Cbuf_ExecuteText: bad exec_when\n"),
        }
    }

    /// Drain and execute every command currently queued.
    pub fn cbuf_execute(&mut self) {
        self.alias_count = 0;

        while self.cmd_text.cursize > 0 {
            let mut quotes = 0;
            let mut i = 0;
            while i < self.cmd_text.cursize {
                let ch = self.cmd_text.data[i];
                if ch == b'"' {
                    quotes += 1;
                }
                if (quotes & 1) == 0 && ch == b';' {
                    break;
                }
                if ch == b'\n' {
                    break;
                }
                i += 1;
            }

            let line = String::from_utf8_lossy(&self.cmd_text.data[..i]).to_string();

            if i == self.cmd_text.cursize {
                self.cmd_text.cursize = 0;
            } else {
                let skip = i + 1;
                self.cmd_text.cursize -= skip;
                self.cmd_text.data.copy_within(skip..skip + self.cmd_text.cursize, 0);
            }

            self.cmd_execute_string(&line);

            if self.cmd_wait {
                self.cmd_wait = false;
                break;
            }
        }
    }

    fn cmd_macro_expand_string(&self, text: &str) -> Option<String> {
        let mut scan = text.to_string();

        if scan.len() >= MAX_STRING_CHARS {
            com_printf(&format!("Line exceeded {} chars, discarded.\n", MAX_STRING_CHARS));
            return None;
        }

        let mut count = 0;
        loop {
            let scan_bytes = scan.as_bytes();
            let mut inquote = false;
            let mut found_dollar = false;
            let mut dollar_pos = 0;
            for (ci, &b) in scan_bytes.iter().enumerate() {
                if b == b'"' {
                    inquote = !inquote;
                }
                if !inquote && b == b'$' {
                    dollar_pos = ci;
                    found_dollar = true;
                    break;
                }
            }

            if !found_dollar {
                break;
            }

            let after_dollar = &scan[dollar_pos + 1..];
            let (token, token_end) = com_parse_inline(after_dollar.as_bytes(), 0);
            if token.is_empty() {
                scan = format!("{}{}", &scan[..dollar_pos], &scan[dollar_pos + 1..]);
                continue;
            }

            let value = if let Some(ref cvar_fn) = self.cvar_variable_string {
                cvar_fn(&token)
            } else {
                String::new()
            };

            let total_consumed = dollar_pos + 1 + token_end;
            let new_len = scan.len() - (total_consumed - dollar_pos) + value.len();
            if new_len >= MAX_STRING_CHARS {
                com_printf(&format!("Expanded line exceeded {} chars, discarded.\n", MAX_STRING_CHARS));
                return None;
            }

            let mut new_scan = String::with_capacity(new_len);
            new_scan.push_str(&scan[..dollar_pos]);
            new_scan.push_str(&value);
            new_scan.push_str(&scan[total_consumed..]);
            scan = new_scan;

            count += 1;
            if count == 100 {
                com_printf("Macro expansion loop, discarded.\n");
                return None;
            }
        }

        let quote_count = scan.bytes().filter(|&b| b == b'"').count();
        if quote_count % 2 != 0 {
            com_printf("Line has unmatched quote, discarded.\n");
            return None;
        }

        Some(scan)
    }

    pub fn cmd_tokenize_string(&mut self, text: &str, macro_expand: bool) {
        self.cmd_argc = 0;
        self.cmd_argv.clear();
        self.cmd_args.clear();

        let expanded;
        let text = if macro_expand {
            if let Some(s) = self.cmd_macro_expand_string(text) {
                expanded = s;
                expanded.as_str()
            } else {
                return;
            }
        } else {
            text
        };

        let bytes = text.as_bytes();
        let mut pos = 0;

        loop {
            while pos < bytes.len() && bytes[pos] <= b' ' && bytes[pos] != b'\n' {
                pos += 1;
            }
            if pos >= bytes.len() {
                return;
            }
            if bytes[pos] == b'\n' {
                break;
            }

            if self.cmd_argc == 1 {
                let args_text = String::from_utf8_lossy(&bytes[pos..]).to_string();
                self.cmd_args = args_text.trim_end().to_string();
            }

            let (token, new_pos) = com_parse_inline(bytes, pos);
            if new_pos == pos && token.is_empty() {
                return;
            }
            pos = new_pos;

            if self.cmd_argc < MAX_STRING_TOKENS {
                self.cmd_argv.push(token);
                self.cmd_argc += 1;
            }
        }
    }

    pub fn cmd_add_command(&mut self, name: &str, function: Option<Box<dyn Fn(&mut CmdContext) + Send>>) {
        let key = name.to_ascii_lowercase();
        if self.cmd_functions_index.contains_key(&key) {
            com_printf(&format!("Cmd_AddCommand: {} already defined\n", name));
            return;
        }
        let idx = self.cmd_functions.len();
        self.cmd_functions.push(CmdFunction {
            name: name.to_string(),
            function,
        });
        self.cmd_functions_index.insert(key, idx);
    }

    pub fn cmd_exists(&self, name: &str) -> bool {
        self.cmd_functions_index.contains_key(&name.to_ascii_lowercase())
    }

    pub fn cmd_argc(&self) -> usize {
        self.cmd_argc
    }

    pub fn cmd_argv(&self, arg: usize) -> &str {
        if arg >= self.cmd_argc {
            ""
        } else {
            &self.cmd_argv[arg]
        }
    }

    pub fn cmd_args(&self) -> &str {
        &self.cmd_args
    }

    pub fn cmd_complete_command(&self, partial: &str) -> Option<&str> {
        if partial.is_empty() {
            return None;
        }
        if let Some(cmd) = self.cmd_functions.iter().find(|c| c.name == partial) {
            return Some(&cmd.name);
        }
        if let Some(alias) = self.cmd_alias.iter().find(|a| a.name == partial) {
            return Some(&alias.name);
        }
        if let Some(cmd) = self.cmd_functions.iter().find(|c| c.name.starts_with(partial)) {
            return Some(&cmd.name);
        }
        self.cmd_alias
            .iter()
            .find(|a| a.name.starts_with(partial))
            .map(|a| a.name.as_str())
    }

    /// Tokenize and dispatch a single command line: builtin/registered
    /// command, then alias, then the cvar fallback.
    pub fn cmd_execute_string(&mut self, text: &str) {
        self.cmd_tokenize_string(text, true);

        if self.cmd_argc == 0 {
            return;
        }

        let cmd_name = self.cmd_argv[0].clone();
        let key = cmd_name.to_ascii_lowercase();

        if let Some(&idx) = self.cmd_functions_index.get(&key) {
            let func = self.cmd_functions[idx].function.take();
            if let Some(f) = func {
                f(self);
                self.cmd_functions[idx].function = Some(f);
            }
            return;
        }

        if let Some(&idx) = self.cmd_alias_index.get(&key) {
            let alias_value = self.cmd_alias[idx].value.clone();
            self.alias_count += 1;
            if self.alias_count == ALIAS_LOOP_COUNT {
                com_printf("ALIAS_LOOP_COUNT\n");
                return;
            }
            let insert = format!("{}\n", alias_value);
            self.cbuf_insert_text(&insert);
            return;
        }

        if let Some(cvar_cmd) = self.cvar_command.take() {
            let handled = cvar_cmd(self);
            self.cvar_command = Some(cvar_cmd);
            if handled {
                return;
            }
        }

        com_printf(&format!("Unknown command \"{}\"\n", cmd_name));
    }

    pub fn cmd_wait_f(&mut self) {
        self.cmd_wait = true;
    }

    pub fn cmd_echo_f(&self) {
        for i in 1..self.cmd_argc {
            com_printf(&format!("{} ", self.cmd_argv(i)));
        }
        com_printf("\n");
    }

    /// `exec <filename>` — load a `.cfg` file through the `load_file`
    /// callback and insert its contents ahead of whatever's left in the
    /// buffer (used for `autoexec.cfg` at startup, spec §6).
    pub fn cmd_exec_f(&mut self) {
        if self.cmd_argc != 2 {
            com_printf("exec <filename> : execute a script file\n");
            return;
        }

        let mut filename = self.cmd_argv(1).to_string();
        if !wildcardfit("*.cfg", &filename) {
            filename.push_str(".cfg");
        }

        let file_data = if let Some(ref load_fn) = self.load_file {
            load_fn(&filename)
        } else {
            com_printf(&format!("couldn't exec {} (no filesystem)\n", filename));
            return;
        };

        match file_data {
            Some(data) => {
                com_printf(&format!("execing {}\n", filename));
                let text = String::from_utf8_lossy(&data).to_string();
                self.cbuf_insert_text(&text);
            }
            None => {
                com_printf(&format!("couldn't exec {}\n", filename));
            }
        }
    }

    pub fn cmd_alias_f(&mut self) {
        let c = self.cmd_argc;
        if c <= 2 {
            self.cmd_alias_list(None);
            return;
        }

        let name = self.cmd_argv(1).to_string();
        if name.len() >= MAX_ALIAS_NAME {
            com_printf("Alias name is too long\n");
            return;
        }

        let mut cmd = String::new();
        for i in 2..c {
            cmd.push_str(self.cmd_argv(i));
            if i != c - 1 {
                cmd.push(' ');
            }
        }
        self.cmd_alias_set(&name, &cmd);
    }

    pub fn cmd_alias_set(&mut self, name: &str, value: &str) {
        let key = name.to_ascii_lowercase();
        if let Some(&idx) = self.cmd_alias_index.get(&key) {
            self.cmd_alias[idx].value = value.to_string();
            return;
        }
        let idx = self.cmd_alias.len();
        self.cmd_alias.push(CmdAlias {
            name: name.to_string(),
            value: value.to_string(),
        });
        self.cmd_alias_index.insert(key, idx);
    }

    pub fn cmd_alias_list(&self, pattern: Option<&str>) {
        let wc = pattern.unwrap_or("*");
        for alias in &self.cmd_alias {
            if wildcardfit(wc, &alias.name) {
                com_printf(&format!("{} : {}\n", alias.name, alias.value));
            }
        }
    }
}

impl Default for CmdContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse one whitespace- or quote-delimited token starting at `pos`.
fn com_parse_inline(data: &[u8], mut pos: usize) -> (String, usize) {
    while pos < data.len() && data[pos] <= b' ' {
        if data[pos] == b'\n' {
            return (String::new(), pos);
        }
        pos += 1;
    }

    if pos >= data.len() {
        return (String::new(), pos);
    }

    let mut token = String::new();

    if data[pos] == b'"' {
        pos += 1;
        while pos < data.len() && data[pos] != b'"' {
            token.push(data[pos] as char);
            pos += 1;
        }
        if pos < data.len() {
            pos += 1;
        }
        return (token, pos);
    }

    while pos < data.len() && data[pos] > b' ' {
        token.push(data[pos] as char);
        pos += 1;
    }

    (token, pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_splits_on_whitespace() {
        let mut ctx = CmdContext::new();
        ctx.cmd_tokenize_string("rcon_auth supersecret", false);
        assert_eq!(ctx.cmd_argc(), 2);
        assert_eq!(ctx.cmd_argv(0), "rcon_auth");
        assert_eq!(ctx.cmd_argv(1), "supersecret");
        assert_eq!(ctx.cmd_args(), "supersecret");
    }

    #[test]
    fn tokenize_respects_quotes() {
        let mut ctx = CmdContext::new();
        ctx.cmd_tokenize_string(r#"say "hello world""#, false);
        assert_eq!(ctx.cmd_argc(), 2);
        assert_eq!(ctx.cmd_argv(1), "hello world");
    }

    #[test]
    fn macro_expand_substitutes_cvar() {
        let mut ctx = CmdContext::new();
        ctx.cvar_variable_string = Some(Box::new(|name| {
            if name == "sv_port" { "8303".to_string() } else { String::new() }
        }));
        ctx.cmd_tokenize_string("echo port=$sv_port", true);
        assert_eq!(ctx.cmd_argv(1), "port=8303");
    }

    #[test]
    fn alias_set_and_execute() {
        let mut ctx = CmdContext::new();
        ctx.cmd_add_command("echo", Some(Box::new(|c| c.cmd_echo_f())));
        ctx.cmd_alias_set("greet", "echo hi");
        ctx.cbuf_add_text("greet\n");
        ctx.cbuf_execute();
    }

    #[test]
    fn unknown_command_does_not_panic() {
        let mut ctx = CmdContext::new();
        ctx.cbuf_add_text("totally_unknown_command\n");
        ctx.cbuf_execute();
    }

    #[test]
    fn exec_missing_file_reports_error() {
        let mut ctx = CmdContext::new();
        ctx.load_file = Some(Box::new(|_| None));
        ctx.cbuf_add_text("exec autoexec.cfg\n");
        ctx.cbuf_execute();
    }
}
