// common.rs — console logging and the engine error taxonomy.
// Converted from: myq2-common's common.rs (Com_Printf/Com_DPrintf/Com_Error).

use parking_lot::Mutex;

pub const MAXPRINTMSG: usize = 4096;

/// Distribution name and version, reported in server-browser replies and the
/// startup banner.
pub const DISTNAME: &str = "teeserve";
pub const DISTVER: &str = "1.0";

static RD_BUFFER: Mutex<Option<String>> = Mutex::new(None);

/// Begin redirecting printf output into a buffer (used by rcon so command
/// output can be shipped back to the caller instead of the local console).
pub fn com_begin_redirect() {
    let mut buf = RD_BUFFER.lock();
    *buf = Some(String::new());
}

/// End redirect and return everything captured since `com_begin_redirect`.
pub fn com_end_redirect() -> Option<String> {
    let mut buf = RD_BUFFER.lock();
    buf.take()
}

/// General-purpose console print. Appends to the redirect buffer if one is
/// active, otherwise goes to stdout.
pub fn com_printf(msg: &str) {
    {
        let mut buf = RD_BUFFER.lock();
        if let Some(ref mut s) = *buf {
            s.push_str(msg);
            return;
        }
    }
    print!("{}", msg);
}

/// Debug-only print, gated on the `Debug` cvar. Silent unless the operator
/// has turned it on.
pub fn com_dprintf(cvars: &crate::cvar::CvarContext, msg: &str) {
    if cvars.variable_value("Debug") == 0.0 {
        return;
    }
    com_printf(msg);
}

/// Engine error taxonomy (spec §7): `ErrFatal` is a programming-bug
/// assertion that should never fire against well-formed input and aborts
/// the process; `ErrDrop` is a protocol/resource fault scoped to a single
/// client and is only ever logged here, never panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrCode {
    ErrFatal,
    ErrDrop,
}

/// Mirrors `Com_Error`: `ErrFatal` prints and panics, `ErrDrop` prints and
/// returns so the caller can drop the offending client.
pub fn com_error(code: ErrCode, msg: &str) {
    match code {
        ErrCode::ErrFatal => {
            eprintln!("Error: {}", msg);
            panic!("fatal error: {}", msg);
        }
        ErrCode::ErrDrop => {
            eprintln!("********************\nERROR: {}\n********************", msg);
        }
    }
}
