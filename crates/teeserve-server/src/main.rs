// main.rs — CLI entrypoint: silent-mode flag, autoexec.cfg, and the
// fixed-rate run loop.
// Converted from: myq2-server's bin entrypoint (arg parsing feeding a
// `CmdContext`, `exec autoexec.cfg` before the first frame), re-targeted
// at this port's `-s`/`--silent` plus passthrough-to-buffer CLI instead of
// Quake's `+set`/`+map` early/late command scanning (out of scope, spec §6).

use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use teeserve_common::cmd::CmdContext;
use teeserve_common::common::com_printf;
use teeserve_common::cvar::CvarContext;
use teeserve_common::wire::SERVER_TICK_SPEED;

use teeserve_game::demo::DemoGame;

use teeserve_server::server::ServerContext;
use teeserve_server::transport::Transport;

fn load_cfg_file(filename: &str) -> Option<Vec<u8>> {
    std::fs::read(filename).ok()
}

fn read_map_file(name: &str) -> Vec<u8> {
    std::fs::read(format!("maps/{name}.map")).unwrap_or_default()
}

/// Parses CLI args into `(silent, passthrough)`. `-s`/`--silent` suppresses
/// the startup banner; everything else is handed verbatim to the command
/// buffer as if typed at the console, per spec §6.
fn parse_args(args: &[String]) -> (bool, Vec<String>) {
    let mut silent = false;
    let mut passthrough = Vec::new();
    for arg in args {
        if arg == "-s" || arg == "--silent" {
            silent = true;
        } else {
            passthrough.push(arg.clone());
        }
    }
    (silent, passthrough)
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (silent, passthrough) = parse_args(&args);

    if !silent {
        com_printf(&format!(
            "{} {} starting up\n",
            teeserve_common::common::DISTNAME,
            teeserve_common::common::DISTVER
        ));
    }

    let mut cvars = CvarContext::new();
    cvars.register_defaults();

    let mut cmds = CmdContext::new();
    cmds.load_file = Some(Box::new(load_cfg_file));
    cmds.cbuf_add_text("exec autoexec.cfg\n");
    for arg in &passthrough {
        cmds.cbuf_add_text(arg);
        cmds.cbuf_add_text("\n");
    }
    cmds.cbuf_execute();
    cvars.get_latched_vars();

    let bind_addr: SocketAddr = format!(
        "{}:{}",
        if cvars.variable_string("Bindaddr").is_empty() { "0.0.0.0" } else { cvars.variable_string("Bindaddr") },
        cvars.variable_value("SvPort") as u16
    )
    .parse()
    .unwrap_or_else(|_| "0.0.0.0:8303".parse().unwrap());

    let transport = match Transport::bind(bind_addr) {
        Ok(t) => t,
        Err(e) => {
            com_printf(&format!("couldn't bind to {bind_addr}: {e}\n"));
            std::process::exit(-1);
        }
    };

    let map_name = cvars.variable_string("SvMap").to_string();
    let map_name = if map_name.is_empty() { "dm1".to_string() } else { map_name };
    let map_bytes = read_map_file(&map_name);

    let mut server = ServerContext::new(
        cvars,
        cmds,
        transport,
        Box::new(DemoGame::new(&map_name)),
        &map_name,
        map_bytes,
    );
    server.map_loader = Some(Box::new(read_map_file));

    if !silent {
        com_printf(&format!("listening on {bind_addr}\n"));
    }

    run(&mut server);
}

/// The fixed 50Hz loop: advance the tick once per period, pumping the
/// network in between (spec §4.L/§5 `socket_read_wait(<=5ms)`).
fn run(server: &mut ServerContext) {
    let period = Duration::from_millis(1000 / SERVER_TICK_SPEED as u64);
    let mut next_tick = Instant::now() + period;
    let mut buf = [0u8; 4096];

    loop {
        while Instant::now() < next_tick {
            match server.transport.recv(&mut buf) {
                Ok(Some((n, from))) => server.handle_packet(&buf[..n], from),
                Ok(None) => {}
                Err(_) => break,
            }
        }
        server.run_tick();
        next_tick += period;

        let now = Instant::now();
        if next_tick > now {
            thread::sleep(next_tick - now);
        } else {
            next_tick = now + period;
        }
    }
}
