use std::io::{self, BufRead};
use std::sync::Arc;
use std::{env, process, thread};

use callrelay::log::{LogSink, Logger};
use callrelay::signaling::run::{config_path, load_relay_config, shutdown_on_signals};
use callrelay::signaling::{ShutdownHandle, SignalingServer};
use callrelay::{sink_info, sink_warn};

fn main() {
    // --- Parse CLI args ----------------------------------------------------
    //
    // Supported:
    //   cargo run --bin relay_server
    //      -> defaults (0.0.0.0:5000), or the file named by RELAY_CONFIG
    //
    //   cargo run --bin relay_server -- relay.ini
    //      -> settings from relay.ini
    //
    // RELAY_HOST / RELAY_PORT (or PORT) / RELAY_ALLOWED_ORIGINS override the file.
    let mut args = env::args().skip(1);
    let path = config_path(args.next());
    if args.next().is_some() {
        eprintln!("Usage: relay_server [CONFIG_FILE]");
        process::exit(2);
    }

    let (config, relay_config) = match load_relay_config(path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[relay_server] {e}");
            process::exit(1);
        }
    };

    // --- Start process logger ----------------------------------------------
    let logger = Logger::start_server(1024, &config);
    let log_sink: Arc<dyn LogSink> = Arc::new(logger.handle());
    eprintln!("[relay_server] logging to {}", logger.file_path().display());

    let server = match SignalingServer::bind(relay_config, log_sink.clone()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("[relay_server] {e}");
            process::exit(1);
        }
    };
    eprintln!(
        "[relay_server] listening on {} (Ctrl-C or 'quit' to stop)",
        server.local_addr()
    );

    // SIGINT / SIGTERM / SIGHUP all take the same graceful path as `quit`.
    if let Err(e) = shutdown_on_signals(server.shutdown_handle()) {
        sink_warn!(log_sink, "signal handler not installed: {}", e);
        eprintln!("[relay_server] signal handler not installed: {e}");
    }
    spawn_quit_watcher(server.shutdown_handle());

    // --- Run relay (blocks until shutdown) ---------------------------------
    let result = server.run();
    match &result {
        Ok(()) => sink_info!(log_sink, "relay_server exiting"),
        Err(e) => sink_warn!(log_sink, "relay_server stopped: {}", e),
    }

    // Every other handle went away with the server; wait for the file flush.
    drop(log_sink);
    logger.shutdown();

    if let Err(e) = result {
        eprintln!("[relay_server] {e}");
        process::exit(1);
    }
}

/// Requests shutdown when `quit` is typed. A closed stdin (daemonized
/// process) leaves the relay running.
fn spawn_quit_watcher(shutdown: ShutdownHandle) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(l) if l.trim().eq_ignore_ascii_case("quit") => {
                    shutdown.request();
                    return;
                }
                Ok(_) => {}
                Err(_) => return,
            }
        }
    });
}
