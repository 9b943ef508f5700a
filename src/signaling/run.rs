use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::log::{LogSink, NoopLogSink};
use crate::signaling::errors::RelayError;
use crate::signaling::relay_config::RelayConfig;
use crate::signaling::signaling_server::{ShutdownHandle, SignalingServer};

/// Environment variable naming the config file when no CLI argument is given.
pub const CONFIG_ENV: &str = "RELAY_CONFIG";

/// Picks the config file: explicit argument first, then `RELAY_CONFIG`.
pub fn config_path(arg: Option<String>) -> Option<PathBuf> {
    arg.or_else(|| std::env::var(CONFIG_ENV).ok())
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
}

/// Loads the INI file (or an empty config when there is none) and derives the
/// relay settings, applying environment overrides.
pub fn load_relay_config(path: Option<&Path>) -> Result<(Config, RelayConfig), RelayError> {
    let config = match path {
        Some(p) => Config::load(p)?,
        None => Config::empty(),
    };
    let relay = RelayConfig::from_config_and_env(&config)?;
    Ok((config, relay))
}

/// Requests a graceful stop on SIGINT, SIGTERM or SIGHUP (Ctrl-C on Windows).
///
/// Only one handler can be installed per process.
pub fn shutdown_on_signals(shutdown: ShutdownHandle) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || shutdown.request())
}

/// Binds and runs the relay until its shutdown handle is triggered.
pub fn run_signaling_server_with_log(
    config: RelayConfig,
    log: Arc<dyn LogSink>,
) -> Result<(), RelayError> {
    SignalingServer::bind(config, log)?.run()
}

/// Convenience: run the relay without logging.
pub fn run_signaling_server(config: RelayConfig) -> Result<(), RelayError> {
    run_signaling_server_with_log(config, Arc::new(NoopLogSink))
}
