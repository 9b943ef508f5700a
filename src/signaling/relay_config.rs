use std::path::PathBuf;
use std::time::Duration;

use crate::config::{Config, ConfigError, split_list};
use crate::signaling::handshake::{ANY_ORIGIN, HandshakePolicy};
use crate::signaling::protocol::MAX_MESSAGE_BYTES;

const SECTION: &str = "Relay";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;

/// PEM files for `wss://`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Everything the relay needs to start.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    /// Accepted `Sec-WebSocket-Protocol` values.
    pub subprotocols: Vec<String>,
    pub max_message_bytes: usize,
    /// Read timeout of each connection's socket; bounds outbound latency.
    pub poll_interval: Duration,
    pub handshake_timeout: Duration,
    pub write_timeout: Duration,
    /// Push `peer-list` to everyone on every connect/disconnect.
    pub announce_peers: bool,
    pub tls: Option<TlsSettings>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            allowed_origins: vec![ANY_ORIGIN.to_string()],
            subprotocols: Vec::new(),
            max_message_bytes: MAX_MESSAGE_BYTES,
            poll_interval: Duration::from_millis(20),
            handshake_timeout: Duration::from_millis(5_000),
            write_timeout: Duration::from_millis(5_000),
            announce_peers: false,
            tls: None,
        }
    }
}

impl RelayConfig {
    /// Reads `[Relay]` and `[TLS]`; missing keys keep their defaults.
    pub fn from_config(cfg: &Config) -> Result<Self, ConfigError> {
        let mut out = Self::default();

        if let Some(host) = cfg.get_non_empty(SECTION, "host") {
            out.host = host.to_string();
        }
        if let Some(port) = cfg.get_parsed::<u16>(SECTION, "port")? {
            out.port = port;
        }
        if let Some(origins) = cfg.get_list(SECTION, "allowed_origins") {
            out.allowed_origins = origins;
        }
        if let Some(protocols) = cfg.get_list(SECTION, "subprotocols") {
            out.subprotocols = protocols;
        }
        if let Some(max) = cfg.get_parsed::<usize>(SECTION, "max_message_bytes")? {
            out.max_message_bytes = max;
        }
        if let Some(ms) = cfg.get_parsed::<u64>(SECTION, "poll_interval_ms")? {
            out.poll_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = cfg.get_parsed::<u64>(SECTION, "handshake_timeout_ms")? {
            out.handshake_timeout = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = cfg.get_parsed::<u64>(SECTION, "write_timeout_ms")? {
            out.write_timeout = Duration::from_millis(ms.max(1));
        }
        if let Some(announce) = cfg.get_bool(SECTION, "announce_peers")? {
            out.announce_peers = announce;
        }

        if cfg.get_bool("TLS", "enabled")?.unwrap_or(false) {
            out.tls = Some(TlsSettings {
                cert_path: PathBuf::from(cfg.get_non_empty_or_default(
                    "TLS",
                    "cert",
                    "certs/relay/cert.pem",
                )),
                key_path: PathBuf::from(cfg.get_non_empty_or_default(
                    "TLS",
                    "key",
                    "certs/relay/key.pem",
                )),
            });
        }

        Ok(out)
    }

    /// Applies `RELAY_HOST`, `RELAY_PORT` (falling back to `PORT`) and
    /// `RELAY_ALLOWED_ORIGINS` from `lookup`.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("RELAY_HOST").filter(|h| !h.is_empty()) {
            self.host = host;
        }
        let port_var = ["RELAY_PORT", "PORT"]
            .into_iter()
            .find_map(|name| lookup(name).filter(|v| !v.is_empty()).map(|v| (name, v)));
        if let Some((name, raw)) = port_var {
            self.port = raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                section: "env".to_string(),
                key: name.to_string(),
                value: raw.clone(),
                reason: format!("{e}"),
            })?;
        }
        if let Some(origins) = lookup("RELAY_ALLOWED_ORIGINS") {
            self.allowed_origins = split_list(&origins);
        }
        Ok(self)
    }

    /// `from_config` followed by overrides from the process environment.
    pub fn from_config_and_env(cfg: &Config) -> Result<Self, ConfigError> {
        Self::from_config(cfg)?.with_env_overrides(|name| std::env::var(name).ok())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn handshake_policy(&self) -> HandshakePolicy {
        HandshakePolicy::new(self.allowed_origins.clone(), self.subprotocols.clone())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_when_config_is_empty() {
        let rc = RelayConfig::from_config(&Config::empty()).unwrap();
        assert_eq!(rc.bind_addr(), "0.0.0.0:5000");
        assert_eq!(rc.allowed_origins, vec!["*"]);
        assert!(rc.subprotocols.is_empty());
        assert_eq!(rc.max_message_bytes, MAX_MESSAGE_BYTES);
        assert!(!rc.announce_peers);
        assert!(rc.tls.is_none());
    }

    #[test]
    fn reads_relay_and_tls_sections() {
        let cfg = Config::parse(
            "[Relay]\nhost = 127.0.0.1\nport = 7001\nallowed_origins = https://x.example\n\
             subprotocols = signal.v1\nmax_message_bytes = 4096\npoll_interval_ms = 5\n\
             announce_peers = true\n[TLS]\nenabled = true\ncert = c.pem\n",
        );
        let rc = RelayConfig::from_config(&cfg).unwrap();
        assert_eq!(rc.bind_addr(), "127.0.0.1:7001");
        assert_eq!(rc.allowed_origins, vec!["https://x.example"]);
        assert_eq!(rc.subprotocols, vec!["signal.v1"]);
        assert_eq!(rc.max_message_bytes, 4096);
        assert_eq!(rc.poll_interval, Duration::from_millis(5));
        assert!(rc.announce_peers);
        let tls = rc.tls.unwrap();
        assert_eq!(tls.cert_path, PathBuf::from("c.pem"));
        assert_eq!(tls.key_path, PathBuf::from("certs/relay/key.pem"));
    }

    #[test]
    fn bad_port_is_a_config_error() {
        let cfg = Config::parse("[Relay]\nport = 99999\n");
        assert!(RelayConfig::from_config(&cfg).is_err());
    }

    #[test]
    fn env_overrides_take_precedence() {
        let env: HashMap<&str, &str> = [
            ("PORT", "8080"),
            ("RELAY_ALLOWED_ORIGINS", "https://a.example,https://b.example"),
        ]
        .into_iter()
        .collect();
        let rc = RelayConfig::default()
            .with_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(rc.port, 8080);
        assert_eq!(rc.allowed_origins.len(), 2);

        let env: HashMap<&str, &str> = [("PORT", "8080"), ("RELAY_PORT", "9090")]
            .into_iter()
            .collect();
        let rc = RelayConfig::default()
            .with_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(rc.port, 9090);

        let err = RelayConfig::default()
            .with_env_overrides(|k| (k == "RELAY_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("RELAY_PORT"));
    }
}
