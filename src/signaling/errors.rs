use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::ConfigError;

/// Codes carried by the `error` event sent back to a client.
#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    MalformedMessage = 1,
    UnknownEvent = 2,
    UnsupportedFrame = 3,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Fatal startup errors. Nothing after a successful bind is fatal.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("TLS setup failed: {0}")]
    Tls(#[source] io::Error),
    #[error("listener error: {0}")]
    Listener(#[from] io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("server loop thread panicked")]
    LoopPanicked,
}

/// Error that ends a single connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("handshake with {peer} failed: {reason}")]
    Handshake { peer: SocketAddr, reason: String },
    #[error("encoding outbound message failed: {0}")]
    Encode(#[from] serde_json::Error),
}
