pub mod errors;
pub mod handshake;
pub mod protocol;
pub mod relay_config;
pub mod run;
pub mod runtime;
pub mod server_engine;
pub mod server_event;
pub mod sessions;
pub mod signaling_server;
pub mod tls;
pub mod transport;

pub use errors::{ErrorCode, RelayError, TransportError};
pub use relay_config::{RelayConfig, TlsSettings};
pub use signaling_server::{ShutdownHandle, SignalingServer};
