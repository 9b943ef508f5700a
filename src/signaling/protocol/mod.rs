//! Wire protocol spoken over the relay's WebSocket.
//!
//! Every text frame carries one JSON envelope:
//!
//! ```text
//! {"event": "<kebab-case name>", "data": { camelCase fields }}
//! ```
//!
//! `data` is omitted for events without fields (`discover-peers`). Signaling
//! payloads (`offerPayload`, `answerPayload`, `candidate`) are opaque JSON
//! values that the relay forwards untouched.
pub mod codec;
pub mod constants;
pub mod errors;
pub mod msg;

pub use codec::{decode_client_msg, decode_server_msg, encode_client_msg, encode_server_msg};
pub use constants::*;
pub use errors::ProtoError;
pub use msg::{ClientMsg, ServerMsg};

/// Relay-assigned session identifier; doubles as the routing address.
pub type SessionId = String;
