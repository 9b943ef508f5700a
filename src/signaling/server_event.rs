use std::net::SocketAddr;
use std::sync::mpsc::Sender;

use crate::signaling::protocol::{ClientMsg, ProtoError, SessionId};
use crate::signaling::sessions::Outbound;

/// Events sent *to* the central server loop.
#[derive(Debug)]
pub enum ServerEvent {
    /// Handshake finished; the connection's outbox is ready.
    RegisterClient {
        session_id: SessionId,
        peer_addr: Option<SocketAddr>,
        to_client: Sender<Outbound>,
    },

    /// A client sent a well-formed message.
    MsgFromClient { session_id: SessionId, msg: ClientMsg },

    /// A client sent something that could not be decoded.
    Malformed {
        session_id: SessionId,
        error: ProtoError,
    },

    /// The transport closed or failed.
    Disconnected { session_id: SessionId },

    /// A queued message the connection thread could not write before closing.
    Undeliverable { session_id: SessionId, out: Outbound },

    /// Stop after everything queued before this event has been handled.
    Shutdown,
}
