use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rustls::{ServerConfig, ServerConnection, StreamOwned};
use tungstenite::error::CapacityError;
use tungstenite::handshake::HandshakeError;
use tungstenite::handshake::server::{Request, Response};
use tungstenite::protocol::frame::CloseFrame;
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::protocol::WebSocketConfig;
use tungstenite::{Message, WebSocket, accept_hdr_with_config};

use crate::log::LogSink;
use crate::signaling::errors::TransportError;
use crate::signaling::handshake::HandshakePolicy;
use crate::signaling::protocol::{
    ClientMsg, ProtoError, ServerMsg, SessionId, decode_client_msg, encode_server_msg,
};
use crate::signaling::relay_config::RelayConfig;
use crate::signaling::server_event::ServerEvent;
use crate::signaling::sessions::Outbound;
use crate::{sink_debug, sink_info, sink_warn};

/// Reads attempted while waiting for the peer's close reply.
const CLOSE_DRAIN_POLLS: usize = 50;

/// Accepted socket, plain or wrapped in a server-side TLS session.
pub enum RelayStream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ServerConnection, TcpStream>>),
}

impl RelayStream {
    /// Wraps `tcp` in TLS when a server config is present. The TLS handshake
    /// itself runs lazily on the first read or write.
    pub fn new(tcp: TcpStream, tls: Option<&Arc<ServerConfig>>) -> io::Result<Self> {
        match tls {
            None => Ok(Self::Plain(tcp)),
            Some(cfg) => {
                let conn = ServerConnection::new(cfg.clone())
                    .map_err(|e| io::Error::other(format!("TLS session setup failed: {e}")))?;
                Ok(Self::Tls(Box::new(StreamOwned::new(conn, tcp))))
            }
        }
    }

    pub fn tcp(&self) -> &TcpStream {
        match self {
            Self::Plain(s) => s,
            Self::Tls(s) => &s.sock,
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl Read for RelayStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(s) => s.read(buf),
            Self::Tls(s) => s.read(buf),
        }
    }
}

impl Write for RelayStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(s) => s.write(buf),
            Self::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(s) => s.flush(),
            Self::Tls(s) => s.flush(),
        }
    }
}

/// Per-connection settings shared by every connection thread.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub policy: HandshakePolicy,
    pub max_message_bytes: usize,
    pub poll_interval: Duration,
    pub handshake_timeout: Duration,
    pub write_timeout: Duration,
}

impl ConnectionSettings {
    pub fn from_relay_config(cfg: &RelayConfig) -> Self {
        Self {
            policy: cfg.handshake_policy(),
            max_message_bytes: cfg.max_message_bytes,
            poll_interval: cfg.poll_interval,
            handshake_timeout: cfg.handshake_timeout,
            write_timeout: cfg.write_timeout,
        }
    }

    fn ws_config(&self) -> WebSocketConfig {
        let mut cfg = WebSocketConfig::default();
        cfg.max_message_size = Some(self.max_message_bytes);
        cfg.max_frame_size = Some(self.max_message_bytes);
        cfg
    }
}

/// What one poll of the socket produced.
#[derive(Debug)]
pub enum Inbound {
    Msg(ClientMsg),
    Malformed(ProtoError),
    /// Frame over the size limit; the connection must be closed.
    TooLarge(ProtoError),
    /// Nothing arrived within the poll interval (or only control frames).
    Idle,
    Closed,
}

/// WebSocket that speaks in `ClientMsg` / `ServerMsg`.
pub struct Connection<S> {
    pub session_id: SessionId,
    ws: WebSocket<S>,
}

impl<S> Connection<S>
where
    S: Read + Write,
{
    pub fn new(session_id: SessionId, ws: WebSocket<S>) -> Self {
        Self { session_id, ws }
    }

    pub fn send(&mut self, msg: &ServerMsg) -> Result<(), TransportError> {
        let text = encode_server_msg(msg)?;
        self.ws.send(Message::Text(text))?;
        Ok(())
    }

    pub fn recv(&mut self) -> Result<Inbound, TransportError> {
        match self.ws.read() {
            Ok(Message::Text(text)) => Ok(match decode_client_msg(&text) {
                Ok(msg) => Inbound::Msg(msg),
                Err(e) => Inbound::Malformed(e),
            }),
            Ok(Message::Binary(_)) => Ok(Inbound::Malformed(ProtoError::BinaryFrame)),
            Ok(Message::Close(_)) => {
                // tungstenite queued the close reply; push it out.
                let _ = self.ws.flush();
                Ok(Inbound::Closed)
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => Ok(Inbound::Idle),
            Err(tungstenite::Error::Io(e)) if is_timeout(&e) => Ok(Inbound::Idle),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(Inbound::Closed)
            }
            Err(tungstenite::Error::Capacity(CapacityError::MessageTooLong { size, max_size })) => {
                Ok(Inbound::TooLarge(ProtoError::TooLarge {
                    max: max_size,
                    actual: size,
                }))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Starts the closing handshake and waits briefly for the peer's reply.
    pub fn close(&mut self, frame: Option<CloseFrame<'static>>) {
        if self.ws.close(frame).is_err() {
            return;
        }
        for _ in 0..CLOSE_DRAIN_POLLS {
            match self.ws.read() {
                Ok(_) => {}
                Err(tungstenite::Error::Io(e)) if is_timeout(&e) => {}
                Err(_) => break,
            }
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Runs the upgrade under `settings.policy`.
fn accept_websocket(
    stream: RelayStream,
    peer_addr: SocketAddr,
    settings: &ConnectionSettings,
) -> Result<WebSocket<RelayStream>, TransportError> {
    let mut outcome = None;
    let accepted = accept_hdr_with_config(
        stream,
        |req: &Request, resp: Response| settings.policy.apply(req, resp, &mut outcome),
        Some(settings.ws_config()),
    )
    .map_err(|e| match e {
        HandshakeError::Failure(err) => err.to_string(),
        HandshakeError::Interrupted(_) => "handshake timed out".to_string(),
    });

    accepted.map_err(|fallback| {
        let reason = match outcome {
            Some(Err(reject)) => reject.to_string(),
            _ => fallback,
        };
        TransportError::Handshake {
            peer: peer_addr,
            reason,
        }
    })
}

/// Spawns the thread that owns one client connection.
///
/// The thread performs the WebSocket handshake, registers the session with
/// the server loop, then alternates between draining the session's outbox
/// and polling the socket until either side goes away.
pub fn spawn_connection_thread(
    session_id: SessionId,
    stream: RelayStream,
    peer_addr: SocketAddr,
    server_tx: Sender<ServerEvent>,
    settings: Arc<ConnectionSettings>,
    log: Arc<dyn LogSink>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("relay-conn-{session_id}"))
        .spawn(move || {
            match serve_connection(&session_id, stream, peer_addr, &server_tx, &settings, &log) {
                Ok(()) => sink_info!(log, "session {} ({}) closed", session_id, peer_addr),
                Err(TransportError::Handshake { peer, reason }) => {
                    sink_warn!(log, "rejected connection from {}: {}", peer, reason)
                }
                Err(e) => sink_warn!(log, "session {} ({}) failed: {}", session_id, peer_addr, e),
            }
        })
}

fn serve_connection(
    session_id: &SessionId,
    stream: RelayStream,
    peer_addr: SocketAddr,
    server_tx: &Sender<ServerEvent>,
    settings: &ConnectionSettings,
    log: &Arc<dyn LogSink>,
) -> Result<(), TransportError> {
    stream.tcp().set_read_timeout(Some(settings.handshake_timeout))?;
    stream.tcp().set_write_timeout(Some(settings.write_timeout))?;

    let ws = accept_websocket(stream, peer_addr, settings)?;
    ws.get_ref().tcp().set_read_timeout(Some(settings.poll_interval))?;
    sink_debug!(
        log,
        "websocket upgrade done for {} (tls={})",
        peer_addr,
        ws.get_ref().is_tls()
    );

    let mut conn = Connection::new(session_id.clone(), ws);
    let (to_client_tx, to_client_rx) = mpsc::channel::<Outbound>();

    if server_tx
        .send(ServerEvent::RegisterClient {
            session_id: session_id.clone(),
            peer_addr: Some(peer_addr),
            to_client: to_client_tx,
        })
        .is_err()
    {
        conn.close(Some(going_away()));
        return Ok(());
    }

    let result = pump(&mut conn, &to_client_rx, server_tx, log);

    let _ = server_tx.send(ServerEvent::Disconnected {
        session_id: session_id.clone(),
    });
    return_unsent(session_id, &to_client_rx, server_tx);
    result
}

/// Hands every message still queued for this session back to the server loop.
///
/// Blocks until the loop drops the session's sender, which it does while
/// handling `Disconnected` (or on shutdown), so messages routed in between
/// are returned too.
fn return_unsent(session_id: &SessionId, outbox: &Receiver<Outbound>, server_tx: &Sender<ServerEvent>) {
    while let Ok(out) = outbox.recv() {
        let event = ServerEvent::Undeliverable {
            session_id: session_id.clone(),
            out,
        };
        if server_tx.send(event).is_err() {
            return;
        }
    }
}

/// Main per-connection loop.
fn pump<S: Read + Write>(
    conn: &mut Connection<S>,
    outbox: &Receiver<Outbound>,
    server_tx: &Sender<ServerEvent>,
    log: &Arc<dyn LogSink>,
) -> Result<(), TransportError> {
    loop {
        loop {
            match outbox.try_recv() {
                Ok(out) => {
                    if let Err(e) = conn.send(&out.msg) {
                        let _ = server_tx.send(ServerEvent::Undeliverable {
                            session_id: conn.session_id.clone(),
                            out,
                        });
                        return Err(e);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // Server loop dropped this session (shutdown or duplicate id).
                    conn.close(Some(going_away()));
                    return Ok(());
                }
            }
        }

        let event = match conn.recv()? {
            Inbound::Idle => continue,
            Inbound::Closed => return Ok(()),
            Inbound::Msg(msg) => ServerEvent::MsgFromClient {
                session_id: conn.session_id.clone(),
                msg,
            },
            Inbound::Malformed(error) => ServerEvent::Malformed {
                session_id: conn.session_id.clone(),
                error,
            },
            Inbound::TooLarge(error) => {
                sink_warn!(log, "session {}: {}", conn.session_id, error);
                let _ = conn.send(&ServerMsg::Error {
                    code: error.code().as_u16(),
                    reason: error.to_string(),
                });
                conn.close(Some(CloseFrame {
                    code: CloseCode::Size,
                    reason: "message too large".into(),
                }));
                return Ok(());
            }
        };

        if server_tx.send(event).is_err() {
            conn.close(Some(going_away()));
            return Ok(());
        }
    }
}

fn going_away() -> CloseFrame<'static> {
    CloseFrame {
        code: CloseCode::Away,
        reason: "relay shutting down".into(),
    }
}
