use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rustls::ServerConfig;

use crate::log::LogSink;
use crate::signaling::errors::RelayError;
use crate::signaling::relay_config::RelayConfig;
use crate::signaling::runtime::run_server_loop;
use crate::signaling::server_engine::RelayEngine;
use crate::signaling::server_event::ServerEvent;
use crate::signaling::sessions::{SessionIdGen, Sessions};
use crate::signaling::tls::build_relay_server_config;
use crate::signaling::transport::{ConnectionSettings, RelayStream, spawn_connection_thread};
use crate::{sink_debug, sink_info, sink_warn};

/// Sleep between accept attempts when no connection is pending.
const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// Cloneable flag that asks a running `SignalingServer` to stop.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Top-level runtime object for the relay.
///
/// This owns:
/// - the bound listening socket
/// - the TLS server config, if `wss://` is enabled
/// - the logging sink
///
/// and knows how to spin up the central server loop plus one thread per
/// accepted connection.
pub struct SignalingServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: RelayConfig,
    tls: Option<Arc<ServerConfig>>,
    log: Arc<dyn LogSink>,
    shutdown: ShutdownHandle,
}

impl SignalingServer {
    /// Loads TLS material and binds the listener. These are the only fatal
    /// failures; everything after a successful bind is per-connection.
    pub fn bind(config: RelayConfig, log: Arc<dyn LogSink>) -> Result<Self, RelayError> {
        let tls = config
            .tls
            .as_ref()
            .map(build_relay_server_config)
            .transpose()
            .map_err(RelayError::Tls)?;

        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr).map_err(|source| RelayError::Bind {
            addr: addr.clone(),
            source,
        })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        sink_info!(
            log,
            "relay listening on {} ({})",
            local_addr,
            if tls.is_some() { "wss" } else { "ws" }
        );

        Ok(Self {
            listener,
            local_addr,
            config,
            tls,
            log,
            shutdown: ShutdownHandle::default(),
        })
    }

    /// Actual bound address; differs from the configured one for port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Blocking main loop: spawn the central server loop, accept clients
    /// until shutdown is requested, then stop everything and wait for it.
    pub fn run(self) -> Result<(), RelayError> {
        let Self {
            listener,
            local_addr,
            config,
            tls,
            log,
            shutdown,
        } = self;

        // Events from all connections → central server loop
        let (server_tx, server_rx) = mpsc::channel::<ServerEvent>();

        let loop_handle = {
            let engine =
                RelayEngine::with_sessions(Sessions::new(), config.announce_peers, log.clone());
            let log_for_loop = log.clone();
            thread::Builder::new()
                .name("relay-loop".into())
                .spawn(move || {
                    sink_info!(log_for_loop, "server loop started");
                    run_server_loop(engine, log_for_loop, server_rx);
                })?
        };

        let settings = Arc::new(ConnectionSettings::from_relay_config(&config));
        let mut ids = SessionIdGen::new();
        let mut conn_threads: Vec<JoinHandle<()>> = Vec::new();

        while !shutdown.is_requested() {
            match listener.accept() {
                Ok((tcp, peer_addr)) => {
                    // Accepted sockets inherit non-blocking mode on some platforms.
                    if let Err(e) = tcp.set_nonblocking(false) {
                        sink_warn!(log, "dropping connection from {}: {}", peer_addr, e);
                        continue;
                    }
                    let stream = match RelayStream::new(tcp, tls.as_ref()) {
                        Ok(s) => s,
                        Err(e) => {
                            sink_warn!(log, "dropping connection from {}: {}", peer_addr, e);
                            continue;
                        }
                    };

                    let session_id = ids.next_id();
                    sink_info!(
                        log,
                        "accepted TCP connection from {} as session {}",
                        peer_addr,
                        session_id
                    );

                    match spawn_connection_thread(
                        session_id.clone(),
                        stream,
                        peer_addr,
                        server_tx.clone(),
                        settings.clone(),
                        log.clone(),
                    ) {
                        Ok(handle) => conn_threads.push(handle),
                        Err(e) => sink_warn!(
                            log,
                            "failed to spawn connection thread for session {}: {}",
                            session_id,
                            e
                        ),
                    }
                    conn_threads.retain(|h| !h.is_finished());
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) => {
                    sink_warn!(log, "incoming TCP accept failed: {} (continuing to accept)", e);
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }

        sink_info!(log, "shutdown requested; closing listener on {}", local_addr);
        drop(listener);

        // Queued behind every in-flight event, so pending routes still complete.
        let _ = server_tx.send(ServerEvent::Shutdown);
        drop(server_tx);
        let loop_result = loop_handle.join();

        sink_debug!(log, "waiting for {} connection threads", conn_threads.len());
        for handle in conn_threads {
            let _ = handle.join();
        }

        loop_result.map_err(|_| RelayError::LoopPanicked)?;
        sink_info!(log, "relay stopped");
        Ok(())
    }
}
