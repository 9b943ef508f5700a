use std::sync::Arc;
use std::sync::mpsc::Receiver;

use crate::log::LogSink;
use crate::signaling::server_engine::RelayEngine;
use crate::signaling::server_event::ServerEvent;
use crate::{sink_debug, sink_info};

/// Central server loop: the only owner of the engine and its session table.
///
/// Runs until a `Shutdown` event arrives or every event sender is gone.
/// Dropping the engine on exit closes every outbox, which tells each
/// connection thread to send a close frame and finish.
pub fn run_server_loop(mut engine: RelayEngine, log: Arc<dyn LogSink>, rx: Receiver<ServerEvent>) {
    use ServerEvent::*;

    while let Ok(ev) = rx.recv() {
        match ev {
            RegisterClient {
                session_id,
                peer_addr,
                to_client,
            } => {
                engine.register(session_id, peer_addr, to_client);
            }

            MsgFromClient { session_id, msg } => {
                sink_debug!(log, "{} from session {}", msg.event_name(), session_id);
                engine.handle(&session_id, msg);
            }

            Malformed { session_id, error } => {
                engine.handle_malformed(&session_id, &error);
            }

            Disconnected { session_id } => {
                engine.unregister(&session_id);
            }

            Undeliverable { session_id, out } => {
                engine.handle_undeliverable(&session_id, out);
            }

            Shutdown => {
                sink_info!(log, "shutdown requested; server loop stopping");
                break;
            }
        }
    }

    sink_info!(
        log,
        "server loop finished; closing {} sessions",
        engine.sessions().len()
    );
}
