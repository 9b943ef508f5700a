use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::mpsc::Sender;

use serde_json::Value;

use crate::log::{LogSink, NoopLogSink};
use crate::signaling::protocol::{
    ClientMsg, EV_ANSWER_CALL, EV_END_CALL, EV_INITIATE_CALL, EV_SEND_CANDIDATE, ProtoError,
    ServerMsg, SessionId,
};
use crate::signaling::sessions::{Outbound, RouteOutcome, Session, Sessions};
use crate::{sink_debug, sink_info, sink_trace, sink_warn};

/// Relay state machine: owns the session table and routes client messages.
///
/// The engine keeps no per-call state; every operation is a single lookup in
/// the session table followed by at most one outbox send (plus a negative
/// acknowledgement to the sender when the target is gone).
pub struct RelayEngine {
    sessions: Sessions,
    announce_peers: bool,
    log: Arc<dyn LogSink>,
}

impl RelayEngine {
    pub fn new() -> Self {
        Self::with_log(Arc::new(NoopLogSink))
    }

    pub fn with_log(log: Arc<dyn LogSink>) -> Self {
        Self::with_sessions(Sessions::new(), false, log)
    }

    /// Fully explicit constructor: injected session table, presence
    /// announcements on/off, custom logger.
    pub fn with_sessions(sessions: Sessions, announce_peers: bool, log: Arc<dyn LogSink>) -> Self {
        Self {
            sessions,
            announce_peers,
            log,
        }
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    /// CONNECTING -> CONNECTED: records the session and tells the client its id.
    pub fn register(
        &mut self,
        session_id: SessionId,
        peer_addr: Option<SocketAddr>,
        outbox: Sender<Outbound>,
    ) -> RouteOutcome {
        if !self
            .sessions
            .insert(Session::new(session_id.clone(), peer_addr, outbox))
        {
            sink_warn!(
                self.log,
                "refusing duplicate registration of session {}",
                session_id
            );
            return RouteOutcome::TargetUnreachable;
        }

        sink_info!(
            self.log,
            "session {} connected from {:?} (now {} sessions)",
            session_id,
            peer_addr,
            self.sessions.len()
        );

        let outcome = self.sessions.route(
            &session_id,
            ServerMsg::ConnectionEstablished {
                session_id: session_id.clone(),
            },
        );
        if outcome == RouteOutcome::Delivered && self.announce_peers {
            self.broadcast_peer_list();
        }
        outcome
    }

    /// CONNECTED -> DISCONNECTED. Returns whether the session was still registered.
    pub fn unregister(&mut self, session_id: &str) -> bool {
        let removed = self.sessions.remove(session_id);
        if let Some(session) = &removed {
            sink_info!(
                self.log,
                "session {} disconnected after {:?} (now {} sessions)",
                session_id,
                session.connected_at.elapsed().unwrap_or_default(),
                self.sessions.len()
            );
        } else {
            sink_debug!(
                self.log,
                "session {} disconnected after eviction",
                session_id
            );
        }
        if self.announce_peers {
            self.broadcast_peer_list();
        }
        removed.is_some()
    }

    /// Main entrypoint: handle a message from a connected session.
    pub fn handle(&mut self, from: &str, msg: ClientMsg) -> RouteOutcome {
        if !self.sessions.contains(from) {
            sink_warn!(
                self.log,
                "dropping {} from unregistered session {}",
                msg.event_name(),
                from
            );
            return RouteOutcome::TargetUnreachable;
        }

        sink_trace!(self.log, "session {} sent {}", from, msg.event_name());

        match msg {
            ClientMsg::InitiateCall {
                target_id,
                offer_payload,
                from_id,
            } => self.initiate_call(from, target_id, offer_payload, from_id),
            ClientMsg::AnswerCall {
                target_id,
                answer_payload,
            } => self.answer_call(from, target_id, answer_payload),
            ClientMsg::EndCall { target_id } => self.end_call(from, target_id),
            ClientMsg::DiscoverPeers => self.discover_peers(from),
            ClientMsg::SendCandidate {
                target_id,
                candidate,
            } => self.relay_candidate(from, target_id, candidate),
        }
    }

    /// Rejects a frame that could not be decoded; nothing is forwarded.
    pub fn handle_malformed(&mut self, from: &str, err: &ProtoError) -> RouteOutcome {
        sink_warn!(self.log, "malformed message from session {}: {}", from, err);
        self.sessions.route(
            from,
            ServerMsg::Error {
                code: err.code().as_u16(),
                reason: err.to_string(),
            },
        )
    }

    /// A connection thread gave back a message it never wrote to `target`.
    ///
    /// Relayed messages are answered with `target-unreachable` to their
    /// original sender; relay-generated ones are only logged. Returns whether
    /// the sender was notified.
    pub fn handle_undeliverable(&mut self, target: &str, out: Outbound) -> bool {
        let Some(origin) = out.origin else {
            sink_debug!(
                self.log,
                "dropped {} for closing session {}",
                out.msg.event_name(),
                target
            );
            return false;
        };
        sink_warn!(
            self.log,
            "{} from session {} was not delivered to closing session {}",
            origin.event,
            origin.from,
            target
        );
        let nack = ServerMsg::TargetUnreachable {
            target_id: target.to_owned(),
            event: origin.event.to_owned(),
        };
        self.sessions.route(&origin.from, nack) == RouteOutcome::Delivered
    }

    // ---- Individual handlers ---------------------------------------------

    fn initiate_call(
        &mut self,
        from: &str,
        target_id: SessionId,
        payload: Value,
        claimed_from: Option<SessionId>,
    ) -> RouteOutcome {
        if let Some(claimed) = claimed_from.filter(|c| c != from) {
            sink_warn!(
                self.log,
                "session {} claimed fromId={} in initiate-call; using transport identity",
                from,
                claimed
            );
        }
        let msg = ServerMsg::OfferReceived {
            from: from.to_owned(),
            payload,
        };
        self.forward(from, target_id, EV_INITIATE_CALL, msg)
    }

    fn answer_call(&mut self, from: &str, target_id: SessionId, payload: Value) -> RouteOutcome {
        self.forward(from, target_id, EV_ANSWER_CALL, ServerMsg::CallAccepted { payload })
    }

    fn end_call(&mut self, from: &str, target_id: SessionId) -> RouteOutcome {
        self.forward(from, target_id, EV_END_CALL, ServerMsg::CallEnded {})
    }

    fn relay_candidate(&mut self, from: &str, target_id: SessionId, candidate: Value) -> RouteOutcome {
        let msg = ServerMsg::CandidateReceived {
            from: from.to_owned(),
            candidate,
        };
        self.forward(from, target_id, EV_SEND_CANDIDATE, msg)
    }

    fn discover_peers(&mut self, from: &str) -> RouteOutcome {
        let session_ids = self.sessions.ids_except(from);
        sink_debug!(
            self.log,
            "session {} requested peer list ({} peers)",
            from,
            session_ids.len()
        );
        self.sessions.route(from, ServerMsg::PeerList { session_ids })
    }

    /// Routes `msg` to `target_id`; on failure the sender gets a
    /// `target-unreachable` naming the event that could not be delivered.
    fn forward(
        &mut self,
        from: &str,
        target_id: SessionId,
        event: &'static str,
        msg: ServerMsg,
    ) -> RouteOutcome {
        match self
            .sessions
            .route(&target_id, Outbound::relayed(msg, from, event))
        {
            RouteOutcome::Delivered => {
                sink_debug!(
                    self.log,
                    "forwarded {} from session {} to session {}",
                    event,
                    from,
                    target_id
                );
                RouteOutcome::Delivered
            }
            RouteOutcome::TargetUnreachable => {
                sink_warn!(
                    self.log,
                    "session {} sent {} to unreachable session {}",
                    from,
                    event,
                    target_id
                );
                let _ = self.sessions.route(
                    from,
                    ServerMsg::TargetUnreachable {
                        target_id,
                        event: event.to_owned(),
                    },
                );
                RouteOutcome::TargetUnreachable
            }
        }
    }

    /// Pushes a fresh `peer-list` to every session, each excluding itself.
    fn broadcast_peer_list(&mut self) {
        for session_id in self.sessions.all_ids() {
            let session_ids = self.sessions.ids_except(&session_id);
            let _ = self
                .sessions
                .route(&session_id, ServerMsg::PeerList { session_ids });
        }
    }
}

impl Default for RelayEngine {
    fn default() -> Self {
        Self::new()
    }
}
