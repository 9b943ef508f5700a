use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::mpsc::Sender;
use std::time::SystemTime;

use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::signaling::protocol::{ServerMsg, SessionId};

/// Length of the random part of a session id.
const SESSION_ID_RANDOM_LEN: usize = 16;

/// The session and client event a relayed message was produced from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub from: SessionId,
    pub event: &'static str,
}

/// A message queued on a session's outbox.
///
/// Relayed messages remember their origin so that a message the connection
/// thread could not write can be reported back to whoever sent it.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub msg: ServerMsg,
    pub origin: Option<Origin>,
}

impl Outbound {
    /// Generated by the relay itself; nobody is told if it is lost.
    pub fn system(msg: ServerMsg) -> Self {
        Self { msg, origin: None }
    }

    pub fn relayed(msg: ServerMsg, from: &str, event: &'static str) -> Self {
        Self {
            msg,
            origin: Some(Origin {
                from: from.to_owned(),
                event,
            }),
        }
    }
}

impl From<ServerMsg> for Outbound {
    fn from(msg: ServerMsg) -> Self {
        Self::system(msg)
    }
}

/// One connected client.
#[derive(Debug)]
pub struct Session {
    pub session_id: SessionId,
    pub connected_at: SystemTime,
    pub peer_addr: Option<SocketAddr>,
    outbox: Sender<Outbound>,
}

impl Session {
    pub fn new(session_id: SessionId, peer_addr: Option<SocketAddr>, outbox: Sender<Outbound>) -> Self {
        Self {
            session_id,
            connected_at: SystemTime::now(),
            peer_addr,
            outbox,
        }
    }
}

/// Result of handing a message to a session's outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Delivered,
    /// Not connected, or its outbox was closed (the entry is evicted).
    TargetUnreachable,
}

/// Session table: session id -> connection outbox.
#[derive(Debug, Default)]
pub struct Sessions {
    by_id: HashMap<SessionId, Session>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a session; returns false (and keeps the existing entry) on a duplicate id.
    pub fn insert(&mut self, session: Session) -> bool {
        if self.by_id.contains_key(&session.session_id) {
            return false;
        }
        self.by_id.insert(session.session_id.clone(), session);
        true
    }

    pub fn remove(&mut self, session_id: &str) -> Option<Session> {
        self.by_id.remove(session_id)
    }

    pub fn get(&self, session_id: &str) -> Option<&Session> {
        self.by_id.get(session_id)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.by_id.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Every connected id except `session_id`, sorted.
    pub fn ids_except(&self, session_id: &str) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self
            .by_id
            .keys()
            .filter(|id| id.as_str() != session_id)
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn all_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.by_id.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Hands `out` to the target's outbox without blocking.
    ///
    /// A closed outbox means the connection thread is gone; the stale entry is
    /// removed and the target is reported unreachable.
    pub fn route(&mut self, target: &str, out: impl Into<Outbound>) -> RouteOutcome {
        let Some(session) = self.by_id.get(target) else {
            return RouteOutcome::TargetUnreachable;
        };
        if session.outbox.send(out.into()).is_ok() {
            RouteOutcome::Delivered
        } else {
            self.by_id.remove(target);
            RouteOutcome::TargetUnreachable
        }
    }
}

/// Allocates session ids: random alphanumerics plus a per-generator counter,
/// so an id is never handed out twice.
#[derive(Debug, Default)]
pub struct SessionIdGen {
    next: u64,
}

impl SessionIdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> SessionId {
        let random: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SESSION_ID_RANDOM_LEN)
            .map(char::from)
            .collect();
        let id = format!("{random}-{:x}", self.next);
        self.next = self.next.wrapping_add(1);
        id
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use std::collections::HashSet;
    use std::sync::mpsc;

    fn session(id: &str) -> (Session, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel();
        (Session::new(id.into(), None, tx), rx)
    }

    #[test]
    fn route_delivers_to_connected_target_only() {
        let mut sessions = Sessions::new();
        let (a, a_rx) = session("a1");
        let (b, b_rx) = session("b1");
        assert!(sessions.insert(a));
        assert!(sessions.insert(b));

        let outcome = sessions.route("b1", ServerMsg::CallEnded {});
        assert_eq!(outcome, RouteOutcome::Delivered);
        assert_eq!(b_rx.try_recv().unwrap(), Outbound::system(ServerMsg::CallEnded {}));
        assert!(a_rx.try_recv().is_err());

        assert_eq!(
            sessions.route("nobody", ServerMsg::CallEnded {}),
            RouteOutcome::TargetUnreachable
        );
        assert!(a_rx.try_recv().is_err());
        assert!(b_rx.try_recv().is_err());
    }

    #[test]
    fn closed_outbox_evicts_stale_entry() {
        let mut sessions = Sessions::new();
        let (a, a_rx) = session("a1");
        sessions.insert(a);
        drop(a_rx);

        assert_eq!(
            sessions.route("a1", ServerMsg::CallEnded {}),
            RouteOutcome::TargetUnreachable
        );
        assert!(!sessions.contains("a1"));
        assert!(sessions.is_empty());
    }

    #[test]
    fn relayed_messages_keep_their_origin() {
        let mut sessions = Sessions::new();
        let (b, b_rx) = session("b1");
        sessions.insert(b);

        let out = Outbound::relayed(ServerMsg::CallEnded {}, "a1", "end-call");
        assert_eq!(sessions.route("b1", out), RouteOutcome::Delivered);
        let got = b_rx.try_recv().unwrap();
        assert_eq!(got.msg, ServerMsg::CallEnded {});
        assert_eq!(
            got.origin,
            Some(Origin {
                from: "a1".into(),
                event: "end-call",
            })
        );
    }

    #[test]
    fn get_exposes_connection_details() {
        let mut sessions = Sessions::new();
        let addr: SocketAddr = "10.0.0.7:40000".parse().unwrap();
        let (tx, _rx) = mpsc::channel();
        sessions.insert(Session::new("a1".into(), Some(addr), tx));

        let session = sessions.get("a1").unwrap();
        assert_eq!(session.session_id, "a1");
        assert_eq!(session.peer_addr, Some(addr));
        assert!(session.connected_at <= SystemTime::now());
        assert!(sessions.get("b1").is_none());
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut sessions = Sessions::new();
        let (a, _a_rx) = session("a1");
        let (dup, _dup_rx) = session("a1");
        assert!(sessions.insert(a));
        assert!(!sessions.insert(dup));
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn ids_except_excludes_requester() {
        let mut sessions = Sessions::new();
        let mut keep = Vec::new();
        for id in ["c1", "a1", "b1"] {
            let (s, rx) = session(id);
            sessions.insert(s);
            keep.push(rx);
        }
        assert_eq!(sessions.ids_except("a1"), vec!["b1", "c1"]);
        assert_eq!(sessions.all_ids(), vec!["a1", "b1", "c1"]);
    }

    #[test]
    fn generated_ids_are_unique() {
        let mut ids = SessionIdGen::new();
        let seen: HashSet<SessionId> = (0..10_000).map(|_| ids.next_id()).collect();
        assert_eq!(seen.len(), 10_000);
        let first = SessionIdGen::new().next_id();
        assert!(first.ends_with("-0"));
        assert_eq!(first.len(), SESSION_ID_RANDOM_LEN + 2);
    }
}
