use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::signaling::protocol::SessionId;
use crate::signaling::protocol::constants::{
    EV_ANSWER_CALL, EV_DISCOVER_PEERS, EV_END_CALL, EV_INITIATE_CALL, EV_SEND_CANDIDATE,
};

/// Messages a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMsg {
    #[serde(rename_all = "camelCase")]
    InitiateCall {
        target_id: SessionId,
        offer_payload: Value,
        /// Ignored by the relay, which stamps the sender's own session id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_id: Option<SessionId>,
    },
    #[serde(rename_all = "camelCase")]
    AnswerCall {
        target_id: SessionId,
        answer_payload: Value,
    },
    #[serde(rename_all = "camelCase")]
    EndCall { target_id: SessionId },
    DiscoverPeers,
    #[serde(rename_all = "camelCase")]
    SendCandidate {
        target_id: SessionId,
        candidate: Value,
    },
}

impl ClientMsg {
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::InitiateCall { .. } => EV_INITIATE_CALL,
            Self::AnswerCall { .. } => EV_ANSWER_CALL,
            Self::EndCall { .. } => EV_END_CALL,
            Self::DiscoverPeers => EV_DISCOVER_PEERS,
            Self::SendCandidate { .. } => EV_SEND_CANDIDATE,
        }
    }
}

/// Messages the relay sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMsg {
    /// First message on every connection.
    #[serde(rename_all = "camelCase")]
    ConnectionEstablished { session_id: SessionId },
    OfferReceived { from: SessionId, payload: Value },
    CallAccepted { payload: Value },
    CallEnded {},
    #[serde(rename_all = "camelCase")]
    PeerList { session_ids: Vec<SessionId> },
    CandidateReceived { from: SessionId, candidate: Value },
    /// Negative acknowledgement: `target_id` is not connected.
    #[serde(rename_all = "camelCase")]
    TargetUnreachable { target_id: SessionId, event: String },
    Error { code: u16, reason: String },
}

impl ServerMsg {
    /// Short name for logs; payloads are never logged.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::ConnectionEstablished { .. } => "connection-established",
            Self::OfferReceived { .. } => "offer-received",
            Self::CallAccepted { .. } => "call-accepted",
            Self::CallEnded {} => "call-ended",
            Self::PeerList { .. } => "peer-list",
            Self::CandidateReceived { .. } => "candidate-received",
            Self::TargetUnreachable { .. } => "target-unreachable",
            Self::Error { .. } => "error",
        }
    }
}
