/// Largest accepted inbound message (and frame), in bytes.
pub const MAX_MESSAGE_BYTES: usize = 1_048_576; // 1 MiB

/// Event names a client may send.
pub const CLIENT_EVENTS: &[&str] = &[
    EV_INITIATE_CALL,
    EV_ANSWER_CALL,
    EV_END_CALL,
    EV_DISCOVER_PEERS,
    EV_SEND_CANDIDATE,
];

pub const EV_INITIATE_CALL: &str = "initiate-call";
pub const EV_ANSWER_CALL: &str = "answer-call";
pub const EV_END_CALL: &str = "end-call";
pub const EV_DISCOVER_PEERS: &str = "discover-peers";
pub const EV_SEND_CANDIDATE: &str = "send-candidate";
