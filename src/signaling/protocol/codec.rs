use serde_json::Value;

use super::{CLIENT_EVENTS, ClientMsg, EV_DISCOVER_PEERS, ProtoError, ServerMsg};

// ---- Decode ---------------------------------------------------------------

/// Parses one client text frame.
///
/// The envelope is inspected before the typed decode so an unknown event and
/// a known event with bad fields map to different error codes.
pub fn decode_client_msg(text: &str) -> Result<ClientMsg, ProtoError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtoError::InvalidJson(e.to_string()))?;

    let event = value
        .get("event")
        .and_then(Value::as_str)
        .ok_or(ProtoError::MissingEvent)?
        .to_owned();

    if !CLIENT_EVENTS.contains(&event.as_str()) {
        return Err(ProtoError::UnknownEvent(event));
    }

    // Carries no fields; whatever `data` a client attaches is ignored.
    if event == EV_DISCOVER_PEERS {
        return Ok(ClientMsg::DiscoverPeers);
    }

    serde_json::from_value(value).map_err(|e| ProtoError::InvalidFields {
        event,
        reason: e.to_string(),
    })
}

/// Parses a relay frame; used by clients and tests.
pub fn decode_server_msg(text: &str) -> Result<ServerMsg, serde_json::Error> {
    serde_json::from_str(text)
}

// ---- Encode ---------------------------------------------------------------

pub fn encode_server_msg(msg: &ServerMsg) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

pub fn encode_client_msg(msg: &ClientMsg) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::signaling::errors::ErrorCode;
    use serde_json::json;

    #[test]
    fn decodes_initiate_call_with_opaque_payload() {
        let text = r#"{"event":"initiate-call","data":{"targetId":"b1","offerPayload":{"sdp":"OFFER_X","nested":[1,{"k":null}]},"fromId":"a1"}}"#;
        let msg = decode_client_msg(text).unwrap();
        assert_eq!(
            msg,
            ClientMsg::InitiateCall {
                target_id: "b1".into(),
                offer_payload: json!({"sdp": "OFFER_X", "nested": [1, {"k": null}]}),
                from_id: Some("a1".into()),
            }
        );
        assert_eq!(msg.event_name(), "initiate-call");
    }

    #[test]
    fn from_id_is_optional() {
        let text = r#"{"event":"initiate-call","data":{"targetId":"b1","offerPayload":"v=0"}}"#;
        match decode_client_msg(text).unwrap() {
            ClientMsg::InitiateCall { from_id, .. } => assert_eq!(from_id, None),
            other => panic!("expected InitiateCall, got {other:?}"),
        }
    }

    #[test]
    fn discover_peers_needs_no_data() {
        assert_eq!(
            decode_client_msg(r#"{"event":"discover-peers"}"#).unwrap(),
            ClientMsg::DiscoverPeers
        );
    }

    #[test]
    fn discover_peers_ignores_any_data() {
        for text in [
            r#"{"event":"discover-peers","data":{}}"#,
            r#"{"event":"discover-peers","data":null}"#,
            r#"{"event":"discover-peers","data":{"room":"lobby"}}"#,
            r#"{"event":"discover-peers","data":[1,2]}"#,
        ] {
            assert_eq!(decode_client_msg(text).unwrap(), ClientMsg::DiscoverPeers, "{text}");
        }
    }

    #[test]
    fn encoded_client_frames_decode_back() {
        let msg = ClientMsg::SendCandidate {
            target_id: "b1".into(),
            candidate: json!({"candidate": "candidate:1 1 udp 1 10.0.0.2 5000 typ host"}),
        };
        let text = encode_client_msg(&msg).unwrap();
        assert!(text.contains("\"targetId\":\"b1\""), "{text}");
        assert_eq!(decode_client_msg(&text).unwrap(), msg);

        // No spoofed sender is emitted when none was set.
        let text = encode_client_msg(&ClientMsg::InitiateCall {
            target_id: "b1".into(),
            offer_payload: json!("v=0"),
            from_id: None,
        })
        .unwrap();
        assert!(!text.contains("fromId"), "{text}");

        let text = encode_client_msg(&ClientMsg::DiscoverPeers).unwrap();
        assert_eq!(decode_client_msg(&text).unwrap(), ClientMsg::DiscoverPeers);
    }

    #[test]
    fn missing_target_id_is_invalid_fields() {
        let err = decode_client_msg(r#"{"event":"end-call","data":{}}"#).unwrap_err();
        match &err {
            ProtoError::InvalidFields { event, reason } => {
                assert_eq!(event, "end-call");
                assert!(reason.contains("targetId"), "reason: {reason}");
            }
            other => panic!("expected InvalidFields, got {other:?}"),
        }
        assert_eq!(err.code(), ErrorCode::MalformedMessage);
    }

    #[test]
    fn missing_payload_is_invalid_fields() {
        let err =
            decode_client_msg(r#"{"event":"answer-call","data":{"targetId":"a1"}}"#).unwrap_err();
        assert!(matches!(err, ProtoError::InvalidFields { .. }));
    }

    #[test]
    fn unknown_and_missing_events() {
        let err = decode_client_msg(r#"{"event":"join-room","data":{}}"#).unwrap_err();
        assert_eq!(err, ProtoError::UnknownEvent("join-room".into()));
        assert_eq!(err.code(), ErrorCode::UnknownEvent);

        // Server-only events are not accepted from clients either.
        let err = decode_client_msg(r#"{"event":"offer-received","data":{}}"#).unwrap_err();
        assert!(matches!(err, ProtoError::UnknownEvent(_)));

        assert_eq!(
            decode_client_msg(r#"{"data":{"targetId":"x"}}"#).unwrap_err(),
            ProtoError::MissingEvent
        );
        assert_eq!(decode_client_msg("[1,2]").unwrap_err(), ProtoError::MissingEvent);
    }

    #[test]
    fn invalid_json_is_reported() {
        let err = decode_client_msg("{not json").unwrap_err();
        assert!(matches!(err, ProtoError::InvalidJson(_)));
        assert_eq!(err.code(), ErrorCode::MalformedMessage);
    }

    #[test]
    fn server_messages_use_event_data_envelope() {
        let text = encode_server_msg(&ServerMsg::ConnectionEstablished {
            session_id: "a1".into(),
        })
        .unwrap();
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            v,
            json!({"event": "connection-established", "data": {"sessionId": "a1"}})
        );

        let v: Value =
            serde_json::from_str(&encode_server_msg(&ServerMsg::CallEnded {}).unwrap()).unwrap();
        assert_eq!(v, json!({"event": "call-ended", "data": {}}));

        let v: Value = serde_json::from_str(
            &encode_server_msg(&ServerMsg::TargetUnreachable {
                target_id: "zz".into(),
                event: "end-call".into(),
            })
            .unwrap(),
        )
        .unwrap();
        assert_eq!(
            v,
            json!({"event": "target-unreachable", "data": {"targetId": "zz", "event": "end-call"}})
        );
    }

    #[test]
    fn server_frames_decode_back() {
        let msg = ServerMsg::PeerList {
            session_ids: vec!["b1".into(), "c1".into()],
        };
        let text = encode_server_msg(&msg).unwrap();
        assert!(text.contains("\"sessionIds\""));
        assert_eq!(decode_server_msg(&text).unwrap(), msg);
    }
}
