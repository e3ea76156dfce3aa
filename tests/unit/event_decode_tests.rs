//! Unit tests for decoding node stdout lines into `NodeEvent`s.
//!
//! Covers every known event type, required-field validation, unknown
//! types, and the non-JSON edge cases that must stay scoped to one line.

use serde_json::json;

use peer_bridge::node::event::{parse_event_line, LogLevel, NodeEvent, PeerId};
use peer_bridge::AppError;

fn decode(line: &str) -> NodeEvent {
    parse_event_line(line)
        .expect("line must decode")
        .expect("line must yield an event")
}

fn decode_err(line: &str) -> String {
    match parse_event_line(line) {
        Err(AppError::Decode(msg)) => msg,
        other => panic!("expected AppError::Decode, got {other:?}"),
    }
}

// ── Known event types ───────────────────────────────────────────────────────

#[test]
fn ready_event_carries_peer_id() {
    let event = decode(r#"{"type":"ready","peerId":"12D3KooWAbc"}"#);
    assert_eq!(
        event,
        NodeEvent::Ready {
            peer_id: PeerId::new("12D3KooWAbc")
        }
    );
}

#[test]
fn message_event_keeps_structured_payload() {
    let event = decode(r#"{"type":"message","from":"peer-b","data":{"price":42.5,"tags":["btc"]}}"#);
    assert_eq!(
        event,
        NodeEvent::Message {
            from: PeerId::new("peer-b"),
            data: json!({"price": 42.5, "tags": ["btc"]}),
        }
    );
}

#[test]
fn message_event_accepts_string_payload() {
    let event = decode(r#"{"type":"message","from":"peer-b","data":"hello"}"#);
    assert!(matches!(event, NodeEvent::Message { data, .. } if data == json!("hello")));
}

#[test]
fn error_event_carries_message() {
    let event = decode(r#"{"type":"error","message":"dial failed"}"#);
    assert_eq!(
        event,
        NodeEvent::Error {
            message: "dial failed".to_owned()
        }
    );
}

#[test]
fn log_event_with_meta() {
    let event = decode(
        r#"{"type":"log","level":"info","namespace":"libp2p","message":"listening","meta":{"addr":"/ip4/0.0.0.0"}}"#,
    );
    assert_eq!(
        event,
        NodeEvent::Log {
            level: LogLevel::Info,
            namespace: "libp2p".to_owned(),
            message: "listening".to_owned(),
            meta: Some(json!({"addr": "/ip4/0.0.0.0"})),
        }
    );
}

#[test]
fn log_level_is_case_insensitive() {
    let event = decode(r#"{"type":"log","level":"WARN","namespace":"dht","message":"slow"}"#);
    assert!(matches!(
        event,
        NodeEvent::Log {
            level: LogLevel::Warn,
            meta: None,
            ..
        }
    ));
}

#[test]
fn log_null_meta_is_absent() {
    let event = decode(r#"{"type":"log","level":"debug","namespace":"dht","message":"x","meta":null}"#);
    assert!(matches!(event, NodeEvent::Log { meta: None, .. }));
}

#[test]
fn peer_discovered_collects_topics() {
    let event = decode(r#"{"type":"peer_discovered","peerId":"peer-c","topics":["news","market-analysis","news"]}"#);
    let NodeEvent::PeerDiscovered { peer_id, topics } = event else {
        panic!("expected PeerDiscovered");
    };
    assert_eq!(peer_id.as_str(), "peer-c");
    assert_eq!(topics.len(), 2, "duplicate topics collapse");
    assert!(topics.contains("market-analysis"));
}

#[test]
fn peer_discovered_without_topics_is_empty_set() {
    let event = decode(r#"{"type":"peer_discovered","peerId":"peer-c"}"#);
    assert!(matches!(event, NodeEvent::PeerDiscovered { topics, .. } if topics.is_empty()));
}

#[test]
fn extra_fields_are_ignored() {
    let event = decode(r#"{"type":"ready","peerId":"p","version":"1.2.0","extra":[1,2]}"#);
    assert!(matches!(event, NodeEvent::Ready { .. }));
}

// ── Required fields ─────────────────────────────────────────────────────────

#[test]
fn ready_without_peer_id_is_rejected() {
    let msg = decode_err(r#"{"type":"ready"}"#);
    assert!(msg.contains("peerId"), "error must name the field: {msg}");
}

#[test]
fn ready_with_empty_peer_id_is_rejected() {
    decode_err(r#"{"type":"ready","peerId":""}"#);
}

#[test]
fn message_without_from_is_rejected() {
    let msg = decode_err(r#"{"type":"message","data":"x"}"#);
    assert!(msg.contains("from"), "error must name the field: {msg}");
}

#[test]
fn message_with_null_data_is_rejected() {
    let msg = decode_err(r#"{"type":"message","from":"peer-b","data":null}"#);
    assert!(msg.contains("data"), "error must name the field: {msg}");
}

#[test]
fn error_without_message_is_rejected() {
    decode_err(r#"{"type":"error"}"#);
}

#[test]
fn log_with_unknown_level_is_rejected() {
    let msg = decode_err(r#"{"type":"log","level":"trace","namespace":"x","message":"y"}"#);
    assert!(msg.contains("trace"), "error must name the level: {msg}");
}

#[test]
fn wrongly_typed_field_is_rejected() {
    decode_err(r#"{"type":"ready","peerId":42}"#);
}

// ── Non-events ──────────────────────────────────────────────────────────────

#[test]
fn unknown_type_is_skipped_without_error() {
    let result = parse_event_line(r#"{"type":"heartbeat","seq":3}"#).expect("unknown type must not fail");
    assert!(result.is_none());
}

#[test]
fn blank_line_is_skipped() {
    assert!(parse_event_line("   ").expect("blank must not fail").is_none());
}

#[test]
fn malformed_json_is_a_decode_error() {
    let msg = decode_err("{not json");
    assert!(msg.contains("malformed json"), "{msg}");
}

#[test]
fn json_without_type_is_a_decode_error() {
    decode_err(r#"{"peerId":"p"}"#);
}

#[test]
fn non_object_json_is_a_decode_error() {
    decode_err("[1,2,3]");
    decode_err("\"ready\"");
}
