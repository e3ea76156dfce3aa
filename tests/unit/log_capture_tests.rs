//! Unit tests for the log records the bridge emits: decode failures from the
//! stdout reader, and node `log` events re-emitted by the dispatcher.
//!
//! A JSON `tracing_subscriber` writing into a shared buffer is installed as
//! the thread default, so records are captured without a global subscriber.

use std::io::Write;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

use peer_bridge::bridge::dispatcher::EventDispatcher;
use peer_bridge::node::event::{LogLevel, NodeEvent, NodeSignal};
use peer_bridge::node::reader::run_reader;

// ── Capture ─────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl CapturedLogs {
    fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_max_level(tracing::Level::TRACE)
            .with_writer(self.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    fn records(&self) -> Vec<Value> {
        let raw = self.0.lock().unwrap().clone();
        String::from_utf8(raw)
            .expect("log output is utf-8")
            .lines()
            .map(|line| serde_json::from_str(line).expect("each record is one JSON line"))
            .collect()
    }

    fn at_level(&self, level: &str) -> Vec<Value> {
        self.records()
            .into_iter()
            .filter(|r| r["level"] == level)
            .collect()
    }
}

// ── Decode failures ─────────────────────────────────────────────────────────

#[tokio::test]
async fn malformed_line_logs_one_decode_error_with_raw_line() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let stdout = concat!(
        "{\"type\":\"ready\",\"peerId\":\"p1\"}\n",
        "{this is not json\n",
        "{\"type\":\"message\",\"from\":\"p2\",\"data\":\"hi\"}\n",
    );
    let (tx, mut rx) = mpsc::channel(8);
    run_reader(stdout.as_bytes(), tx).await.expect("reader");

    let mut forwarded = 0;
    while rx.recv().await.is_some() {
        forwarded += 1;
    }
    assert_eq!(forwarded, 2, "both valid lines still arrive");

    let errors = logs.at_level("ERROR");
    assert_eq!(errors.len(), 1, "exactly one decode failure: {errors:?}");
    let fields = &errors[0]["fields"];
    assert_eq!(fields["namespace"], "p2p");
    assert_eq!(fields["raw_line"], "{this is not json");
    assert_eq!(fields["message"], "failed to parse node output");
    assert!(
        fields["error"].as_str().unwrap_or_default().starts_with("decode:"),
        "{fields}"
    );
}

#[tokio::test]
async fn missing_required_field_is_logged_as_decode_error() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let (tx, _rx) = mpsc::channel(8);
    run_reader(&b"{\"type\":\"ready\"}\n"[..], tx).await.expect("reader");

    let errors = logs.at_level("ERROR");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["fields"]["raw_line"], "{\"type\":\"ready\"}");
    assert!(errors[0]["fields"]["error"]
        .as_str()
        .unwrap_or_default()
        .contains("peerId"));
}

#[tokio::test]
async fn unknown_event_type_is_not_an_error() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let (tx, _rx) = mpsc::channel(8);
    run_reader(&b"{\"type\":\"telemetry\"}\n"[..], tx).await.expect("reader");

    assert!(logs.at_level("ERROR").is_empty());
}

// ── Node log forwarding ─────────────────────────────────────────────────────

fn node_log(level: LogLevel, namespace: &str, message: &str, meta: Option<Value>) -> NodeSignal {
    NodeSignal::Event(NodeEvent::Log {
        level,
        namespace: namespace.to_owned(),
        message: message.to_owned(),
        meta,
    })
}

#[test]
fn node_log_is_reemitted_at_its_level_and_namespace() {
    let logs = CapturedLogs::default();
    let dispatcher = EventDispatcher::new();

    tracing::subscriber::with_default(
        tracing_subscriber::fmt()
            .json()
            .with_max_level(tracing::Level::TRACE)
            .with_writer(logs.clone())
            .finish(),
        || {
            dispatcher.dispatch(node_log(
                LogLevel::Warn,
                "libp2p::swarm",
                "connection reset",
                Some(json!({"peer": "x"})),
            ));
        },
    );

    let records = logs.records();
    assert_eq!(records.len(), 1, "{records:?}");
    assert_eq!(records[0]["level"], "WARN");
    let fields = &records[0]["fields"];
    assert_eq!(fields["namespace"], "libp2p::swarm");
    assert_eq!(fields["message"], "connection reset");
    let meta: Value = serde_json::from_str(fields["meta"].as_str().expect("meta is recorded"))
        .expect("meta is JSON text");
    assert_eq!(meta, json!({"peer": "x"}));
}

#[test]
fn every_node_level_maps_to_the_same_tracing_level() {
    let logs = CapturedLogs::default();
    let dispatcher = EventDispatcher::new();
    let _guard = logs.install();

    for level in [LogLevel::Debug, LogLevel::Info, LogLevel::Warn, LogLevel::Error] {
        dispatcher.dispatch(node_log(level, "dht", "tick", None));
    }

    let levels: Vec<Value> = logs.records().iter().map(|r| r["level"].clone()).collect();
    assert_eq!(levels, vec![json!("DEBUG"), json!("INFO"), json!("WARN"), json!("ERROR")]);
    assert!(
        logs.records().iter().all(|r| r["fields"]["namespace"] == "dht"
            && r["fields"].get("meta").is_none()),
        "no meta recorded when the node sent none"
    );
}
