//! Unit tests for the stdout reader and stdin writer tasks, driven over
//! in-memory byte streams instead of a real node process.

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

use peer_bridge::node::command::Command;
use peer_bridge::node::event::{NodeEvent, NodeSignal, PeerId};
use peer_bridge::node::reader::{run_reader, run_stderr_reader};
use peer_bridge::node::writer::run_writer;

async fn collect_events(stdout: &[u8]) -> Vec<NodeEvent> {
    let (tx, mut rx) = mpsc::channel(64);
    run_reader(stdout, tx).await.expect("reader must finish cleanly");

    let mut events = Vec::new();
    while let Some(signal) = rx.recv().await {
        match signal {
            NodeSignal::Event(event) => events.push(event),
            other => panic!("reader must only forward events, got {other:?}"),
        }
    }
    events
}

// ── Reader ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn malformed_line_does_not_interrupt_the_stream() {
    let stdout = concat!(
        "{\"type\":\"ready\",\"peerId\":\"p1\"}\n",
        "{this is not json\n",
        "{\"type\":\"message\",\"from\":\"p2\",\"data\":\"hi\"}\n",
    );

    let events = collect_events(stdout.as_bytes()).await;

    assert_eq!(
        events,
        vec![
            NodeEvent::Ready {
                peer_id: PeerId::new("p1")
            },
            NodeEvent::Message {
                from: PeerId::new("p2"),
                data: json!("hi"),
            },
        ]
    );
}

#[tokio::test]
async fn unknown_and_incomplete_events_are_skipped() {
    let stdout = concat!(
        "{\"type\":\"telemetry\",\"cpu\":0.4}\n",
        "{\"type\":\"message\",\"from\":\"p2\"}\n",
        "\n",
        "{\"type\":\"error\",\"message\":\"boom\"}\n",
    );

    let events = collect_events(stdout.as_bytes()).await;

    assert_eq!(
        events,
        vec![NodeEvent::Error {
            message: "boom".into()
        }]
    );
}

#[tokio::test]
async fn final_line_without_newline_is_delivered() {
    let events = collect_events(b"{\"type\":\"ready\",\"peerId\":\"p1\"}").await;
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn events_split_across_writes_arrive_in_order() {
    let (mut node_side, reader_side) = tokio::io::duplex(64);
    let (tx, mut rx) = mpsc::channel(16);
    let reader = tokio::spawn(run_reader(reader_side, tx));

    node_side.write_all(b"{\"type\":\"message\",\"from\":\"a\",").await.expect("write");
    node_side.write_all(b"\"data\":1}\n{\"type\":\"message\",").await.expect("write");
    node_side.write_all(b"\"from\":\"b\",\"data\":2}\n").await.expect("write");
    drop(node_side);

    let mut order = Vec::new();
    while let Some(NodeSignal::Event(NodeEvent::Message { from, .. })) = rx.recv().await {
        order.push(from.to_string());
    }
    reader.await.expect("join").expect("reader");

    assert_eq!(order, vec!["a", "b"]);
}

#[tokio::test]
async fn reader_keeps_draining_after_receiver_is_dropped() {
    let (tx, rx) = mpsc::channel(1);
    drop(rx);

    let stdout = "{\"type\":\"ready\",\"peerId\":\"p1\"}\n".repeat(50);
    run_reader(stdout.as_bytes(), tx).await.expect("reader must reach EOF");
}

#[tokio::test]
async fn stderr_reader_runs_to_eof() {
    run_stderr_reader(&b"warning: low peers\nsecond line\n"[..])
        .await
        .expect("stderr reader");
}

// ── Writer ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn writer_emits_one_line_per_command_in_order() {
    let (stdin, mut node_side) = tokio::io::duplex(4096);
    let (tx, rx) = mpsc::unbounded_channel();

    tx.send(Command::Connect { port: 8000 }).expect("queue");
    tx.send(Command::send(&PeerId::new("p2"), json!("Echo: hi"))).expect("queue");
    tx.send(Command::Shutdown).expect("queue");
    drop(tx);

    run_writer(stdin, rx).await.expect("writer");

    let mut written = String::new();
    node_side.read_to_string(&mut written).await.expect("read");
    let lines: Vec<&str> = written.lines().collect();

    assert_eq!(
        lines,
        vec![
            r#"{"type":"connect","port":8000}"#,
            r#"{"type":"send","peerId":"p2","data":"Echo: hi"}"#,
            r#"{"type":"shutdown"}"#,
        ]
    );
}

#[tokio::test]
async fn writer_reports_closed_stdin() {
    let (stdin, node_side) = tokio::io::duplex(64);
    drop(node_side);

    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(Command::Shutdown).expect("queue");

    let err = run_writer(stdin, rx).await.expect_err("write must fail");
    assert!(err.to_string().starts_with("io: write failed"), "{err}");
}
