//! Integration tests for the peer monitor role.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use serial_test::serial;
use tokio_util::sync::CancellationToken;

use peer_bridge::monitor::run_monitor;
use peer_bridge::{BridgeState, PeerBridge};

use super::test_helpers::{FakeNode, WAIT};

#[tokio::test]
#[serial]
async fn monitor_runs_until_cancelled_and_stops_node() {
    let node = FakeNode::new(
        r#"
read -r line
echo '{"type":"ready","peerId":"12D3KooWMonitor"}'
echo '{"type":"peer_discovered","peerId":"peer-a","topics":["market-analysis"]}'
echo '{"type":"peer_discovered","peerId":"peer-b","topics":[]}'
while IFS= read -r line; do
  printf '%s\n' "$line" >> "$LOG"
done
"#,
    );
    let bridge = Arc::new(PeerBridge::new(node.config()));
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(run_monitor(
        Arc::clone(&bridge),
        Duration::from_millis(50),
        Some(Duration::from_secs(60)),
        Some(WAIT),
        cancel.clone(),
    ));

    tokio::time::timeout(WAIT, async {
        while bridge.state() != BridgeState::Ready {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("monitor node must become ready");
    tokio::time::sleep(Duration::from_millis(150)).await;

    cancel.cancel();
    handle.await.expect("join").expect("monitor run");

    assert_eq!(bridge.state(), BridgeState::Stopped);
    let lines = node
        .wait_for_stdin(|lines| lines.iter().any(|l| l.contains("shutdown")))
        .await;
    assert_eq!(lines, vec![r#"{"type":"shutdown"}"#.to_owned()]);
}

#[tokio::test]
#[serial]
async fn monitor_fails_when_node_exits_before_ready() {
    let node = FakeNode::new("read -r line\nexit 1");
    let bridge = Arc::new(PeerBridge::new(node.config()));

    let result = run_monitor(
        Arc::clone(&bridge),
        Duration::from_secs(1),
        None,
        Some(WAIT),
        CancellationToken::new(),
    )
    .await;

    assert!(result.is_err());
    assert_eq!(bridge.state(), BridgeState::Errored);
}
