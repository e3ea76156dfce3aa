//! Reader tasks for the peer node's output streams.
//!
//! Both tasks drive a [`FramedRead`] backed by [`NodeCodec`], so a line is
//! only handed on once its terminating newline has arrived.
//!
//! - [`run_reader`] decodes stdout lines into [`NodeEvent`]s and forwards them
//!   in arrival order. A malformed line is logged and skipped.
//! - [`run_stderr_reader`] logs every stderr line and forwards nothing.
//!
//! Neither task stops before EOF. Once the dispatcher is gone the stdout
//! reader keeps draining and discards events, so a node that is still
//! shutting down never writes into a closed pipe.

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, warn};

use crate::node::codec::NodeCodec;
use crate::node::event::{parse_event_line, NodeEvent, NodeSignal};
use crate::node::LOG_NAMESPACE;
use crate::Result;

/// Stdout reader task: decodes NDJSON lines and forwards [`NodeEvent`]s.
///
/// Decode failures are logged at `ERROR` under the `p2p` namespace together
/// with the raw line; they never stop the task.
///
/// The task runs until the stream reaches EOF or the underlying read fails.
/// If `signal_tx` closes first, later events are decoded and dropped.
///
/// # Errors
///
/// Always returns `Ok(())`; stream failures are logged rather than returned
/// because process death is reported separately by the exit monitor.
pub async fn run_reader<R>(stdout: R, signal_tx: mpsc::Sender<NodeSignal>) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, NodeCodec::new());
    let mut forwarding = true;

    while let Some(item) = framed.next().await {
        match item {
            Ok(line) => {
                let Some(event) = decode_or_log(&line) else {
                    continue;
                };
                if forwarding && signal_tx.send(NodeSignal::Event(event)).await.is_err() {
                    debug!(
                        namespace = LOG_NAMESPACE,
                        "stdout reader: dispatcher gone, draining without forwarding"
                    );
                    forwarding = false;
                }
            }

            Err(e) => {
                warn!(namespace = LOG_NAMESPACE, error = %e, "stdout reader: IO error, stopping");
                return Ok(());
            }
        }
    }

    debug!(namespace = LOG_NAMESPACE, "stdout reader: EOF detected");
    Ok(())
}

/// Stderr reader task: logs each line at `ERROR` under the `p2p` namespace.
///
/// Stderr output never changes bridge state on its own.
///
/// # Errors
///
/// Always returns `Ok(())`.
pub async fn run_stderr_reader<R>(stderr: R) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stderr, NodeCodec::new());

    while let Some(item) = framed.next().await {
        match item {
            Ok(line) => {
                error!(namespace = LOG_NAMESPACE, data = %line, "node stderr");
            }
            Err(e) => {
                warn!(namespace = LOG_NAMESPACE, error = %e, "stderr reader: IO error, stopping");
                break;
            }
        }
    }

    Ok(())
}

fn decode_or_log(line: &str) -> Option<NodeEvent> {
    match parse_event_line(line) {
        Ok(event) => event,
        Err(e) => {
            error!(
                namespace = LOG_NAMESPACE,
                error = %e,
                raw_line = line,
                "failed to parse node output"
            );
            None
        }
    }
}
