//! Writer task for the peer node's stdin.
//!
//! Receives [`Command`]s from a tokio [`mpsc`] channel in issue order, encodes
//! each one as a single NDJSON line, and writes it to the node's stdin.
//!
//! The task does not listen for cancellation: it drains every queued command
//! and exits once all senders are dropped. That is what lets `stop()` queue a
//! `shutdown` command, release its sender, and still have the command reach
//! the node before stdin is closed.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::node::command::{encode_command, Command};
use crate::node::LOG_NAMESPACE;
use crate::{AppError, Result};

/// Writer task: serialises queued commands and writes them to `stdin`.
///
/// Dropping the writer on return closes `stdin`, which is the node's cue that
/// no further commands will follow.
///
/// # Errors
///
/// - [`AppError::Command`] if a command cannot be serialised.
/// - [`AppError::Io`]`("write failed: …")` if the write to `stdin` fails
///   (e.g. the node process has exited). Commands still queued are dropped
///   and later sends fail because the receiver is gone.
pub async fn run_writer<W>(stdin: W, mut command_rx: mpsc::UnboundedReceiver<Command>) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut stdin = stdin;

    while let Some(command) = command_rx.recv().await {
        let line = encode_command(&command)?;

        stdin.write_all(line.as_bytes()).await.map_err(|e| {
            warn!(namespace = LOG_NAMESPACE, command = command.kind(), error = %e, "writer: write to stdin failed");
            AppError::Io(format!("write failed: {e}"))
        })?;
        stdin
            .flush()
            .await
            .map_err(|e| AppError::Io(format!("flush failed: {e}")))?;

        debug!(namespace = LOG_NAMESPACE, command = command.kind(), "writer: command written");
    }

    debug!(namespace = LOG_NAMESPACE, "writer: command channel closed, stopping");
    stdin.shutdown().await.ok();
    Ok(())
}
