//! Peer node process spawner.
//!
//! Launches the external peer node with:
//! - `--port <p> --name <n>` and, when a credential is configured,
//!   `--private-key <k>`.
//! - All three stdio streams piped.
//! - `kill_on_drop(false)`: the node owns its graceful shutdown, so releasing
//!   the handle never kills it.
//!
//! The executable is checked before spawning so a bad path surfaces as
//! [`AppError::Spawn`] rather than an opaque OS error.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::node::event::NodeSignal;
use crate::node::LOG_NAMESPACE;
use crate::{AppError, Result};

// ── Configuration ────────────────────────────────────────────────────────────

/// Configuration for launching one peer node.
#[derive(Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Path to the node executable. A bare file name is looked up on `PATH`.
    pub binary_path: PathBuf,
    /// Network port passed as `--port` and in the initial `connect` command.
    pub port: u16,
    /// Node name passed as `--name`.
    pub name: String,
    /// Optional credential passed as `--private-key`.
    pub private_key: Option<String>,
}

impl std::fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConfig")
            .field("binary_path", &self.binary_path)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl NodeConfig {
    /// Command-line arguments for the node, in launch order.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--port".to_owned(),
            self.port.to_string(),
            "--name".to_owned(),
            self.name.clone(),
        ];
        if let Some(key) = &self.private_key {
            args.push("--private-key".to_owned());
            args.push(key.clone());
        }
        args
    }
}

// ── Process handle ───────────────────────────────────────────────────────────

/// A freshly launched node with its stdio captured.
#[derive(Debug)]
pub struct NodeProcess {
    /// Child handle, handed to [`monitor_exit`].
    pub child: Child,
    /// Node input, handed to the writer task.
    pub stdin: ChildStdin,
    /// Node output, handed to the stdout reader task.
    pub stdout: ChildStdout,
    /// Node diagnostics, handed to the stderr reader task.
    pub stderr: ChildStderr,
}

// ── Spawner ──────────────────────────────────────────────────────────────────

/// Verify that `path` names an existing, executable regular file.
///
/// A path without a directory component is resolved against `PATH`.
///
/// # Errors
///
/// Returns [`AppError::Spawn`] if the file is missing, is not a regular
/// file, or lacks execute permission.
pub fn resolve_executable(path: &Path) -> Result<PathBuf> {
    let candidate = if path.components().count() == 1 && !path.is_absolute() {
        search_path(path).ok_or_else(|| {
            AppError::Spawn(format!("node executable not found on PATH: {}", path.display()))
        })?
    } else {
        path.to_path_buf()
    };

    let metadata = std::fs::metadata(&candidate).map_err(|err| {
        AppError::Spawn(format!("node executable {} unavailable: {err}", candidate.display()))
    })?;

    if !metadata.is_file() {
        return Err(AppError::Spawn(format!(
            "node executable {} is not a file",
            candidate.display()
        )));
    }

    if !is_executable(&metadata) {
        return Err(AppError::Spawn(format!(
            "node executable {} is not executable",
            candidate.display()
        )));
    }

    Ok(candidate)
}

/// Launch the peer node described by `config`.
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// - [`AppError::Spawn`]: the executable failed [`resolve_executable`].
/// - [`AppError::Launch`]: the OS refused to create the process, or a stdio
///   pipe could not be captured.
pub fn spawn_node(config: &NodeConfig) -> Result<NodeProcess> {
    let program = resolve_executable(&config.binary_path)?;

    info!(
        namespace = LOG_NAMESPACE,
        program = %program.display(),
        port = config.port,
        name = %config.name,
        private_key = config.private_key.is_some(),
        "starting peer node"
    );

    let mut child = Command::new(&program)
        .args(config.args())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(false)
        .spawn()
        .map_err(|err| AppError::Launch(format!("failed to spawn peer node: {err}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Launch("failed to capture node stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Launch("failed to capture node stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Launch("failed to capture node stderr".into()))?;

    Ok(NodeProcess {
        child,
        stdin,
        stdout,
        stderr,
    })
}

// ── Exit monitor ─────────────────────────────────────────────────────────────

/// Spawn a background task that awaits node exit and reports it as
/// [`NodeSignal::Exited`] (or [`NodeSignal::WaitFailed`]).
///
/// When `cancel` fires first the task returns without reporting; the bridge
/// has already released the node and its exit is no longer of interest.
#[must_use]
pub fn monitor_exit(
    mut child: Child,
    signal_tx: mpsc::Sender<NodeSignal>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = child.wait() => {
                let signal = match result {
                    Ok(status) => {
                        info!(namespace = LOG_NAMESPACE, exit_code = ?status.code(), "peer node exited");
                        NodeSignal::Exited { code: status.code() }
                    }
                    Err(err) => {
                        warn!(namespace = LOG_NAMESPACE, %err, "error waiting for peer node process");
                        NodeSignal::WaitFailed { reason: err.to_string() }
                    }
                };

                if signal_tx.send(signal).await.is_err() {
                    warn!(namespace = LOG_NAMESPACE, "signal channel closed before node exit could be delivered");
                }
            }
            () = cancel.cancelled() => {
                info!(namespace = LOG_NAMESPACE, "exit monitor: node released, no longer watching");
            }
        }
    })
}

// ── Private helpers ──────────────────────────────────────────────────────────

fn search_path(name: &Path) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    true
}
