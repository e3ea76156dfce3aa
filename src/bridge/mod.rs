//! Bridge facade: the surface agent logic uses to reach the peer network.
//!
//! A [`PeerBridge`] supervises exactly one external peer node at a time.
//! Calling [`PeerBridge::start`] spawns the node and five background tasks:
//!
//! | Task        | Owns               | Feeds                         |
//! |-------------|--------------------|-------------------------------|
//! | writer      | node stdin         | node (encoded commands)       |
//! | reader      | node stdout        | dispatcher (decoded events)   |
//! | stderr      | node stderr        | log only                      |
//! | exit monitor| child handle       | dispatcher (exit signal)      |
//! | dispatcher  | peer id, state     | subscription channels         |
//!
//! Bridges share nothing; a host may run as many as it has agents.

pub mod dispatcher;
pub mod state;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge::dispatcher::{run_dispatcher, DiscoveredPeer, EventDispatcher, InboundMessage};
use crate::bridge::state::BridgeState;
use crate::errors::ProcessError;
use crate::node::command::Command;
use crate::node::event::PeerId;
use crate::node::reader::{run_reader, run_stderr_reader};
use crate::node::spawner::{monitor_exit, spawn_node, NodeConfig};
use crate::node::writer::run_writer;
use crate::node::LOG_NAMESPACE;
use crate::{AppError, Result};

/// Queue depth between the supervisor tasks and the dispatcher.
const SIGNAL_CAPACITY: usize = 256;

/// Handles for one running node; present exactly while a node is attached.
#[derive(Debug)]
struct NodeSession {
    command_tx: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
}

/// Bridge between host logic and one external peer node process.
///
/// All methods take `&self`; share a bridge between tasks with an [`Arc`].
#[derive(Debug)]
pub struct PeerBridge {
    config: NodeConfig,
    dispatcher: Arc<EventDispatcher>,
    session: Mutex<Option<NodeSession>>,
}

impl PeerBridge {
    /// Create a bridge in [`BridgeState::NotStarted`]. Nothing is spawned yet.
    #[must_use]
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            dispatcher: Arc::new(EventDispatcher::new()),
            session: Mutex::new(None),
        }
    }

    /// Node configuration this bridge launches with.
    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Spawn the peer node and queue the initial `connect` command.
    ///
    /// Returns as soon as the process is running; readiness is reported
    /// later through [`subscribe_ready`](Self::subscribe_ready) or
    /// [`wait_ready`](Self::wait_ready). Must be called within a tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// - [`AppError::Command`]: a live node is already attached to this
    ///   bridge. A node that has exited is released and replaced.
    /// - [`AppError::Spawn`]: the executable is missing or not executable.
    /// - [`AppError::Launch`]: the OS failed to create the process.
    ///
    /// Spawn and launch failures leave the bridge [`BridgeState::Errored`].
    pub fn start(&self) -> Result<()> {
        let mut session = self.lock_session();
        if session.is_some() {
            if !self.dispatcher.state().is_terminal() {
                return Err(AppError::Command("peer node already running".into()));
            }
            // The previous node already exited; drop what is left of it.
            if let Some(dead) = session.take() {
                dead.cancel.cancel();
            }
        }

        if !self.dispatcher.transition(BridgeState::Starting) {
            return Err(AppError::Command(format!(
                "cannot start bridge in state {}",
                self.dispatcher.state()
            )));
        }
        self.dispatcher.clear_peer_id();

        let process = match spawn_node(&self.config) {
            Ok(process) => process,
            Err(err) => {
                warn!(namespace = LOG_NAMESPACE, %err, "failed to start peer node");
                self.dispatcher.transition(BridgeState::Errored);
                return Err(err);
            }
        };

        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CAPACITY);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        // Queued before the writer runs so `connect` is always the first line.
        command_tx
            .send(Command::Connect {
                port: self.config.port,
            })
            .map_err(|_| AppError::Command("peer node input closed".into()))?;

        tokio::spawn(run_dispatcher(
            Arc::clone(&self.dispatcher),
            signal_rx,
            cancel.clone(),
        ));

        let stdout_tx = signal_tx.clone();
        tokio::spawn(async move {
            let _ = run_reader(process.stdout, stdout_tx).await;
        });
        tokio::spawn(async move {
            let _ = run_stderr_reader(process.stderr).await;
        });
        tokio::spawn(async move {
            if let Err(err) = run_writer(process.stdin, command_rx).await {
                warn!(namespace = LOG_NAMESPACE, %err, "node writer stopped");
            }
        });
        drop(monitor_exit(process.child, signal_tx, cancel.clone()));

        *session = Some(NodeSession { command_tx, cancel });
        info!(
            namespace = LOG_NAMESPACE,
            name = %self.config.name,
            port = self.config.port,
            "peer node started"
        );
        Ok(())
    }

    /// Send `shutdown` to the node and release it.
    ///
    /// Does not wait for the node to exit; a clean shutdown is the node's
    /// responsibility. The node's exit after this call is not reported.
    /// Calling `stop` with no node attached does nothing.
    pub fn stop(&self) {
        let Some(session) = self.lock_session().take() else {
            debug!(namespace = LOG_NAMESPACE, "stop: no peer node running");
            return;
        };

        self.dispatcher.transition(BridgeState::Stopping);
        if session.command_tx.send(Command::Shutdown).is_err() {
            warn!(namespace = LOG_NAMESPACE, "stop: node input already closed, shutdown not sent");
        }
        session.cancel.cancel();
        drop(session.command_tx);
        self.dispatcher.transition(BridgeState::Stopped);

        info!(namespace = LOG_NAMESPACE, name = %self.config.name, "peer node stopped");
    }

    /// Queue a `send` command delivering `data` to `peer_id`.
    ///
    /// Returns once the command is queued; the protocol has no delivery
    /// acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Command`] if no node is attached, the attached
    /// node has already exited, or its input has closed. Nothing is written
    /// in that case.
    pub fn send_message(&self, peer_id: &PeerId, data: Value) -> Result<()> {
        let session = self.lock_session();
        let Some(session) = session.as_ref() else {
            return Err(AppError::Command("peer node not started".into()));
        };
        if self.dispatcher.state().is_terminal() {
            return Err(AppError::Command(format!(
                "peer node not running: bridge is {}",
                self.dispatcher.state()
            )));
        }

        session
            .command_tx
            .send(Command::send(peer_id, data))
            .map_err(|_| AppError::Command("peer node input closed".into()))
    }

    /// Peer id of the attached node, or `None` before it reports `ready`.
    #[must_use]
    pub fn peer_id(&self) -> Option<PeerId> {
        self.dispatcher.peer_id()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> BridgeState {
        self.dispatcher.state()
    }

    /// Wait until the node reports `ready`, returning its peer id.
    ///
    /// `None` waits without limit. The bridge imposes no timeout of its own.
    ///
    /// # Errors
    ///
    /// - [`AppError::Process`] if the run ends (stopped, errored) or was never
    ///   started before readiness, or if `timeout` elapses first.
    pub async fn wait_ready(&self, timeout: Option<Duration>) -> Result<PeerId> {
        let mut state_rx = self.dispatcher.watch_state();

        let wait = async {
            loop {
                let state = *state_rx.borrow_and_update();
                match state {
                    BridgeState::Ready => {
                        return self.peer_id().ok_or_else(|| {
                            AppError::Process("ready without a peer id".into())
                        });
                    }
                    BridgeState::Starting => {}
                    other => {
                        return Err(AppError::Process(format!(
                            "node not ready: bridge is {other}"
                        )));
                    }
                }
                state_rx
                    .changed()
                    .await
                    .map_err(|_| AppError::Process("bridge dropped".into()))?;
            }
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
                AppError::Process(format!("ready timeout: no ready event within {limit:?}"))
            })?,
            None => wait.await,
        }
    }

    /// Subscribe to `ready` notifications.
    #[must_use]
    pub fn subscribe_ready(&self) -> broadcast::Receiver<PeerId> {
        self.dispatcher.subscribe_ready()
    }

    /// Subscribe to inbound peer messages.
    #[must_use]
    pub fn subscribe_messages(&self) -> broadcast::Receiver<InboundMessage> {
        self.dispatcher.subscribe_messages()
    }

    /// Subscribe to node runtime errors (reported errors and abnormal exits).
    #[must_use]
    pub fn subscribe_errors(&self) -> broadcast::Receiver<ProcessError> {
        self.dispatcher.subscribe_errors()
    }

    /// Subscribe to peer discovery notifications.
    #[must_use]
    pub fn subscribe_peers(&self) -> broadcast::Receiver<DiscoveredPeer> {
        self.dispatcher.subscribe_peers()
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<NodeSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PeerBridge {
    fn drop(&mut self) {
        self.stop();
    }
}
