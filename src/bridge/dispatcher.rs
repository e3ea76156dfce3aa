//! Event dispatcher: routes node signals to typed subscription channels.
//!
//! The dispatcher owns the recorded [`PeerId`] and the [`BridgeState`]. Both
//! live in [`watch`] channels so readers never block the dispatch path, and
//! every transition goes through [`EventDispatcher::transition`], which
//! rejects moves the state machine does not allow.
//!
//! Each event category has its own [`broadcast`] channel. Receivers created
//! before the node starts see every event of that category from then on.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bridge::state::BridgeState;
use crate::errors::ProcessError;
use crate::node::event::{LogLevel, NodeEvent, NodeSignal, PeerId};
use crate::node::LOG_NAMESPACE;

/// Buffered events per subscription channel before slow receivers lag.
pub const CHANNEL_CAPACITY: usize = 256;

/// A payload delivered by another peer.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Sending peer.
    pub from: PeerId,
    /// Opaque JSON payload.
    pub data: Value,
}

/// A peer announced by the node's discovery layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeer {
    /// Discovered peer identity.
    pub peer_id: PeerId,
    /// Topics the peer advertises.
    pub topics: BTreeSet<String>,
}

/// Routes decoded node signals to subscribers and tracks readiness.
#[derive(Debug)]
pub struct EventDispatcher {
    state: watch::Sender<BridgeState>,
    peer_id: watch::Sender<Option<PeerId>>,
    ready_tx: broadcast::Sender<PeerId>,
    message_tx: broadcast::Sender<InboundMessage>,
    error_tx: broadcast::Sender<ProcessError>,
    peer_tx: broadcast::Sender<DiscoveredPeer>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    /// Create a dispatcher in [`BridgeState::NotStarted`] with no peer id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: watch::channel(BridgeState::NotStarted).0,
            peer_id: watch::channel(None).0,
            ready_tx: broadcast::channel(CHANNEL_CAPACITY).0,
            message_tx: broadcast::channel(CHANNEL_CAPACITY).0,
            error_tx: broadcast::channel(CHANNEL_CAPACITY).0,
            peer_tx: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    /// Watch receiver for lifecycle changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<BridgeState> {
        self.state.subscribe()
    }

    /// Peer id from the most recent `ready` event of the current run.
    #[must_use]
    pub fn peer_id(&self) -> Option<PeerId> {
        self.peer_id.borrow().clone()
    }

    /// Subscribe to `ready` notifications.
    #[must_use]
    pub fn subscribe_ready(&self) -> broadcast::Receiver<PeerId> {
        self.ready_tx.subscribe()
    }

    /// Subscribe to inbound peer messages.
    #[must_use]
    pub fn subscribe_messages(&self) -> broadcast::Receiver<InboundMessage> {
        self.message_tx.subscribe()
    }

    /// Subscribe to node runtime errors.
    #[must_use]
    pub fn subscribe_errors(&self) -> broadcast::Receiver<ProcessError> {
        self.error_tx.subscribe()
    }

    /// Subscribe to peer discovery notifications.
    #[must_use]
    pub fn subscribe_peers(&self) -> broadcast::Receiver<DiscoveredPeer> {
        self.peer_tx.subscribe()
    }

    /// Move to `next` if the state machine allows it.
    ///
    /// Returns `false`, leaving the state unchanged, for an illegal move.
    pub fn transition(&self, next: BridgeState) -> bool {
        let mut from = None;
        let changed = self.state.send_if_modified(|state| {
            if state.can_transition_to(next) {
                from = Some(*state);
                *state = next;
                true
            } else {
                false
            }
        });

        match from {
            Some(from) => debug!(namespace = LOG_NAMESPACE, %from, to = %next, "bridge state changed"),
            None => debug!(
                namespace = LOG_NAMESPACE,
                current = %self.state(),
                rejected = %next,
                "ignoring illegal bridge state transition"
            ),
        }

        changed
    }

    /// Forget the peer id of a previous run.
    pub(crate) fn clear_peer_id(&self) {
        self.peer_id.send_replace(None);
    }

    /// Route one signal to its handler.
    pub fn dispatch(&self, signal: NodeSignal) {
        match signal {
            NodeSignal::Event(event) => self.dispatch_event(event),
            NodeSignal::Exited { code: Some(0) } => {
                info!(namespace = LOG_NAMESPACE, exit_code = 0, "peer node exited cleanly");
                self.transition(BridgeState::Stopped);
            }
            NodeSignal::Exited { code } => {
                error!(namespace = LOG_NAMESPACE, exit_code = ?code, "peer node exited unexpectedly");
                self.transition(BridgeState::Errored);
                self.publish_error(ProcessError::Exited { code });
            }
            NodeSignal::WaitFailed { reason } => {
                error!(namespace = LOG_NAMESPACE, %reason, "peer node process error");
                self.transition(BridgeState::Errored);
                self.publish_error(ProcessError::Wait { reason });
            }
        }
    }

    fn dispatch_event(&self, event: NodeEvent) {
        match event {
            NodeEvent::Ready { peer_id } => self.accept_ready(peer_id),
            NodeEvent::Message { from, data } => {
                debug!(namespace = LOG_NAMESPACE, %from, "inbound message");
                let _ = self.message_tx.send(InboundMessage { from, data });
            }
            NodeEvent::Error { message } => {
                warn!(namespace = LOG_NAMESPACE, %message, "node reported error");
                self.publish_error(ProcessError::Reported { message });
            }
            NodeEvent::Log {
                level,
                namespace,
                message,
                meta,
            } => forward_log(level, &namespace, &message, meta.as_ref()),
            NodeEvent::PeerDiscovered { peer_id, topics } => {
                info!(namespace = LOG_NAMESPACE, %peer_id, ?topics, "discovered peer");
                let _ = self.peer_tx.send(DiscoveredPeer { peer_id, topics });
            }
        }
    }

    /// Record `peer_id` and announce readiness, but only while the run is
    /// live. The id is stored before the state flips so `Ready` observers
    /// always find it.
    fn accept_ready(&self, peer_id: PeerId) {
        let state = self.state();
        if !matches!(state, BridgeState::Starting | BridgeState::Ready) {
            debug!(namespace = LOG_NAMESPACE, %peer_id, %state, "ignoring ready outside a live run");
            return;
        }

        self.peer_id.send_replace(Some(peer_id.clone()));
        if state == BridgeState::Starting && !self.transition(BridgeState::Ready) {
            self.clear_peer_id();
            return;
        }

        info!(namespace = LOG_NAMESPACE, %peer_id, "node ready");
        let _ = self.ready_tx.send(peer_id);
    }

    fn publish_error(&self, err: ProcessError) {
        if self.error_tx.send(err).is_err() {
            debug!(namespace = LOG_NAMESPACE, "no error subscribers");
        }
    }
}

/// Dispatcher task: applies signals from the supervisor tasks in order.
///
/// Runs until every signal sender is dropped or `cancel` fires.
pub async fn run_dispatcher(
    dispatcher: Arc<EventDispatcher>,
    mut signal_rx: mpsc::Receiver<NodeSignal>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(namespace = LOG_NAMESPACE, "dispatcher: cancellation received, stopping");
                break;
            }

            signal = signal_rx.recv() => match signal {
                Some(signal) => dispatcher.dispatch(signal),
                None => {
                    debug!(namespace = LOG_NAMESPACE, "dispatcher: all signal senders gone, stopping");
                    break;
                }
            },
        }
    }
}

/// Re-emit a node `log` event under the node's own namespace and level.
fn forward_log(level: LogLevel, namespace: &str, message: &str, meta: Option<&Value>) {
    let meta = meta.map(Value::to_string);
    let meta = meta.as_deref();

    match level {
        LogLevel::Debug => debug!(namespace, meta, "{message}"),
        LogLevel::Info => info!(namespace, meta, "{message}"),
        LogLevel::Warn => warn!(namespace, meta, "{message}"),
        LogLevel::Error => error!(namespace, meta, "{message}"),
    }
}
