//! Agent role: answers every inbound peer message through a [`Responder`].
//!
//! The [`Responder`] trait is the seam where prompt construction and external
//! data lookups plug in; the agent only moves messages between it and the
//! bridge. Responder and send failures are logged and never end the agent.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bridge::dispatcher::InboundMessage;
use crate::bridge::PeerBridge;
use crate::node::event::PeerId;
use crate::Result;

/// Produces the reply payload for one inbound message.
pub trait Responder: Send + Sync {
    /// Build the reply to `message`.
    ///
    /// # Errors
    ///
    /// Any error is logged by the agent and no reply is sent.
    fn respond(
        &self,
        message: InboundMessage,
    ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + '_>>;
}

/// Replies with the received payload.
///
/// String payloads come back as `"Echo: <text>"`; anything else as
/// `{"type":"echo","data":<payload>}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoResponder;

impl Responder for EchoResponder {
    fn respond(
        &self,
        message: InboundMessage,
    ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + '_>> {
        Box::pin(async move {
            Ok(match message.data {
                Value::String(text) => Value::String(format!("Echo: {text}")),
                other => json!({ "type": "echo", "data": other }),
            })
        })
    }
}

/// Replies with a fixed prompt payload:
/// `{"type":"response","data":null,"prompt":<prompt>}`.
#[derive(Debug, Clone)]
pub struct PromptResponder {
    prompt: String,
}

impl PromptResponder {
    /// Create a responder that attaches `prompt` to every reply.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

impl Responder for PromptResponder {
    fn respond(
        &self,
        _message: InboundMessage,
    ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + '_>> {
        Box::pin(async move {
            Ok(json!({
                "type": "response",
                "data": Value::Null,
                "prompt": self.prompt,
            }))
        })
    }
}

/// An agent bound to one bridge and one responder.
pub struct Agent {
    name: String,
    bridge: Arc<PeerBridge>,
    responder: Arc<dyn Responder>,
}

impl Agent {
    /// Create an agent; its log namespace is the bridge's node name.
    #[must_use]
    pub fn new(bridge: Arc<PeerBridge>, responder: Arc<dyn Responder>) -> Self {
        Self {
            name: bridge.config().name.clone(),
            bridge,
            responder,
        }
    }

    /// Start the bridge, wait for readiness, and answer messages until
    /// `cancel` fires. The bridge is stopped before returning.
    ///
    /// Subscriptions are taken before the node starts, so no message sent
    /// during startup is missed.
    ///
    /// # Errors
    ///
    /// Returns the bridge's start error, or [`AppError::Process`](crate::AppError::Process)
    /// when the node never becomes ready within `ready_timeout`.
    pub async fn run(&self, ready_timeout: Option<Duration>, cancel: CancellationToken) -> Result<()> {
        let mut messages = self.bridge.subscribe_messages();
        let mut errors = self.bridge.subscribe_errors();

        let peer_id = match self.start(ready_timeout).await {
            Ok(peer_id) => peer_id,
            Err(err) => {
                error!(namespace = %self.name, %err, "failed to start agent");
                self.bridge.stop();
                return Err(err);
            }
        };
        info!(namespace = %self.name, %peer_id, "agent started successfully");

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!(namespace = %self.name, "shutting down");
                    break;
                }

                message = messages.recv() => match message {
                    Ok(message) => self.handle_message(message).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(namespace = %self.name, skipped, "message subscriber lagged, messages dropped");
                    }
                    Err(RecvError::Closed) => break,
                },

                err = errors.recv() => match err {
                    Ok(err) => error!(namespace = %self.name, %err, "p2p node error"),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(namespace = %self.name, skipped, "error subscriber lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        self.bridge.stop();
        Ok(())
    }

    async fn start(&self, ready_timeout: Option<Duration>) -> Result<PeerId> {
        info!(namespace = %self.name, "starting agent");
        self.bridge.start()?;
        self.bridge.wait_ready(ready_timeout).await
    }

    async fn handle_message(&self, message: InboundMessage) {
        let from = message.from.clone();
        info!(namespace = %self.name, %from, data = %message.data, "received message");

        let reply = match self.responder.respond(message).await {
            Ok(reply) => reply,
            Err(err) => {
                error!(namespace = %self.name, %from, %err, "failed to build response");
                return;
            }
        };

        match self.bridge.send_message(&from, reply) {
            Ok(()) => info!(namespace = %self.name, to = %from, "sent response"),
            Err(err) => error!(namespace = %self.name, to = %from, %err, "failed to send response"),
        }
    }
}
