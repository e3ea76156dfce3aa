//! Inbound events emitted by the peer node on stdout.
//!
//! # Known inbound types
//!
//! | `type`            | Maps to                            |
//! |-------------------|------------------------------------|
//! | `ready`           | [`NodeEvent::Ready`]               |
//! | `message`         | [`NodeEvent::Message`]             |
//! | `error`           | [`NodeEvent::Error`]               |
//! | `log`             | [`NodeEvent::Log`]                 |
//! | `peer_discovered` | [`NodeEvent::PeerDiscovered`]      |
//! | *(any other)*     | Skipped; logged at `DEBUG`         |

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{AppError, Result};

/// Opaque peer identity assigned by the node once it is ready.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(String);

impl PeerId {
    /// Wrap a raw peer id string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PeerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Severity of a `log` event forwarded by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Verbose diagnostics.
    Debug,
    /// Routine information.
    Info,
    /// Recoverable problem.
    Warn,
    /// Failure.
    Error,
}

impl FromStr for LogLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(AppError::Decode(format!("unknown log level: {other}"))),
        }
    }
}

/// A decoded event from the node's stdout.
///
/// The variant fully determines which fields are present; lines whose
/// required fields are missing never become a `NodeEvent`.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// The node joined the network and reports its identity.
    Ready {
        /// Identity assigned to this node.
        peer_id: PeerId,
    },
    /// A payload arrived from another peer.
    Message {
        /// Sending peer.
        from: PeerId,
        /// Opaque JSON payload.
        data: Value,
    },
    /// The node reported a runtime error.
    Error {
        /// Error text.
        message: String,
    },
    /// A structured log record originating inside the node.
    Log {
        /// Record severity.
        level: LogLevel,
        /// Subsystem of the node that produced the record.
        namespace: String,
        /// Record text.
        message: String,
        /// Optional structured metadata.
        meta: Option<Value>,
    },
    /// Another peer was discovered on the network.
    PeerDiscovered {
        /// Identity of the discovered peer.
        peer_id: PeerId,
        /// Topics the peer advertises.
        topics: BTreeSet<String>,
    },
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ReadyFields {
    #[serde(rename = "peerId")]
    peer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageFields {
    from: Option<String>,
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorFields {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LogFields {
    level: Option<String>,
    namespace: Option<String>,
    #[serde(default)]
    message: String,
    meta: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct PeerDiscoveredFields {
    #[serde(rename = "peerId")]
    peer_id: Option<String>,
    #[serde(default)]
    topics: BTreeSet<String>,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decode one framed line of node output into a [`NodeEvent`].
///
/// - `Ok(Some(event))`: a recognised, complete event.
/// - `Ok(None)`: a blank line or an unrecognised `type`.
/// - `Err(AppError::Decode(..))`: not a JSON object with a string `type`,
///   or a known type with a required field missing.
///
/// # Errors
///
/// Returns [`AppError::Decode`] as described above. The error is scoped to
/// this one line; callers log it and continue with the next line.
pub fn parse_event_line(line: &str) -> Result<Option<NodeEvent>> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    let value: Value =
        serde_json::from_str(line).map_err(|e| AppError::Decode(format!("malformed json: {e}")))?;
    let envelope: Envelope = Envelope::deserialize(&value)
        .map_err(|e| AppError::Decode(format!("missing event type: {e}")))?;

    match envelope.kind.as_str() {
        "ready" => decode_ready(&value).map(Some),
        "message" => decode_message(&value).map(Some),
        "error" => decode_error(&value).map(Some),
        "log" => decode_log(&value).map(Some),
        "peer_discovered" => decode_peer_discovered(&value).map(Some),
        other => {
            debug!(event_type = other, "skipping unknown node event type");
            Ok(None)
        }
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn fields<'de, T: Deserialize<'de>>(value: &'de Value, kind: &str) -> Result<T> {
    T::deserialize(value).map_err(|e| AppError::Decode(format!("invalid {kind} event: {e}")))
}

fn required(field: Option<String>, kind: &str, name: &str) -> Result<String> {
    field
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Decode(format!("missing required field: `{name}` in {kind} event")))
}

fn decode_ready(value: &Value) -> Result<NodeEvent> {
    let f: ReadyFields = fields(value, "ready")?;
    Ok(NodeEvent::Ready {
        peer_id: PeerId(required(f.peer_id, "ready", "peerId")?),
    })
}

fn decode_message(value: &Value) -> Result<NodeEvent> {
    let f: MessageFields = fields(value, "message")?;
    let from = required(f.from, "message", "from")?;
    let data = f
        .data
        .filter(|d| !d.is_null())
        .ok_or_else(|| AppError::Decode("missing required field: `data` in message event".into()))?;
    Ok(NodeEvent::Message {
        from: PeerId(from),
        data,
    })
}

fn decode_error(value: &Value) -> Result<NodeEvent> {
    let f: ErrorFields = fields(value, "error")?;
    Ok(NodeEvent::Error {
        message: required(f.message, "error", "message")?,
    })
}

fn decode_log(value: &Value) -> Result<NodeEvent> {
    let f: LogFields = fields(value, "log")?;
    let level = required(f.level, "log", "level")?.parse()?;
    Ok(NodeEvent::Log {
        level,
        namespace: required(f.namespace, "log", "namespace")?,
        message: f.message,
        meta: f.meta.filter(|m| !m.is_null()),
    })
}

fn decode_peer_discovered(value: &Value) -> Result<NodeEvent> {
    let f: PeerDiscoveredFields = fields(value, "peer_discovered")?;
    Ok(NodeEvent::PeerDiscovered {
        peer_id: PeerId(required(f.peer_id, "peer_discovered", "peerId")?),
        topics: f.topics,
    })
}

/// Everything the supervisor tasks report to the event dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeSignal {
    /// A decoded stdout event.
    Event(NodeEvent),
    /// The process exited; `None` means it was killed by a signal.
    Exited {
        /// Process exit code, if any.
        code: Option<i32>,
    },
    /// Waiting on the process failed at the OS level.
    WaitFailed {
        /// OS error description.
        reason: String,
    },
}
