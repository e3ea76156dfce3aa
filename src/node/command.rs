//! Outbound commands written to the peer node's stdin.
//!
//! Commands are write-only: the node answers, if at all, with independent
//! events on stdout that carry no correlation to the command.

use serde::Serialize;
use serde_json::Value;

use crate::node::event::PeerId;
use crate::{AppError, Result};

/// A command understood by the peer node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Join the network on the given port.
    Connect {
        /// Listen port for the node.
        port: u16,
    },
    /// Deliver `data` to `peer_id`.
    Send {
        /// Destination peer.
        #[serde(rename = "peerId")]
        peer_id: String,
        /// Opaque JSON payload.
        data: Value,
    },
    /// Ask the node to shut down gracefully.
    Shutdown,
}

impl Command {
    /// Build a [`Command::Send`] for `peer_id`.
    #[must_use]
    pub fn send(peer_id: &PeerId, data: Value) -> Self {
        Self::Send {
            peer_id: peer_id.as_str().to_owned(),
            data,
        }
    }

    /// Wire name of the command, used in log records.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Send { .. } => "send",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Serialise `command` as one compact JSON object followed by `\n`.
///
/// # Errors
///
/// Returns [`AppError::Command`] if serialisation fails, which cannot happen
/// for the payload types `Command` holds.
pub fn encode_command(command: &Command) -> Result<String> {
    let mut line = serde_json::to_string(command)
        .map_err(|e| AppError::Command(format!("failed to serialise {}: {e}", command.kind())))?;
    line.push('\n');
    Ok(line)
}
