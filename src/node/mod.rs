//! External peer node process handling.
//!
//! The peer node is an opaque, separately built program. Everything the
//! bridge knows about it flows through two newline-delimited JSON streams:
//! events on the node's stdout and commands on its stdin.
//!
//! - `codec`: [`LinesCodec`](tokio_util::codec::LinesCodec)-based line framing.
//! - `event`: inbound [`NodeEvent`](event::NodeEvent) model and line decoding.
//! - `command`: outbound [`Command`](command::Command) model and line encoding.
//! - `reader`: async tasks draining the node's stdout and stderr.
//! - `writer`: async task writing encoded commands to the node's stdin.
//! - `spawner`: executable checks, process launch, and exit monitoring.

pub mod codec;
pub mod command;
pub mod event;
pub mod reader;
pub mod spawner;
pub mod writer;

/// Log namespace used for records the bridge itself produces.
pub const LOG_NAMESPACE: &str = "p2p";
