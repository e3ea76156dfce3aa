#![forbid(unsafe_code)]

//! `peer-bridge`: joins agent processes to a peer-to-peer network through an
//! external peer node, spoken to over a line-delimited JSON stdio protocol.

pub mod agent;
pub mod bridge;
pub mod config;
pub mod errors;
pub mod monitor;
pub mod node;

pub use bridge::state::BridgeState;
pub use bridge::PeerBridge;
pub use config::GlobalConfig;
pub use errors::{AppError, ProcessError, Result};
pub use node::event::{NodeEvent, PeerId};
