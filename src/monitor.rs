//! Peer monitor role: tracks peers announced by the node's discovery layer.
//!
//! Discovered peers accumulate in a [`PeerMonitor`] registry. On every
//! interval tick peers not announced within the TTL are evicted, then the
//! monitor logs a summary of known peers, but only when the peer count
//! changed since the previous tick. Without a TTL the registry keeps every
//! peer it has seen.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bridge::dispatcher::DiscoveredPeer;
use crate::bridge::PeerBridge;
use crate::node::event::PeerId;
use crate::Result;

const NAMESPACE: &str = "monitor";

/// What the monitor knows about one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    /// Union of every topic set the peer was announced with.
    pub topics: BTreeSet<String>,
    /// First announcement.
    pub first_seen: DateTime<Utc>,
    /// Most recent announcement.
    pub last_seen: DateTime<Utc>,
}

/// Registry of discovered peers with change-only summaries.
#[derive(Debug, Default)]
pub struct PeerMonitor {
    peers: HashMap<PeerId, PeerRecord>,
    last_count: usize,
    ttl: Option<TimeDelta>,
}

impl PeerMonitor {
    /// Create an empty registry that never evicts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry that evicts peers silent for longer than
    /// `ttl`. A TTL too large for a [`TimeDelta`] disables eviction.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: TimeDelta::from_std(ttl).ok(),
            ..Self::default()
        }
    }

    /// Record an announcement at the current time.
    pub fn record(&mut self, peer: DiscoveredPeer) {
        self.record_at(peer, Utc::now());
    }

    /// Record an announcement observed at `now`.
    pub fn record_at(&mut self, peer: DiscoveredPeer, now: DateTime<Utc>) {
        self.peers
            .entry(peer.peer_id)
            .and_modify(|record| {
                record.topics.extend(peer.topics.iter().cloned());
                record.last_seen = now;
            })
            .or_insert_with(|| PeerRecord {
                topics: peer.topics,
                first_seen: now,
                last_seen: now,
            });
    }

    /// Drop peers whose last announcement is older than the TTL at `now`.
    ///
    /// Returns the number of evicted peers.
    pub fn evict_stale(&mut self, now: DateTime<Utc>) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };

        let before = self.peers.len();
        self.peers.retain(|_, record| now - record.last_seen <= ttl);
        let evicted = before - self.peers.len();
        if evicted > 0 {
            debug!(namespace = NAMESPACE, evicted, "evicted stale peers");
        }
        evicted
    }

    /// Number of distinct peers known.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Record for `peer_id`, if it was announced.
    #[must_use]
    pub fn get(&self, peer_id: &PeerId) -> Option<&PeerRecord> {
        self.peers.get(peer_id)
    }

    /// Log the peer summary if the count changed since the last call.
    ///
    /// Returns the new count when a summary was logged.
    pub fn summarize(&mut self) -> Option<usize> {
        let count = self.peers.len();
        if count == self.last_count {
            return None;
        }
        self.last_count = count;

        let mut ids: Vec<&str> = self.peers.keys().map(PeerId::as_str).collect();
        ids.sort_unstable();
        info!(namespace = NAMESPACE, count, peers = ?ids, "connected peers");
        Some(count)
    }
}

/// Start the bridge and summarise discovered peers every `interval` until
/// `cancel` fires. With `peer_ttl`, peers silent for longer are evicted on
/// each tick. The bridge is stopped before returning.
///
/// # Errors
///
/// Returns the bridge's start error, or
/// [`AppError::Process`](crate::AppError::Process) if the node never becomes
/// ready within `ready_timeout`.
pub async fn run_monitor(
    bridge: Arc<PeerBridge>,
    interval: Duration,
    peer_ttl: Option<Duration>,
    ready_timeout: Option<Duration>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut announcements = bridge.subscribe_peers();
    let mut errors = bridge.subscribe_errors();

    bridge.start()?;
    match bridge.wait_ready(ready_timeout).await {
        Ok(peer_id) => info!(namespace = NAMESPACE, %peer_id, "monitor node ready"),
        Err(err) => {
            error!(namespace = NAMESPACE, %err, "failed to start monitoring");
            bridge.stop();
            return Err(err);
        }
    }

    let mut monitor = peer_ttl.map_or_else(PeerMonitor::new, PeerMonitor::with_ttl);
    let mut ticker = tokio::time::interval(interval);
    info!(namespace = NAMESPACE, interval_secs = interval.as_secs(), "started peer monitoring");

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!(namespace = NAMESPACE, "stopped peer monitoring");
                break;
            }

            _ = ticker.tick() => {
                monitor.evict_stale(Utc::now());
                monitor.summarize();
            }

            peer = announcements.recv() => match peer {
                Ok(peer) => monitor.record(peer),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(namespace = NAMESPACE, skipped, "peer subscriber lagged, announcements dropped");
                }
                Err(RecvError::Closed) => break,
            },

            err = errors.recv() => match err {
                Ok(err) => error!(namespace = NAMESPACE, %err, "p2p node error"),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    bridge.stop();
    Ok(())
}
