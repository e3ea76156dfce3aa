//! Bridge lifecycle state machine.

use std::fmt::{Display, Formatter};

/// Lifecycle of one bridge instance.
///
/// ```text
/// NotStarted ─start─▶ Starting ─ready─▶ Ready ─stop─▶ Stopping ─▶ Stopped
///                        │                │               │
///                        └────────────────┴───────────────┴──▶ Errored
/// ```
///
/// `Stopped` and `Errored` end a run; `start()` may begin a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeState {
    /// Created, never started.
    NotStarted,
    /// Node spawned, waiting for its `ready` event.
    Starting,
    /// Node reported its peer id.
    Ready,
    /// `shutdown` is being sent.
    Stopping,
    /// Stopped by the caller or by a clean node exit.
    Stopped,
    /// The node failed or exited abnormally.
    Errored,
}

impl BridgeState {
    /// Whether the current run is over.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Errored)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use BridgeState::{Errored, NotStarted, Ready, Starting, Stopped, Stopping};

        match (self, next) {
            (NotStarted | Stopped | Errored, Starting)
            | (Starting, Ready)
            | (Starting | Ready, Stopping)
            | (Starting | Ready | Stopping, Stopped | Errored) => true,
            _ => false,
        }
    }
}

impl Display for BridgeState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NotStarted => "not_started",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}
