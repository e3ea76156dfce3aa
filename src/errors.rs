//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all bridge failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Node executable is missing or not executable; checked before spawning.
    Spawn(String),
    /// The operating system refused to create the node process.
    Launch(String),
    /// A single line of node output could not be decoded into an event.
    Decode(String),
    /// The node reported an error or exited abnormally.
    Process(String),
    /// A command was issued while no node process is running.
    Command(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Launch(msg) => write!(f, "launch: {msg}"),
            Self::Decode(msg) => write!(f, "decode: {msg}"),
            Self::Process(msg) => write!(f, "process: {msg}"),
            Self::Command(msg) => write!(f, "command: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

/// Runtime failure of a live node, fanned out to error subscribers.
///
/// Unlike [`AppError`] this type is `Clone` so a single failure can be
/// delivered to every subscriber of the error channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// The node emitted an `error` event.
    Reported {
        /// Message text carried by the event.
        message: String,
    },
    /// The node exited without being asked to; `None` means killed by a signal.
    Exited {
        /// Process exit code, if any.
        code: Option<i32>,
    },
    /// Waiting on the child process failed at the OS level.
    Wait {
        /// OS error description.
        reason: String,
    },
}

impl Display for ProcessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reported { message } => write!(f, "node reported: {message}"),
            Self::Exited { code: Some(code) } => write!(f, "node exited with code {code}"),
            Self::Exited { code: None } => write!(f, "node terminated by signal"),
            Self::Wait { reason } => write!(f, "wait error: {reason}"),
        }
    }
}

impl std::error::Error for ProcessError {}

impl From<ProcessError> for AppError {
    fn from(err: ProcessError) -> Self {
        Self::Process(err.to_string())
    }
}
