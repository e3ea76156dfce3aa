//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::node::spawner::NodeConfig;
use crate::{AppError, Result};

/// Keyring service under which node credentials are stored.
pub const KEYRING_SERVICE: &str = "peer-bridge";

/// Peer node launch settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct NodeSection {
    /// Path to the peer node executable.
    pub binary_path: PathBuf,
    /// Network port for the node.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Node name, also used as the agent's log namespace.
    pub name: String,
}

/// Behaviour of the agent role.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponderKind {
    /// Reply with the received payload.
    #[default]
    Echo,
    /// Reply with the configured prompt payload.
    Prompt,
}

/// Agent role settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentSection {
    /// How inbound messages are answered.
    #[serde(default)]
    pub responder: ResponderKind,
    /// Prompt text attached to `prompt` responses.
    #[serde(default = "default_prompt")]
    pub prompt: String,
    /// Readiness deadline after start; 0 waits forever.
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_seconds: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            responder: ResponderKind::default(),
            prompt: default_prompt(),
            ready_timeout_seconds: default_ready_timeout(),
        }
    }
}

/// Peer monitor role settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MonitorSection {
    /// Seconds between peer summaries.
    #[serde(default = "default_monitor_interval")]
    pub interval_seconds: u64,
    /// Seconds without an announcement before a peer is forgotten; 0 keeps
    /// every peer.
    #[serde(default = "default_peer_ttl")]
    pub peer_ttl_seconds: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            interval_seconds: default_monitor_interval(),
            peer_ttl_seconds: default_peer_ttl(),
        }
    }
}

fn default_port() -> u16 {
    8000
}

fn default_name() -> String {
    "default-agent".into()
}

fn default_ready_timeout() -> u64 {
    30
}

fn default_monitor_interval() -> u64 {
    10
}

fn default_peer_ttl() -> u64 {
    600
}

fn default_prompt() -> String {
    "Provide a clear and concise market update based on the provided data.\n\n\
     Guidelines:\n\
     - Focus on key market movements and trends\n\
     - Use precise numbers for market caps (in millions/billions)\n\
     - Include significant news that impacts the market\n\
     - Use cashtags for token symbols\n\
     - Keep response under 800 characters\n\
     - Use line breaks for readability\n\
     - Only use data from the provided market update"
        .into()
}

/// Global configuration parsed from `config.toml` or the environment.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Peer node launch settings.
    pub node: NodeSection,
    /// Agent role settings.
    #[serde(default)]
    pub agent: AgentSection,
    /// Monitor role settings.
    #[serde(default)]
    pub monitor: MonitorSection,
    /// Node private key (populated at runtime, never read from TOML).
    #[serde(skip)]
    pub private_key: Option<String>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from `P2P_NODE_PATH`, `P2P_PORT` and `AGENT_NAME`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `P2P_NODE_PATH` is unset, `P2P_PORT` is
    /// not a valid port, or validation fails.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let binary_path = lookup("P2P_NODE_PATH")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Config("P2P_NODE_PATH must be set".into()))?;

        let mut config = Self {
            node: NodeSection {
                binary_path: PathBuf::from(binary_path),
                port: default_port(),
                name: default_name(),
            },
            agent: AgentSection::default(),
            monitor: MonitorSection::default(),
            private_key: None,
        };
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Let `P2P_NODE_PATH`, `P2P_PORT` and `AGENT_NAME` override file values.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if an override is invalid.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Load the node private key from the OS keychain with env-var fallback.
    ///
    /// Tries the `peer-bridge` keyring entry `<name>_private_key` first, then
    /// `P2P_PRIVATE_KEY`. A missing key is not an error; the node then starts
    /// without `--private-key`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the keychain lookup task panics.
    pub async fn load_credentials(&mut self) -> Result<()> {
        let entry = format!("{}_private_key", self.node.name);
        self.private_key = load_credential(&entry, "P2P_PRIVATE_KEY").await?;
        Ok(())
    }

    /// Launch settings for the bridge.
    #[must_use]
    pub fn node_config(&self) -> NodeConfig {
        NodeConfig {
            binary_path: self.node.binary_path.clone(),
            port: self.node.port,
            name: self.node.name.clone(),
            private_key: self.private_key.clone(),
        }
    }

    /// Readiness deadline, or `None` to wait without limit.
    #[must_use]
    pub fn ready_timeout(&self) -> Option<Duration> {
        match self.agent.ready_timeout_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Interval between peer monitor summaries.
    #[must_use]
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.interval_seconds)
    }

    /// Peer eviction age for the monitor, or `None` to keep every peer.
    #[must_use]
    pub fn peer_ttl(&self) -> Option<Duration> {
        match self.monitor.peer_ttl_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = lookup("P2P_NODE_PATH").filter(|v| !v.is_empty()) {
            self.node.binary_path = PathBuf::from(path);
        }
        if let Some(port) = lookup("P2P_PORT").filter(|v| !v.is_empty()) {
            self.node.port = port
                .parse()
                .map_err(|err| AppError::Config(format!("invalid P2P_PORT {port:?}: {err}")))?;
        }
        if let Some(name) = lookup("AGENT_NAME").filter(|v| !v.is_empty()) {
            self.node.name = name;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.node.port == 0 {
            return Err(AppError::Config("node.port must be greater than zero".into()));
        }

        if self.node.name.trim().is_empty() {
            return Err(AppError::Config("node.name must not be empty".into()));
        }

        if self.node.binary_path.as_os_str().is_empty() {
            return Err(AppError::Config("node.binary_path must not be empty".into()));
        }

        if self.monitor.interval_seconds == 0 {
            return Err(AppError::Config(
                "monitor.interval_seconds must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

/// Load a single optional credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<Option<String>> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(Some(value)),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(keyring::Error::NoEntry) => {
            debug!(key = keyring_key, "no keychain entry, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    Ok(env::var(env_key).ok().filter(|v| !v.is_empty()))
}
