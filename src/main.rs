#![forbid(unsafe_code)]

//! `peer-agent`: runs one agent or peer monitor on top of a peer node.
//!
//! Bootstraps configuration and tracing, starts the selected role, and stops
//! the node on SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use peer_bridge::agent::{Agent, EchoResponder, PromptResponder, Responder};
use peer_bridge::config::{GlobalConfig, ResponderKind};
use peer_bridge::monitor::run_monitor;
use peer_bridge::{AppError, PeerBridge, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum Role {
    /// Answer inbound peer messages.
    Agent,
    /// Log discovered peers.
    Monitor,
}

#[derive(Debug, Parser)]
#[command(name = "peer-agent", about = "Peer network agent host", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Without it, configuration is
    /// read from `P2P_NODE_PATH`, `P2P_PORT` and `AGENT_NAME`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Role to run.
    #[arg(long, value_enum, default_value_t = Role::Agent)]
    role: Role,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("peer-agent bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = GlobalConfig::load_from_path(path)?;
            config.apply_env_overrides()?;
            config
        }
        None => GlobalConfig::from_env()?,
    };
    config.load_credentials().await?;
    info!(name = %config.node.name, port = config.node.port, "configuration loaded");

    let bridge = Arc::new(PeerBridge::new(config.node_config()));
    let ct = CancellationToken::new();

    let role_ct = ct.clone();
    let role_bridge = Arc::clone(&bridge);
    let role_config = config.clone();
    let role = args.role;
    let mut role_handle = tokio::spawn(async move {
        match role {
            Role::Agent => {
                let responder: Arc<dyn Responder> = match role_config.agent.responder {
                    ResponderKind::Echo => Arc::new(EchoResponder),
                    ResponderKind::Prompt => {
                        Arc::new(PromptResponder::new(role_config.agent.prompt.clone()))
                    }
                };
                Agent::new(role_bridge, responder)
                    .run(role_config.ready_timeout(), role_ct)
                    .await
            }
            Role::Monitor => {
                run_monitor(
                    role_bridge,
                    role_config.monitor_interval(),
                    role_config.peer_ttl(),
                    role_config.ready_timeout(),
                    role_ct,
                )
                .await
            }
        }
    });

    // ── Wait for shutdown signal or role exit ───────────
    let outcome = tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown signal received");
            ct.cancel();
            role_handle.await
        }
        outcome = &mut role_handle => outcome,
    };

    bridge.stop();

    match outcome {
        Ok(Ok(())) => {
            info!("peer-agent shut down");
            Ok(())
        }
        Ok(Err(err)) => {
            error!(%err, "role failed");
            Err(err)
        }
        Err(err) => Err(AppError::Process(format!("role task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
