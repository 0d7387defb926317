//! Trackgate device gateway – entry point.
//!
//! Terminates long-lived TCP connections from GPS/IoT trackers, keeps a live
//! directory of which device is on which connection, and answers the
//! keep-alive and alarm messages devices expect to be acknowledged.
//!
//! # Usage
//!
//! ```text
//! trackgate [OPTIONS]
//!
//! Options:
//!   --config <PATH>   TOML configuration file [default: trackgate.toml]
//!   --bind   <ADDR>   Listener IP address (overrides the config file)
//!   --port   <PORT>   Listener TCP port (overrides the config file)
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable            | Description                              |
//! |---------------------|------------------------------------------|
//! | `TRACKGATE_CONFIG`  | Configuration file path                  |
//! | `TRACKGATE_BIND`    | Listener IP address                      |
//! | `TRACKGATE_PORT`    | Listener TCP port                        |
//! | `RUST_LOG`          | Log filter; wins over `[logging] level`  |
//!
//! CLI args take precedence over environment variables, which take
//! precedence over the configuration file.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trackgate_server::infrastructure::network::{run_server, GatewayState};
use trackgate_server::infrastructure::storage::config::{load_config, AppConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Trackgate GPS/IoT tracker gateway.
#[derive(Debug, Parser)]
#[command(
    name = "trackgate",
    about = "TCP gateway for GPS/IoT trackers",
    version
)]
struct Cli {
    /// Path to the TOML configuration file.  A missing file means defaults.
    #[arg(long, default_value = "trackgate.toml", env = "TRACKGATE_CONFIG")]
    config: PathBuf,

    /// IP address to bind the device listener to.
    #[arg(long, env = "TRACKGATE_BIND")]
    bind: Option<String>,

    /// TCP port devices connect to.
    #[arg(long, env = "TRACKGATE_PORT")]
    port: Option<u16>,
}

impl Cli {
    /// Loads the configuration file and applies command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration is invalid.
    fn load_app_config(&self) -> anyhow::Result<AppConfig> {
        let mut config = load_config(&self.config)
            .with_context(|| format!("failed to load config from {}", self.config.display()))?;
        self.apply_overrides(&mut config);
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(bind) = &self.bind {
            config.gateway.bind_address = bind.clone();
        }
        if let Some(port) = self.port {
            config.gateway.port = port;
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed and the configuration file is loaded.
/// 2. `tracing_subscriber` is initialised.  `RUST_LOG` wins; otherwise the
///    `[logging] level` from the configuration is used.
/// 3. A Ctrl+C handler is spawned; it clears a shared `AtomicBool`.
/// 4. [`run_server`] binds the device port and accepts connections until the
///    flag is cleared.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_app_config()?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    let addr = config.gateway.socket_addr()?;
    let codebook = config.alarms.codebook()?;
    info!(
        "trackgate starting: listen={addr}, alarm bits configured={}",
        codebook.len()
    );
    let state = GatewayState::new(&config.gateway, codebook);

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(addr, state, running).await?;

    info!("trackgate stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
