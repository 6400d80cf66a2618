//! Music companion player (mwmc-player) - Main entry point
//!
//! Loads the bootstrap config and rule table, then runs the engine against a
//! recorded session until Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mwmc_common::config::{default_config_path, ConfigOverrides, TomlConfig};
use mwmc_player::audio::TracingSink;
use mwmc_player::catalog::TrackCatalog;
use mwmc_player::connection::ReplayConnector;
use mwmc_player::{Engine, EngineSettings};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for mwmc-player
#[derive(Parser, Debug)]
#[command(name = "mwmc-player")]
#[command(about = "Dynamic music for multiworld randomizer sessions")]
#[command(version)]
struct Args {
    /// Bootstrap config file (defaults to the platform config directory)
    #[arg(short, long, env = "MWMC_CONFIG")]
    config: Option<PathBuf>,

    /// Rule table, overrides `rules_path`
    #[arg(long, env = "MWMC_RULES")]
    rules: Option<PathBuf>,

    /// Folder prefixed onto relative track paths
    #[arg(long, env = "MWMC_MUSIC_ROOT")]
    music_root: Option<PathBuf>,

    /// JSON-lines recording of raw session messages to play back
    #[arg(long, env = "MWMC_REPLAY")]
    replay: PathBuf,

    /// Delay between replayed messages in milliseconds
    #[arg(long, default_value = "0")]
    replay_pace_ms: u64,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "MWMC_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let overrides = ConfigOverrides {
        rules_path: args.rules.clone(),
        music_root: args.music_root.clone(),
        log_level: args.log_level.clone(),
    };
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let config = if config_path.exists() || args.config.is_some() {
        TomlConfig::load(&config_path, overrides).context("Failed to load configuration")?
    } else {
        let rules = overrides.rules_path.clone().with_context(|| {
            format!(
                "No config file at {} and no --rules given",
                config_path.display()
            )
        })?;
        let mut config = TomlConfig::with_rules(rules);
        config.apply_overrides(overrides);
        config
    };

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(&config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting mwmc-player v{}", env!("CARGO_PKG_VERSION"));
    info!("Rule table: {}", config.rules_path.display());
    if let Some(root) = &config.music_root {
        info!("Music root: {}", root.display());
    }
    info!(
        "Session: slot '{}' at {} (replayed from {})",
        config.connection.slot,
        config.connection.address(),
        args.replay.display()
    );

    let catalog = Arc::new(
        TrackCatalog::load(&config.rules_path, config.music_root.as_deref())
            .context("Failed to load rule table")?,
    );
    let connector = ReplayConnector::load(&args.replay)
        .context("Failed to load session replay")?
        .with_pace(Duration::from_millis(args.replay_pace_ms));
    let sink = TracingSink::with_catalog(&catalog);

    let mut engine = Engine::start(
        catalog,
        Arc::new(sink),
        Arc::new(connector),
        EngineSettings::from(&config),
    );

    // No network client is attached; checks are only reported
    if let Some(mut rx) = engine.location_checks() {
        tokio::spawn(async move {
            while let Some(check) = rx.recv().await {
                info!(
                    "Location check requested: '{}' (epoch {})",
                    check.location, check.epoch
                );
            }
        });
    }

    shutdown_signal().await;
    engine.shutdown().await;

    info!("Shutdown complete");
    Ok(())
}

/// `mwmc_player=<level>,mwmc_common=<level>`
fn default_filter(level: &str) -> String {
    format!("mwmc_player={},mwmc_common={}", level, level)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
