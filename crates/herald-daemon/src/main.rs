//! ci-herald daemon - watches CI builds and reports them to chat

use anyhow::{Context, Result};
use ci_herald_core::FileRegistry;
use ci_herald_core::config::{ConfigOverrides, resolve_config};
use ci_herald_core::home::{default_config_dir, get_home_dir};
use ci_herald_daemon::daemon;
use ci_herald_daemon::plugin::PluginContext;
use ci_herald_daemon::plugins::build_watch::BuildWatchPlugin;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// ci-herald daemon - posts CI build state changes to chat
#[derive(Parser, Debug)]
#[command(name = "herald-daemon")]
#[command(about = "Posts CI build state changes and artifact links to chat")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory holding repos.json and users.json
    #[arg(long, value_name = "PATH")]
    registry_dir: Option<PathBuf>,

    /// Travis CI API token
    #[arg(long, value_name = "TOKEN")]
    travis_token: Option<String>,

    /// Discord bot token
    #[arg(long, value_name = "TOKEN")]
    discord_token: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Resolve once SIGINT or SIGTERM arrives
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
                return;
            }
            Err(e) => warn!("Cannot listen for SIGTERM: {e}; only Ctrl+C will stop the daemon"),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C"),
        Err(e) => {
            warn!("Cannot listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.verbose {
        ci_herald_core::logging::init_with_level(tracing::Level::DEBUG);
    } else {
        ci_herald_core::logging::init();
    }

    info!("herald-daemon {} starting", env!("CARGO_PKG_VERSION"));

    let home_dir = get_home_dir().context("Failed to determine home directory")?;
    let current_dir = std::env::current_dir().context("Failed to get current directory")?;

    let overrides = ConfigOverrides {
        config_path: args.config,
        registry_dir: args.registry_dir,
        travis_token: args.travis_token,
        discord_token: args.discord_token,
    };
    let config = resolve_config(&overrides, &current_dir, &home_dir)
        .context("Failed to resolve configuration")?;

    let registry_dir = config
        .core
        .registry_dir
        .clone()
        .unwrap_or_else(|| default_config_dir(&home_dir));
    let registry = FileRegistry::load(&registry_dir).with_context(|| {
        format!("Failed to load registry from {}", registry_dir.display())
    })?;
    info!(
        "Registry: {} linked repositories ({})",
        registry.repository_count(),
        registry_dir.display()
    );

    let plugin_ctx = PluginContext::new(Arc::new(config), Arc::new(registry));

    let mut plugin = BuildWatchPlugin::new();

    let cancel = CancellationToken::new();
    let cancel_for_signals = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        cancel_for_signals.cancel();
    });

    daemon::run(&mut plugin, &plugin_ctx, cancel)
        .await
        .context("Daemon event loop failed")?;

    info!("herald-daemon shutdown complete");
    Ok(())
}
