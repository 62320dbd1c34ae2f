//! Main daemon event loop

use crate::plugin::PluginContext;
use crate::plugins::build_watch::BuildWatchPlugin;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Bound on the plugin's `shutdown()`
const PLUGIN_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Run the daemon until `cancel` fires.
///
/// 1. Initializes the build watch; an init failure aborts before any poll
/// 2. Runs its loop until cancellation
/// 3. Shuts it down, bounded by [`PLUGIN_SHUTDOWN_TIMEOUT`]
///
/// # Errors
///
/// Returns an error if initialization, the loop, or shutdown fails.
pub async fn run(
    plugin: &mut BuildWatchPlugin,
    ctx: &PluginContext,
    cancel: CancellationToken,
) -> Result<()> {
    plugin
        .init(ctx)
        .await
        .context("Failed to initialize build watch")?;

    info!("Build watch starting");
    let outcome = plugin.run(cancel).await;
    match &outcome {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => error!("Build watch failed: {e}"),
    }

    match timeout(PLUGIN_SHUTDOWN_TIMEOUT, plugin.shutdown()).await {
        Ok(result) => result.context("Build watch shutdown failed")?,
        Err(_) => warn!("Build watch shutdown timed out after {PLUGIN_SHUTDOWN_TIMEOUT:?}"),
    }

    outcome.context("Build watch loop failed")?;
    info!("Daemon stopped");
    Ok(())
}
