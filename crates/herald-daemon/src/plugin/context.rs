use ci_herald_core::Registry;
use ci_herald_core::config::Config;
use std::sync::Arc;

/// Shared services available to plugins during init and runtime
#[derive(Clone)]
pub struct PluginContext {
    /// Resolved application configuration
    pub config: Arc<Config>,
    /// Repository → destination and login → identity lookups
    pub registry: Arc<dyn Registry>,
}

impl PluginContext {
    pub fn new(config: Arc<Config>, registry: Arc<dyn Registry>) -> Self {
        Self { config, registry }
    }

    /// Get a plugin's `[plugins.<name>]` table
    pub fn plugin_config(&self, name: &str) -> Option<&toml::Table> {
        self.config.plugin_config(name)
    }
}
