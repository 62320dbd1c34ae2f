//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Complete configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core configuration
    #[serde(default)]
    pub core: CoreConfig,
    /// Tokens for the CI, artifact and chat backends
    #[serde(default)]
    pub credentials: CredentialsConfig,
    /// Plugin-specific configuration sections: [plugins.<name>]
    #[serde(default)]
    pub plugins: HashMap<String, toml::Table>,
}

/// Core configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Directory holding `repos.json` and `users.json`
    /// (default: ~/.config/ci-herald)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_dir: Option<PathBuf>,
}

/// Backend credentials
///
/// `Debug` redacts every secret.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub travis_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bintray_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bintray_key: Option<String>,
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(v: &Option<String>) -> &'static str {
            if v.is_some() { "<redacted>" } else { "<unset>" }
        }
        f.debug_struct("CredentialsConfig")
            .field("travis_token", &redact(&self.travis_token))
            .field("discord_token", &redact(&self.discord_token))
            .field("bintray_user", &self.bintray_user)
            .field("bintray_key", &redact(&self.bintray_key))
            .finish()
    }
}

impl Config {
    /// Get a plugin's configuration section by name.
    /// Returns None if the plugin has no config section.
    pub fn plugin_config(&self, name: &str) -> Option<&toml::Table> {
        self.plugins.get(name)
    }
}
