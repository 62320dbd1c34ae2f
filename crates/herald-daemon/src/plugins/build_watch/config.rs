//! Configuration for the build-watch plugin

use super::artifacts::BackoffPolicy;
use crate::plugin::PluginError;
use ci_herald_core::toml;
use globset::{GlobSet, GlobSetBuilder};
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_TRAVIS_ENDPOINT: &str = "https://api.travis-ci.com";
pub const DEFAULT_TRAVIS_WEB_URL: &str = "https://app.travis-ci.com";
pub const DEFAULT_DISCORD_ENDPOINT: &str = "https://discord.com/api/v10";
pub const DEFAULT_DISCORD_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";
pub const DEFAULT_BINTRAY_ENDPOINT: &str = "https://api.bintray.com";
pub const DEFAULT_BINTRAY_DOWNLOAD_URL: &str = "https://dl.bintray.com";

/// Artifact host settings, parsed from `[plugins.build_watch.artifacts]`
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactsConfig {
    /// API base URL
    pub endpoint: String,
    /// Base URL for download links
    pub download_url: String,
    /// Account owning the repository
    pub subject: String,
    /// Repository holding the packages
    pub repo: String,
    /// Repository name → published package name
    pub package_aliases: HashMap<String, String>,
    /// Retry schedule for empty listings
    pub backoff: BackoffPolicy,
}

impl ArtifactsConfig {
    fn from_toml(table: &toml::Table) -> Result<Self, PluginError> {
        let endpoint = table
            .get("endpoint")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_BINTRAY_ENDPOINT)
            .trim_end_matches('/')
            .to_string();

        let download_url = table
            .get("download_url")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_BINTRAY_DOWNLOAD_URL)
            .trim_end_matches('/')
            .to_string();

        let subject = table
            .get("subject")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        if subject.is_empty() {
            return Err(PluginError::config(
                "subject is required in [plugins.build_watch.artifacts]",
            ));
        }

        let repo = table
            .get("repo")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        if repo.is_empty() {
            return Err(PluginError::config(
                "repo is required in [plugins.build_watch.artifacts]",
            ));
        }

        let package_aliases = table
            .get("package_aliases")
            .and_then(|v| v.as_table())
            .map(|aliases| {
                aliases
                    .iter()
                    .filter_map(|(name, value)| {
                        value.as_str().map(|alias| (name.clone(), alias.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let defaults = BackoffPolicy::default();
        let backoff_table = table.get("backoff").and_then(|v| v.as_table());
        let backoff_int = |key: &str| -> Result<Option<u64>, PluginError> {
            match backoff_table.and_then(|t| t.get(key)).and_then(|v| v.as_integer()) {
                Some(v) if v < 0 => Err(PluginError::config(format!(
                    "backoff {key} must not be negative"
                ))),
                Some(v) => Ok(Some(v as u64)),
                None => Ok(None),
            }
        };

        let backoff = BackoffPolicy {
            initial_delay: backoff_int("initial_delay_ms")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_delay),
            factor: match backoff_int("factor")? {
                Some(f) => u32::try_from(f)
                    .map_err(|_| PluginError::config("backoff factor is too large"))?,
                None => defaults.factor,
            },
            max_delay: backoff_int("max_delay_ms")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
        };
        backoff.validate()?;

        Ok(Self {
            endpoint,
            download_url,
            subject,
            repo,
            package_aliases,
            backoff,
        })
    }
}

/// Configuration for the build-watch plugin, parsed from `[plugins.build_watch]`
#[derive(Debug, Clone)]
pub struct BuildWatchConfig {
    /// Whether the plugin is enabled
    pub enabled: bool,
    /// Polling interval in seconds
    pub poll_interval_secs: u64,
    /// Builds requested per poll
    pub build_limit: u32,
    /// Branches to watch (empty = all branches)
    pub watched_branches: Vec<String>,
    /// Send a message when a build is canceled
    pub notify_canceled: bool,
    /// Repository names listed in the presence text before "N more"
    pub presence_max_names: usize,
    /// Travis API base URL
    pub travis_endpoint: String,
    /// Travis web UI base URL, used for build links
    pub travis_web_url: String,
    /// Discord API base URL
    pub discord_endpoint: String,
    /// Discord gateway URL, used to publish presence
    pub discord_gateway_url: String,
    /// Artifact host; `None` disables artifact resolution
    pub artifacts: Option<ArtifactsConfig>,
    /// Compiled glob matcher for watched_branches (None = match all)
    pub branch_matcher: Option<GlobSet>,
}

impl BuildWatchConfig {
    /// Parse configuration from TOML table
    ///
    /// # Errors
    ///
    /// Returns `PluginError::Config` if:
    /// - `poll_interval_secs` is less than 5
    /// - `build_limit` is outside 1..=100
    /// - `presence_max_names` is 0
    /// - a `watched_branches` pattern is not a valid glob
    /// - the `artifacts` table is missing `subject`/`repo` or has an invalid backoff
    pub fn from_toml(table: &toml::Table) -> Result<Self, PluginError> {
        let enabled = table
            .get("enabled")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        let poll_interval_secs = table
            .get("poll_interval_secs")
            .and_then(|v| v.as_integer())
            .unwrap_or(10);
        if poll_interval_secs < 5 {
            return Err(PluginError::config(
                "poll_interval_secs must be at least 5 seconds",
            ));
        }

        let build_limit = table
            .get("build_limit")
            .and_then(|v| v.as_integer())
            .unwrap_or(25);
        if !(1..=100).contains(&build_limit) {
            return Err(PluginError::config(
                "build_limit must be between 1 and 100",
            ));
        }

        let watched_branches: Vec<String> = table
            .get("watched_branches")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let branch_matcher = if watched_branches.is_empty() {
            None
        } else {
            let mut builder = GlobSetBuilder::new();
            for pattern in &watched_branches {
                builder.add(globset::Glob::new(pattern).map_err(|e| {
                    PluginError::config(format!("Invalid glob pattern '{pattern}': {e}"))
                })?);
            }
            Some(
                builder
                    .build()
                    .map_err(|e| PluginError::config(format!("Failed to build glob set: {e}")))?,
            )
        };

        let notify_canceled = table
            .get("notify_canceled")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let presence_max_names = table
            .get("presence_max_names")
            .and_then(|v| v.as_integer())
            .unwrap_or(3);
        if presence_max_names < 1 {
            return Err(PluginError::config(
                "presence_max_names must be at least 1",
            ));
        }

        let url = |key: &str, default: &str| {
            table
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or(default)
                .trim_end_matches('/')
                .to_string()
        };

        let artifacts = table
            .get("artifacts")
            .and_then(|v| v.as_table())
            .map(ArtifactsConfig::from_toml)
            .transpose()?;

        Ok(Self {
            enabled,
            poll_interval_secs: poll_interval_secs as u64,
            build_limit: build_limit as u32,
            watched_branches,
            notify_canceled,
            presence_max_names: presence_max_names as usize,
            travis_endpoint: url("travis_endpoint", DEFAULT_TRAVIS_ENDPOINT),
            travis_web_url: url("travis_web_url", DEFAULT_TRAVIS_WEB_URL),
            discord_endpoint: url("discord_endpoint", DEFAULT_DISCORD_ENDPOINT),
            discord_gateway_url: url("discord_gateway_url", DEFAULT_DISCORD_GATEWAY_URL),
            artifacts,
            branch_matcher,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for BuildWatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 10,
            build_limit: 25,
            watched_branches: Vec::new(),
            notify_canceled: false,
            presence_max_names: 3,
            travis_endpoint: DEFAULT_TRAVIS_ENDPOINT.to_string(),
            travis_web_url: DEFAULT_TRAVIS_WEB_URL.to_string(),
            discord_endpoint: DEFAULT_DISCORD_ENDPOINT.to_string(),
            discord_gateway_url: DEFAULT_DISCORD_GATEWAY_URL.to_string(),
            artifacts: None,
            branch_matcher: None,
        }
    }
}
