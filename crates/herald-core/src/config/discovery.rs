//! Configuration discovery and resolution

use super::types::Config;
use crate::home::default_config_dir;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error
    #[error("TOML parsing error in {path}: {source}")]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Command-line overrides for configuration
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    /// Explicit config file; replaces global and repo-local discovery
    pub config_path: Option<PathBuf>,
    /// Override registry directory
    pub registry_dir: Option<PathBuf>,
    /// Override Travis API token
    pub travis_token: Option<String>,
    /// Override Discord bot token
    pub discord_token: Option<String>,
}

/// Resolve configuration from all sources
///
/// Priority (highest to lowest):
/// 1. Command-line overrides
/// 2. Environment variables
/// 3. Repo-local config (.herald.toml in current dir or up to the git root)
/// 4. Global config (~/.config/ci-herald/config.toml)
/// 5. Defaults
///
/// Discovered files that fail to parse are skipped with a warning. A file
/// named explicitly through `overrides.config_path` must load.
pub fn resolve_config(
    overrides: &ConfigOverrides,
    current_dir: &Path,
    home_dir: &Path,
) -> Result<Config, ConfigError> {
    let mut config = Config::default();

    if let Some(path) = &overrides.config_path {
        merge_config(&mut config, load_config_file(path)?);
    } else {
        let global_config_path = default_config_dir(home_dir).join("config.toml");
        if global_config_path.exists() {
            match load_config_file(&global_config_path) {
                Ok(file_config) => merge_config(&mut config, file_config),
                Err(e) => warn!("Skipping global config: {e}"),
            }
        }

        if let Some(repo_config) = find_repo_local_config(current_dir) {
            match load_config_file(&repo_config) {
                Ok(file_config) => merge_config(&mut config, file_config),
                Err(e) => warn!("Skipping repo config: {e}"),
            }
        }
    }

    apply_env_overrides(&mut config);
    apply_cli_overrides(&mut config, overrides);

    Ok(config)
}

/// Find repo-local config file
///
/// Searches current directory and parent directories up to git root
fn find_repo_local_config(current_dir: &Path) -> Option<PathBuf> {
    let mut dir = current_dir;

    loop {
        let config_path = dir.join(".herald.toml");
        if config_path.exists() {
            return Some(config_path);
        }

        if dir.join(".git").exists() {
            break;
        }

        dir = dir.parent()?;
    }

    None
}

fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Merge file config into base config; later files win per key
fn merge_config(base: &mut Config, file: Config) {
    if file.core.registry_dir.is_some() {
        base.core.registry_dir = file.core.registry_dir;
    }

    let creds = file.credentials;
    if creds.travis_token.is_some() {
        base.credentials.travis_token = creds.travis_token;
    }
    if creds.discord_token.is_some() {
        base.credentials.discord_token = creds.discord_token;
    }
    if creds.bintray_user.is_some() {
        base.credentials.bintray_user = creds.bintray_user;
    }
    if creds.bintray_key.is_some() {
        base.credentials.bintray_key = creds.bintray_key;
    }

    for (name, table) in file.plugins {
        match base.plugins.get_mut(&name) {
            Some(existing) => merge_table(existing, table),
            None => {
                base.plugins.insert(name, table);
            }
        }
    }
}

/// Overlay `overlay` onto `base` key by key; nested tables merge, anything
/// else replaces
fn merge_table(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(nested)) => {
                merge_table(existing, nested);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn apply_env_overrides(config: &mut Config) {
    if let Some(dir) = env_nonempty("HERALD_REGISTRY_DIR") {
        config.core.registry_dir = Some(PathBuf::from(dir));
    }
    if let Some(token) = env_nonempty("HERALD_TRAVIS_TOKEN") {
        config.credentials.travis_token = Some(token);
    }
    if let Some(token) = env_nonempty("HERALD_DISCORD_TOKEN") {
        config.credentials.discord_token = Some(token);
    }
    if let Some(user) = env_nonempty("HERALD_BINTRAY_USER") {
        config.credentials.bintray_user = Some(user);
    }
    if let Some(key) = env_nonempty("HERALD_BINTRAY_KEY") {
        config.credentials.bintray_key = Some(key);
    }
}

fn apply_cli_overrides(config: &mut Config, overrides: &ConfigOverrides) {
    if let Some(ref dir) = overrides.registry_dir {
        config.core.registry_dir = Some(dir.clone());
    }
    if let Some(ref token) = overrides.travis_token {
        config.credentials.travis_token = Some(token.clone());
    }
    if let Some(ref token) = overrides.discord_token {
        config.credentials.discord_token = Some(token.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    fn write_global(home: &Path, contents: &str) {
        let dir = default_config_dir(home);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.toml"), contents).unwrap();
    }

    #[test]
    #[serial]
    fn test_defaults_when_nothing_configured() {
        let home = TempDir::new().unwrap();
        let cwd = TempDir::new().unwrap();

        let config = resolve_config(&ConfigOverrides::default(), cwd.path(), home.path()).unwrap();
        assert!(config.core.registry_dir.is_none());
        assert!(config.plugins.is_empty());
    }

    #[test]
    #[serial]
    fn test_repo_local_overrides_global() {
        let home = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        std::fs::create_dir(repo.path().join(".git")).unwrap();
        let nested = repo.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        write_global(
            home.path(),
            r#"
[credentials]
travis_token = "global-token"
discord_token = "global-discord"

[plugins.build_watch]
poll_interval_secs = 60
"#,
        );
        std::fs::write(
            repo.path().join(".herald.toml"),
            r#"
[credentials]
travis_token = "repo-token"

[plugins.build_watch]
poll_interval_secs = 15
"#,
        )
        .unwrap();

        let config = resolve_config(&ConfigOverrides::default(), &nested, home.path()).unwrap();
        assert_eq!(config.credentials.travis_token.as_deref(), Some("repo-token"));
        assert_eq!(config.credentials.discord_token.as_deref(), Some("global-discord"));
        let watch = config.plugin_config("build_watch").unwrap();
        assert_eq!(
            watch.get("poll_interval_secs").and_then(|v| v.as_integer()),
            Some(15)
        );
    }

    #[test]
    fn test_merge_table_keeps_unset_keys() {
        let mut base: toml::Table = toml::from_str(
            r#"
poll_interval_secs = 60
[artifacts]
subject = "acme"
repo = "maven"
"#,
        )
        .unwrap();
        let overlay: toml::Table = toml::from_str(
            r#"
notify_canceled = true
[artifacts]
repo = "snapshots"
"#,
        )
        .unwrap();

        merge_table(&mut base, overlay);
        assert_eq!(base["poll_interval_secs"].as_integer(), Some(60));
        assert_eq!(base["notify_canceled"].as_bool(), Some(true));
        assert_eq!(base["artifacts"]["subject"].as_str(), Some("acme"));
        assert_eq!(base["artifacts"]["repo"].as_str(), Some("snapshots"));
    }

    #[test]
    #[serial]
    fn test_repo_local_plugin_keys_merge_with_global() {
        let home = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        std::fs::create_dir(repo.path().join(".git")).unwrap();

        write_global(
            home.path(),
            r#"
[plugins.build_watch.artifacts]
subject = "acme"
repo = "maven"
"#,
        );
        std::fs::write(
            repo.path().join(".herald.toml"),
            "[plugins.build_watch]\nnotify_canceled = true\n",
        )
        .unwrap();

        let config =
            resolve_config(&ConfigOverrides::default(), repo.path(), home.path()).unwrap();
        let watch = config.plugin_config("build_watch").unwrap();
        assert_eq!(watch["notify_canceled"].as_bool(), Some(true));
        assert_eq!(watch["artifacts"]["subject"].as_str(), Some("acme"));
    }

    #[test]
    #[serial]
    fn test_malformed_global_config_is_skipped() {
        let home = TempDir::new().unwrap();
        let cwd = TempDir::new().unwrap();
        write_global(home.path(), "invalid toml [[[");

        let config = resolve_config(&ConfigOverrides::default(), cwd.path(), home.path());
        assert!(config.is_ok());
    }

    #[test]
    #[serial]
    fn test_explicit_config_path_must_load() {
        let home = TempDir::new().unwrap();
        let cwd = TempDir::new().unwrap();
        let overrides = ConfigOverrides {
            config_path: Some(cwd.path().join("missing.toml")),
            ..Default::default()
        };

        let err = resolve_config(&overrides, cwd.path(), home.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));

        let bad = cwd.path().join("bad.toml");
        std::fs::write(&bad, "[core\n").unwrap();
        let overrides = ConfigOverrides {
            config_path: Some(bad),
            ..Default::default()
        };
        let err = resolve_config(&overrides, cwd.path(), home.path()).unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse { .. }));
    }

    #[test]
    #[serial]
    fn test_env_then_cli_precedence() {
        let home = TempDir::new().unwrap();
        let cwd = TempDir::new().unwrap();
        write_global(
            home.path(),
            r#"
[credentials]
travis_token = "file-token"
"#,
        );

        unsafe {
            env::set_var("HERALD_TRAVIS_TOKEN", "env-token");
            env::set_var("HERALD_REGISTRY_DIR", "/env/registry");
        }

        let config = resolve_config(&ConfigOverrides::default(), cwd.path(), home.path()).unwrap();
        assert_eq!(config.credentials.travis_token.as_deref(), Some("env-token"));
        assert_eq!(
            config.core.registry_dir,
            Some(PathBuf::from("/env/registry"))
        );

        let overrides = ConfigOverrides {
            travis_token: Some("cli-token".to_string()),
            registry_dir: Some(PathBuf::from("/cli/registry")),
            ..Default::default()
        };
        let config = resolve_config(&overrides, cwd.path(), home.path()).unwrap();
        assert_eq!(config.credentials.travis_token.as_deref(), Some("cli-token"));
        assert_eq!(
            config.core.registry_dir,
            Some(PathBuf::from("/cli/registry"))
        );

        unsafe {
            env::remove_var("HERALD_TRAVIS_TOKEN");
            env::remove_var("HERALD_REGISTRY_DIR");
        }
    }
}
