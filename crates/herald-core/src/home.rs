//! Canonical home directory resolution for ci-herald
//!
//! # Precedence
//!
//! 1. `HERALD_HOME` environment variable (if set and non-empty)
//! 2. `dirs::home_dir()` platform default
//!
//! Integration tests should point `HERALD_HOME` at a temporary directory
//! rather than touching the real home directory.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Get the home directory for ci-herald operations
///
/// # Errors
///
/// Returns an error if `HERALD_HOME` is unset and the platform home directory
/// cannot be determined.
pub fn get_home_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("HERALD_HOME") {
        let trimmed = home.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }

    dirs::home_dir().context("Could not determine home directory")
}

/// Default directory holding `config.toml`, `repos.json` and `users.json`
pub fn default_config_dir(home_dir: &Path) -> PathBuf {
    home_dir.join(".config").join("ci-herald")
}
