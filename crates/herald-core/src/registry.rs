//! Repository → destination registry
//!
//! The registry is owned by the channel-linking workflow, which persists two
//! JSON objects in the registry directory:
//!
//! - `repos.json`: chat channel id → repository slug (`owner/name`)
//! - `users.json`: CI login → chat user id
//!
//! The reconciliation engine only reads it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// File name of the channel → repository map
pub const REPOS_FILE: &str = "repos.json";
/// File name of the login → chat user map
pub const USERS_FILE: &str = "users.json";

/// Registry load errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read registry file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed registry file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Chat location that receives notifications for one repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination(pub String);

impl Destination {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Chat user linked to a CI login
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatIdentity(pub String);

impl ChatIdentity {
    /// Render as an in-message mention
    pub fn mention(&self) -> String {
        format!("<@{}>", self.0)
    }
}

/// Read-only lookups the engine performs against the registry
pub trait Registry: Send + Sync + fmt::Debug {
    /// Destination linked to `repo_slug`, if any
    fn resolve_destination(&self, repo_slug: &str) -> Option<Destination>;

    /// Chat identity linked to a CI login, if any
    fn resolve_identity(&self, login: &str) -> Option<ChatIdentity>;
}

/// Check a repository slug of the form `owner/name`.
///
/// Each half may contain ASCII letters, digits, `-`, `_` and `.`.
pub fn is_valid_slug(slug: &str) -> bool {
    fn valid_part(part: &str) -> bool {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    }

    match slug.split_once('/') {
        Some((owner, name)) => valid_part(owner) && valid_part(name),
        None => false,
    }
}

/// Registry backed by `repos.json` / `users.json`
#[derive(Debug, Clone, Default)]
pub struct FileRegistry {
    /// Lowercased slug → destination
    destinations: HashMap<String, Destination>,
    /// Lowercased login → chat identity
    identities: HashMap<String, ChatIdentity>,
}

impl FileRegistry {
    /// Load both registry files from `dir`.
    ///
    /// Missing files load as empty maps.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError` if a file exists but cannot be read or parsed.
    pub fn load(dir: &Path) -> Result<Self, RegistryError> {
        let repos = read_map(&dir.join(REPOS_FILE))?;
        let users = read_map(&dir.join(USERS_FILE))?;
        let registry = Self::from_maps(repos, users);
        debug!(
            "Loaded registry from {}: {} repositories, {} identities",
            dir.display(),
            registry.destinations.len(),
            registry.identities.len()
        );
        Ok(registry)
    }

    /// Build from in-memory maps: `repos` is channel → slug, `users` is login → chat id.
    ///
    /// Invalid slugs are skipped. When one slug is linked to several channels
    /// the lowest channel id wins.
    pub fn from_maps<R, U>(repos: R, users: U) -> Self
    where
        R: IntoIterator<Item = (String, String)>,
        U: IntoIterator<Item = (String, String)>,
    {
        let ordered: BTreeMap<String, String> = repos.into_iter().collect();
        let mut destinations = HashMap::new();
        for (channel, slug) in ordered {
            if !is_valid_slug(&slug) {
                warn!("Ignoring registry entry {channel} -> '{slug}': invalid repository slug");
                continue;
            }
            let key = slug.to_ascii_lowercase();
            if let Some(existing) = destinations.get(&key) {
                warn!("Repository {slug} is linked to several channels; keeping {existing}");
                continue;
            }
            destinations.insert(key, Destination(channel));
        }

        let identities = users
            .into_iter()
            .map(|(login, id)| (login.to_ascii_lowercase(), ChatIdentity(id)))
            .collect();

        Self {
            destinations,
            identities,
        }
    }

    /// Number of linked repositories
    pub fn repository_count(&self) -> usize {
        self.destinations.len()
    }
}

impl Registry for FileRegistry {
    fn resolve_destination(&self, repo_slug: &str) -> Option<Destination> {
        self.destinations
            .get(&repo_slug.to_ascii_lowercase())
            .cloned()
    }

    fn resolve_identity(&self, login: &str) -> Option<ChatIdentity> {
        self.identities.get(&login.to_ascii_lowercase()).cloned()
    }
}

fn read_map(path: &Path) -> Result<HashMap<String, String>, RegistryError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content = std::fs::read(path).map_err(|source| RegistryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&content).map_err(|source| RegistryError::Json {
        path: path.to_path_buf(),
        source,
    })
}
