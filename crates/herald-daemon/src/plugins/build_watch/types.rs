//! Shared types for the build-watch engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a CI build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildState {
    /// Build record exists but has not been scheduled
    Created,
    /// Build is waiting for a worker
    Queued,
    /// Build is running
    Started,
    /// Build finished successfully
    Passed,
    /// Build finished with failing tests
    Failed,
    /// Build could not complete (infrastructure or config error)
    Errored,
    /// Build was canceled before finishing
    Canceled,
}

impl BuildState {
    /// Whether the build has finished and will not change state on its own
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Passed | Self::Failed | Self::Errored | Self::Canceled
        )
    }

    /// Parse a CI backend state name.
    ///
    /// Accepts the Travis names plus a few common aliases; returns `None` for
    /// anything unrecognized.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "created" => Some(Self::Created),
            "queued" | "received" | "pending" => Some(Self::Queued),
            "started" | "ongoing" | "running" | "in_progress" => Some(Self::Started),
            "passed" | "success" | "succeeded" => Some(Self::Passed),
            "failed" | "failure" => Some(Self::Failed),
            "errored" | "error" => Some(Self::Errored),
            "canceled" | "cancelled" => Some(Self::Canceled),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Queued => "queued",
            Self::Started => "started",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Errored => "errored",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed build instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    /// Backend-assigned stable identifier
    pub id: u64,
    /// Human-facing build number
    pub number: String,
    /// Repository slug (`owner/name`)
    pub repo_slug: String,
    /// Branch the build ran on
    pub branch: String,
    /// Current state
    pub state: BuildState,
    /// Commit SHA
    pub commit_sha: String,
    /// Commit message, when the backend provides one
    pub commit_message: Option<String>,
    /// Login of whoever triggered the build
    pub triggered_by: String,
    /// Completion timestamp (ISO 8601); `None` while running
    pub finished_at: Option<String>,
    /// Git tag the build ran for, if any
    pub tag: Option<String>,
    /// Web URL of the build page
    pub url: String,
}

impl BuildRecord {
    /// Repository name without the owner
    pub fn repo_name(&self) -> &str {
        self.repo_slug
            .split_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.repo_slug)
    }

    /// First non-empty line of the commit message
    pub fn commit_summary(&self) -> Option<&str> {
        self.commit_message
            .as_deref()
            .and_then(|m| m.lines().map(str::trim).find(|l| !l.is_empty()))
    }

    /// Abbreviated commit SHA
    pub fn short_sha(&self) -> &str {
        self.commit_sha.get(..7).unwrap_or(&self.commit_sha)
    }
}

/// A detected change in a build's state between two polls
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// The build as observed in the latest snapshot
    pub build: BuildRecord,
    /// State recorded before this poll; `None` for a newly seen build
    pub previous_state: Option<BuildState>,
}

impl Transition {
    pub fn new_state(&self) -> BuildState {
        self.build.state
    }
}

/// A published artifact file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    /// File name
    pub name: String,
    /// Path within the artifact repository
    pub path: String,
    /// Download link
    pub url: String,
}

/// Link rendered alongside a chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAttachment {
    pub name: String,
    pub url: String,
}

/// A formatted, destination-agnostic chat notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub title: String,
    pub url: String,
    /// 24-bit RGB severity marker
    pub color: u32,
    pub description: String,
    pub attachments: Vec<MessageAttachment>,
    /// RFC 3339 timestamp
    pub timestamp: String,
}
