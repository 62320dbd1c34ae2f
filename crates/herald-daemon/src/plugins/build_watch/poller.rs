//! Fetches the build snapshot for one cycle

use super::provider::ErasedCiClient;
use super::types::BuildRecord;
use globset::GlobSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of one poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Builds ordered most recently finished first, after branch filtering
    Fresh(Vec<BuildRecord>),
    /// The backend could not be reached or answered with garbage
    Unavailable,
}

impl PollOutcome {
    /// Builds in this outcome; empty when the poll failed
    pub fn builds(&self) -> &[BuildRecord] {
        match self {
            Self::Fresh(builds) => builds,
            Self::Unavailable => &[],
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

/// Polls the CI backend. Never returns an error: failures become
/// [`PollOutcome::Unavailable`] so the caller can skip the cycle.
#[derive(Debug, Clone)]
pub struct Poller {
    client: Arc<dyn ErasedCiClient>,
    limit: u32,
    branch_matcher: Option<GlobSet>,
}

impl Poller {
    pub fn new(client: Arc<dyn ErasedCiClient>, limit: u32, branch_matcher: Option<GlobSet>) -> Self {
        Self {
            client,
            limit,
            branch_matcher,
        }
    }

    pub async fn poll(&self) -> PollOutcome {
        let builds = match self.client.list_builds(self.limit).await {
            Ok(builds) => builds,
            Err(e) => {
                warn!("Failed to fetch builds from {}: {e}", self.client.provider_name());
                return PollOutcome::Unavailable;
            }
        };

        let total = builds.len();
        let builds: Vec<BuildRecord> = match &self.branch_matcher {
            Some(matcher) => builds
                .into_iter()
                .filter(|b| matcher.is_match(&b.branch))
                .collect(),
            None => builds,
        };
        if builds.len() != total {
            debug!(
                "Branch filter kept {} of {total} build(s)",
                builds.len()
            );
        }

        PollOutcome::Fresh(builds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::build_watch::mock::{MockCiClient, create_test_build};
    use crate::plugins::build_watch::types::BuildState;
    use globset::{Glob, GlobSetBuilder};

    #[tokio::test]
    async fn test_poll_returns_snapshot_in_order() {
        let client = MockCiClient::new();
        client.push_snapshot(vec![
            create_test_build(3, "acme/a", BuildState::Passed),
            create_test_build(2, "acme/b", BuildState::Started),
        ]);

        let poller = Poller::new(Arc::new(client), 25, None);
        let outcome = poller.poll().await;
        let ids: Vec<u64> = outcome.builds().iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![3, 2]);
        assert!(!outcome.is_failure());
    }

    #[tokio::test]
    async fn test_poll_failure_is_unavailable() {
        let client = MockCiClient::new();
        client.push_failure("connection reset");

        let poller = Poller::new(Arc::new(client), 25, None);
        let outcome = poller.poll().await;
        assert_eq!(outcome, PollOutcome::Unavailable);
        assert!(outcome.builds().is_empty());
    }

    #[tokio::test]
    async fn test_poll_applies_limit_and_branch_filter() {
        let client = MockCiClient::new();
        let mut feature = create_test_build(3, "acme/a", BuildState::Passed);
        feature.branch = "feature/x".to_string();
        client.push_snapshot(vec![
            create_test_build(4, "acme/a", BuildState::Passed),
            feature,
            create_test_build(2, "acme/a", BuildState::Passed),
        ]);

        let mut builder = GlobSetBuilder::new();
        builder.add(Glob::new("main").unwrap());
        let poller = Poller::new(Arc::new(client), 2, Some(builder.build().unwrap()));

        let ids: Vec<u64> = poller.poll().await.builds().iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![4]);
    }
}
