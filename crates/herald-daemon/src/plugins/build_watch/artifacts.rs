//! Artifact lookup with bounded exponential backoff
//!
//! Artifacts are usually uploaded by the build's deploy step a little after
//! the build reports `passed`, so an empty listing is retried. Delays grow by
//! a constant factor and stop once the next delay would exceed the ceiling:
//! with the defaults (100 ms, ×5, 70 s) the waits are 100 ms, 500 ms,
//! 2.5 s, 12.5 s and 62.5 s, six lookups in total.

use super::provider::ErasedArtifactClient;
use super::types::{ArtifactFile, BuildRecord};
use crate::plugin::PluginError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry schedule for artifact lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Wait before the first retry
    pub initial_delay: Duration,
    /// Multiplier applied after each retry
    pub factor: u32,
    /// No single wait may exceed this
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            factor: 5,
            max_delay: Duration::from_secs(70),
        }
    }
}

impl BackoffPolicy {
    /// Reject schedules that would not be strictly increasing or would be empty
    ///
    /// # Errors
    ///
    /// Returns `PluginError::Config` when `factor < 2`, the initial delay is
    /// zero, or the ceiling is below the initial delay.
    pub fn validate(&self) -> Result<(), PluginError> {
        if self.factor < 2 {
            return Err(PluginError::config("backoff factor must be at least 2"));
        }
        if self.initial_delay.is_zero() {
            return Err(PluginError::config(
                "backoff initial_delay_ms must be greater than 0",
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err(PluginError::config(
                "backoff max_delay_ms must not be below initial_delay_ms",
            ));
        }
        Ok(())
    }

    /// The waits between successive lookups
    pub fn delays(&self) -> Delays {
        Delays {
            next: Some(self.initial_delay),
            factor: self.factor,
            max_delay: self.max_delay,
        }
    }
}

/// Iterator over backoff waits; ends before the ceiling is exceeded
#[derive(Debug, Clone)]
pub struct Delays {
    next: Option<Duration>,
    factor: u32,
    max_delay: Duration,
}

impl Iterator for Delays {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next?;
        if current > self.max_delay {
            self.next = None;
            return None;
        }
        self.next = current.checked_mul(self.factor);
        Some(current)
    }
}

/// Maps a repository name onto the package name used by the artifact host.
///
/// Some hosts reject reserved words as package names, so projects publish
/// under an alternative name.
pub trait PackageNormalizer: Send + Sync + fmt::Debug {
    fn normalize(&self, package: &str) -> String;
}

/// Normalizer driven by an explicit alias table; unknown names pass through
#[derive(Debug, Clone, Default)]
pub struct AliasNormalizer {
    aliases: HashMap<String, String>,
}

impl AliasNormalizer {
    pub fn new(aliases: HashMap<String, String>) -> Self {
        Self { aliases }
    }
}

impl PackageNormalizer for AliasNormalizer {
    fn normalize(&self, package: &str) -> String {
        self.aliases
            .get(package)
            .cloned()
            .unwrap_or_else(|| package.to_string())
    }
}

/// State of one resolution chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactQuery {
    pub package: String,
    pub version: String,
    /// Lookups performed so far
    pub attempt: u32,
    /// Wait before the next lookup; `None` once the schedule is exhausted
    pub next_delay: Option<Duration>,
}

/// Resolves the artifacts of a passed build, retrying while none are listed
#[derive(Debug, Clone)]
pub struct ArtifactResolver {
    client: Arc<dyn ErasedArtifactClient>,
    normalizer: Arc<dyn PackageNormalizer>,
    policy: BackoffPolicy,
}

impl ArtifactResolver {
    pub fn new(
        client: Arc<dyn ErasedArtifactClient>,
        normalizer: Arc<dyn PackageNormalizer>,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            client,
            normalizer,
            policy,
        }
    }

    /// Package and version a build publishes under: the normalized repository
    /// name, and the build's tag or else its build number.
    pub fn coordinates(&self, build: &BuildRecord) -> (String, String) {
        let package = self.normalizer.normalize(build.repo_name());
        let version = build
            .tag
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| build.number.clone());
        (package, version)
    }

    /// Resolve artifacts for `build`; see [`ArtifactResolver::resolve`]
    pub async fn resolve_build(
        &self,
        build: &BuildRecord,
        cancel: &CancellationToken,
    ) -> Option<Vec<ArtifactFile>> {
        let (package, version) = self.coordinates(build);
        self.resolve(&package, &version, cancel).await
    }

    /// Look up files for an already-normalized package/version, retrying on
    /// empty results until the backoff schedule runs out.
    ///
    /// Returns the first non-empty listing, or an empty list once retries
    /// are exhausted. Lookup errors count as empty results. Returns `None`
    /// if `cancel` fires during a wait.
    pub async fn resolve(
        &self,
        package: &str,
        version: &str,
        cancel: &CancellationToken,
    ) -> Option<Vec<ArtifactFile>> {
        let mut delays = self.policy.delays();
        let mut query = ArtifactQuery {
            package: package.to_string(),
            version: version.to_string(),
            attempt: 0,
            next_delay: delays.next(),
        };

        loop {
            query.attempt += 1;
            let files = match self.client.list_files(&query.package, &query.version).await {
                Ok(files) => files,
                Err(e) => {
                    warn!(
                        "Artifact lookup for {} {} failed (attempt {}): {e}",
                        query.package, query.version, query.attempt
                    );
                    Vec::new()
                }
            };

            if !files.is_empty() {
                debug!(
                    "Resolved {} artifact(s) for {} {} after {} attempt(s)",
                    files.len(),
                    query.package,
                    query.version,
                    query.attempt
                );
                return Some(files);
            }

            let Some(delay) = query.next_delay else {
                debug!(
                    "No artifacts for {} {} after {} attempt(s)",
                    query.package, query.version, query.attempt
                );
                return Some(Vec::new());
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Artifact lookup for {} {} cancelled", query.package, query.version);
                    return None;
                }
                _ = tokio::time::sleep(delay) => {}
            }
            query.next_delay = delays.next();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::build_watch::mock::{MockArtifactClient, create_test_build, create_test_file};
    use crate::plugins::build_watch::types::BuildState;
    use tokio::time::Instant;

    fn resolver(client: MockArtifactClient) -> ArtifactResolver {
        ArtifactResolver::new(
            Arc::new(client),
            Arc::new(AliasNormalizer::default()),
            BackoffPolicy::default(),
        )
    }

    #[test]
    fn test_default_delays() {
        let delays: Vec<u128> = BackoffPolicy::default()
            .delays()
            .map(|d| d.as_millis())
            .collect();
        assert_eq!(delays, vec![100, 500, 2_500, 12_500, 62_500]);
    }

    #[test]
    fn test_delays_strictly_increasing_and_bounded() {
        let policies = [
            BackoffPolicy::default(),
            BackoffPolicy {
                initial_delay: Duration::from_millis(1),
                factor: 2,
                max_delay: Duration::from_secs(3600),
            },
            BackoffPolicy {
                initial_delay: Duration::from_secs(5),
                factor: 10,
                max_delay: Duration::from_secs(5),
            },
        ];

        for policy in policies {
            policy.validate().unwrap();
            let delays: Vec<Duration> = policy.delays().collect();
            assert!(!delays.is_empty());
            assert!(delays.len() < 64);
            assert!(delays.iter().all(|d| *d <= policy.max_delay));
            assert!(delays.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_validate_rejects_bad_policies() {
        let flat = BackoffPolicy {
            factor: 1,
            ..Default::default()
        };
        assert!(flat.validate().is_err());

        let zero = BackoffPolicy {
            initial_delay: Duration::ZERO,
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let inverted = BackoffPolicy {
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(1),
            ..Default::default()
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_alias_normalizer() {
        let normalizer = AliasNormalizer::new(HashMap::from([(
            "java".to_string(),
            "java-lib".to_string(),
        )]));
        assert_eq!(normalizer.normalize("java"), "java-lib");
        assert_eq!(normalizer.normalize("widget"), "widget");
    }

    #[test]
    fn test_coordinates_prefer_tag() {
        let resolver = ArtifactResolver::new(
            Arc::new(MockArtifactClient::new()),
            Arc::new(AliasNormalizer::new(HashMap::from([(
                "class".to_string(),
                "klass".to_string(),
            )]))),
            BackoffPolicy::default(),
        );

        let mut build = create_test_build(1, "owner/class", BuildState::Passed);
        build.number = "41".to_string();
        assert_eq!(
            resolver.coordinates(&build),
            ("klass".to_string(), "41".to_string())
        );

        build.tag = Some("v1.2.0".to_string());
        assert_eq!(
            resolver.coordinates(&build),
            ("klass".to_string(), "v1.2.0".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_retries_until_files_appear() {
        let client = MockArtifactClient::new();
        client.push_files(Vec::new());
        client.push_files(Vec::new());
        client.push_files(vec![create_test_file("fileA.jar")]);

        let start = Instant::now();
        let files = resolver(client.clone())
            .resolve("widget", "1.0", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(files, vec![create_test_file("fileA.jar")]);
        assert_eq!(client.call_count(), 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(600));
        assert!(elapsed < Duration::from_millis(650));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_gives_up_with_empty_result() {
        let client = MockArtifactClient::new();

        let start = Instant::now();
        let files = resolver(client.clone())
            .resolve("widget", "1.0", &CancellationToken::new())
            .await
            .unwrap();

        assert!(files.is_empty());
        assert_eq!(client.call_count(), 6);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(78_100));
        assert!(elapsed < Duration::from_millis(78_200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_treats_errors_as_empty() {
        let client = MockArtifactClient::new();
        client.push_error("502 Bad Gateway");
        client.push_files(vec![create_test_file("fileA.jar")]);

        let files = resolver(client.clone())
            .resolve("widget", "1.0", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_cancelled_during_wait() {
        let client = MockArtifactClient::new();
        let cancel = CancellationToken::new();
        let resolver = resolver(client.clone());

        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            resolver.resolve("widget", "1.0", &task_cancel).await
        });

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        cancel.cancel();

        assert_eq!(handle.await.unwrap(), None);
        assert!(client.call_count() < 6);
    }
}
