//! One poll → diff → notify cycle, and the state that survives between cycles

use super::artifacts::ArtifactResolver;
use super::config::BuildWatchConfig;
use super::notifier::{NotifyPolicy, Notifier};
use super::poller::{PollOutcome, Poller};
use super::presence::PresenceReporter;
use super::provider::{ErasedChatClient, ErasedCiClient};
use super::store::StateStore;
use super::types::{BuildState, Transition};
use ci_herald_core::Registry;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// What one cycle did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Builds in the (filtered) snapshot
    pub snapshot_len: usize,
    /// Transitions detected
    pub transitions: usize,
    /// Transitions dropped because their (build, state) pair was already announced
    pub repeats: usize,
    /// The poll failed and the cycle did nothing
    pub skipped: bool,
    /// This cycle seeded the state store
    pub seeded: bool,
    /// A new presence value was pushed
    pub presence_updated: bool,
}

/// Owns the state store and drives the engine one cycle at a time.
///
/// `run_cycle` takes `&mut self`, so two cycles can never diff concurrently.
/// Each (build id, state) pair is dispatched at most once for the life of the
/// reconciler, even if a restarted build returns to a state it already
/// reported. Artifact resolution for passed builds runs on tracked tasks that outlive
/// the cycle that spawned them.
#[derive(Debug)]
pub struct Reconciler {
    poller: Poller,
    store: StateStore,
    announced: HashSet<(u64, BuildState)>,
    presence: PresenceReporter,
    chat: Arc<dyn ErasedChatClient>,
    notifier: Arc<Notifier>,
    resolver: Option<ArtifactResolver>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl Reconciler {
    pub fn new(
        ci: Arc<dyn ErasedCiClient>,
        chat: Arc<dyn ErasedChatClient>,
        registry: Arc<dyn Registry>,
        config: &BuildWatchConfig,
    ) -> Self {
        let policy = NotifyPolicy {
            notify_canceled: config.notify_canceled,
        };
        Self {
            poller: Poller::new(ci, config.build_limit, config.branch_matcher.clone()),
            store: StateStore::new(),
            announced: HashSet::new(),
            presence: PresenceReporter::new(config.presence_max_names),
            notifier: Arc::new(Notifier::new(Arc::clone(&chat), registry, policy)),
            chat,
            resolver: None,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Resolve artifacts for passed builds before notifying
    pub fn with_artifacts(mut self, resolver: ArtifactResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Tie in-flight artifact lookups to `parent`: cancelling it abandons them
    pub fn with_cancellation(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    /// Record the current snapshot without notifying. Returns `false` if
    /// the poll failed and the store is still unseeded.
    pub async fn seed(&mut self) -> bool {
        self.seed_snapshot().await.is_some()
    }

    async fn seed_snapshot(&mut self) -> Option<(usize, bool)> {
        match self.poller.poll().await {
            PollOutcome::Fresh(builds) => {
                let recorded = self.store.seed(&builds);
                info!("Seeded build state with {recorded} build(s)");
                let pushed = self.presence.report(self.chat.as_ref(), &builds).await;
                Some((builds.len(), pushed))
            }
            PollOutcome::Unavailable => {
                warn!("Initial build snapshot unavailable; will retry next cycle");
                None
            }
        }
    }

    /// Run one cycle. Seeds instead if seeding has not succeeded yet.
    pub async fn run_cycle(&mut self) -> CycleReport {
        if !self.store.is_seeded() {
            return match self.seed_snapshot().await {
                Some((snapshot_len, presence_updated)) => CycleReport {
                    snapshot_len,
                    seeded: true,
                    presence_updated,
                    ..Default::default()
                },
                None => CycleReport {
                    skipped: true,
                    ..Default::default()
                },
            };
        }

        let builds = match self.poller.poll().await {
            PollOutcome::Fresh(builds) => builds,
            PollOutcome::Unavailable => {
                return CycleReport {
                    skipped: true,
                    ..Default::default()
                };
            }
        };

        let transitions = self.store.diff(&builds);
        let presence_updated = self.presence.report(self.chat.as_ref(), &builds).await;
        debug!(
            "Cycle: {} build(s), {} transition(s)",
            builds.len(),
            transitions.len()
        );

        let mut report = CycleReport {
            snapshot_len: builds.len(),
            transitions: transitions.len(),
            presence_updated,
            ..Default::default()
        };

        for transition in transitions {
            let state = transition.new_state();
            // Recorded before delivery: a failed send is not retried either
            if self.notifier.should_notify(state)
                && !self.announced.insert((transition.build.id, state))
            {
                debug!(
                    "Build {} #{} already announced as {state}",
                    transition.build.repo_slug, transition.build.number
                );
                report.repeats += 1;
                continue;
            }
            self.dispatch(transition).await;
        }
        report
    }

    async fn dispatch(&self, transition: Transition) {
        let build = &transition.build;
        debug!(
            "Build {} #{} {} -> {}",
            build.repo_slug,
            build.number,
            transition
                .previous_state
                .map_or("new", BuildState::as_str),
            transition.new_state()
        );

        let wants_artifacts = transition.new_state() == BuildState::Passed
            && self.notifier.has_destination(&build.repo_slug);
        match (&self.resolver, wants_artifacts) {
            (Some(resolver), true) => {
                let resolver = resolver.clone();
                let notifier = Arc::clone(&self.notifier);
                let cancel = self.cancel.clone();
                self.tracker.spawn(async move {
                    let Some(files) = resolver.resolve_build(&transition.build, &cancel).await
                    else {
                        return;
                    };
                    notifier.notify(&transition, Some(&files)).await;
                });
            }
            _ => {
                self.notifier.notify(&transition, None).await;
            }
        }
    }

    /// Wait for every in-flight artifact chain to finish
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Number of in-flight artifact chains
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Abandon in-flight artifact chains and wait up to `timeout` for their
    /// tasks to unwind.
    pub async fn shutdown(&self, timeout: Duration) {
        self.cancel.cancel();
        self.tracker.close();
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            warn!(
                "{} artifact lookup(s) still running after {timeout:?}; abandoning",
                self.tracker.len()
            );
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn presence(&self) -> Option<&str> {
        self.presence.current()
    }
}
