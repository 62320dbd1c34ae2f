//! Last-observed build state and snapshot diffing

use super::types::{BuildRecord, BuildState, Transition};
use std::collections::HashMap;

/// In-memory map from build id to the last state observed for it.
///
/// Owned by the reconciler and mutated only through [`StateStore::seed`] and
/// [`StateStore::diff`]. Never persisted; rebuilt from a fresh snapshot on
/// every start.
#[derive(Debug, Default)]
pub struct StateStore {
    states: HashMap<u64, BuildState>,
    seeded: bool,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every build in `snapshot` without producing transitions.
    ///
    /// Called once with the startup snapshot so that builds which already
    /// exist do not trigger a notification storm. Returns the number of
    /// builds recorded.
    pub fn seed(&mut self, snapshot: &[BuildRecord]) -> usize {
        for build in snapshot {
            self.states.insert(build.id, build.state);
        }
        self.seeded = true;
        snapshot.len()
    }

    /// Whether the startup seeding has happened
    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// Compare `snapshot` against the recorded states, record the new
    /// states, and return one transition per changed or newly seen build,
    /// in snapshot order.
    ///
    /// Diffing the same snapshot twice yields nothing the second time.
    pub fn diff(&mut self, snapshot: &[BuildRecord]) -> Vec<Transition> {
        let mut transitions = Vec::new();
        for build in snapshot {
            let previous_state = self.states.insert(build.id, build.state);
            if previous_state != Some(build.state) {
                transitions.push(Transition {
                    build: build.clone(),
                    previous_state,
                });
            }
        }
        transitions
    }

    /// Last recorded state of a build
    pub fn get(&self, id: u64) -> Option<BuildState> {
        self.states.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(id: u64, state: BuildState) -> BuildRecord {
        BuildRecord {
            id,
            number: id.to_string(),
            repo_slug: "owner/repo".to_string(),
            branch: "main".to_string(),
            state,
            commit_sha: format!("sha{id}"),
            commit_message: None,
            triggered_by: "dev".to_string(),
            finished_at: None,
            tag: None,
            url: format!("https://ci.example/builds/{id}"),
        }
    }

    #[test]
    fn test_seed_records_without_transitions() {
        let mut store = StateStore::new();
        assert!(!store.is_seeded());

        let recorded = store.seed(&[build(1, BuildState::Started), build(2, BuildState::Passed)]);
        assert_eq!(recorded, 2);
        assert!(store.is_seeded());
        assert_eq!(store.get(1), Some(BuildState::Started));
        assert_eq!(store.get(2), Some(BuildState::Passed));
    }

    #[test]
    fn test_seeded_state_never_transitions() {
        let mut store = StateStore::new();
        store.seed(&[build(1, BuildState::Failed)]);

        for _ in 0..3 {
            assert!(store.diff(&[build(1, BuildState::Failed)]).is_empty());
        }
    }

    #[test]
    fn test_changed_state_emits_transition_with_previous() {
        let mut store = StateStore::new();
        store.seed(&[build(1, BuildState::Started)]);

        let transitions = store.diff(&[build(1, BuildState::Passed)]);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].previous_state, Some(BuildState::Started));
        assert_eq!(transitions[0].new_state(), BuildState::Passed);
        assert_eq!(store.get(1), Some(BuildState::Passed));
    }

    #[test]
    fn test_new_build_after_seeding_emits_transition() {
        let mut store = StateStore::new();
        store.seed(&[]);

        let transitions = store.diff(&[build(7, BuildState::Passed)]);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].previous_state, None);
    }

    #[test]
    fn test_diff_is_idempotent() {
        let mut store = StateStore::new();
        store.seed(&[]);
        let snapshot = vec![build(3, BuildState::Failed), build(4, BuildState::Started)];

        assert_eq!(store.diff(&snapshot).len(), 2);
        assert!(store.diff(&snapshot).is_empty());
    }

    #[test]
    fn test_transitions_follow_snapshot_order() {
        let mut store = StateStore::new();
        store.seed(&[]);
        let snapshot = vec![
            build(9, BuildState::Passed),
            build(3, BuildState::Failed),
            build(5, BuildState::Started),
        ];

        let ids: Vec<u64> = store.diff(&snapshot).iter().map(|t| t.build.id).collect();
        assert_eq!(ids, vec![9, 3, 5]);
    }

    #[test]
    fn test_duplicate_id_in_snapshot_last_write_wins() {
        let mut store = StateStore::new();
        store.seed(&[]);

        let transitions = store.diff(&[build(1, BuildState::Started), build(1, BuildState::Started)]);
        assert_eq!(transitions.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_at_most_once_per_id_and_state() {
        let mut store = StateStore::new();
        store.seed(&[build(1, BuildState::Queued)]);
        let sequence = [
            BuildState::Queued,
            BuildState::Started,
            BuildState::Started,
            BuildState::Passed,
            BuildState::Passed,
            BuildState::Passed,
        ];

        let mut passed_count = 0;
        let mut started_count = 0;
        for state in sequence {
            for t in store.diff(&[build(1, state)]) {
                match t.new_state() {
                    BuildState::Passed => passed_count += 1,
                    BuildState::Started => started_count += 1,
                    _ => {}
                }
            }
        }
        assert_eq!(passed_count, 1);
        assert_eq!(started_count, 1);
    }
}
