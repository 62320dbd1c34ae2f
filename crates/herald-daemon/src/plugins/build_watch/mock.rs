//! In-memory collaborators for testing
//!
//! Every mock is `Clone` and shares its state through an `Arc`, so a test can
//! hand one clone to the engine and keep another for scripting and assertions.

use super::provider::{ArtifactClient, ChatClient, CiClient};
use super::types::{ArtifactFile, BuildRecord, BuildState, ChatMessage};
use crate::plugin::PluginError;
use ci_herald_core::Destination;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct MockCiState {
    scripted: VecDeque<Result<Vec<BuildRecord>, String>>,
    current: Vec<BuildRecord>,
    calls: usize,
}

/// Mock CI backend.
///
/// Scripted responses are returned in order; once the script runs out the
/// last successful snapshot is returned again.
#[derive(Debug, Clone, Default)]
pub struct MockCiClient {
    state: Arc<Mutex<MockCiState>>,
    verify_error: Option<String>,
}

impl MockCiClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `verify()` fail with this message
    pub fn with_verify_error(mut self, error: &str) -> Self {
        self.verify_error = Some(error.to_string());
        self
    }

    /// Queue a successful snapshot
    pub fn push_snapshot(&self, builds: Vec<BuildRecord>) {
        lock(&self.state).scripted.push_back(Ok(builds));
    }

    /// Queue a failed poll
    pub fn push_failure(&self, error: &str) {
        lock(&self.state).scripted.push_back(Err(error.to_string()));
    }

    /// Number of `list_builds` calls so far
    pub fn call_count(&self) -> usize {
        lock(&self.state).calls
    }
}

impl CiClient for MockCiClient {
    async fn list_builds(&self, limit: u32) -> Result<Vec<BuildRecord>, PluginError> {
        let mut state = lock(&self.state);
        state.calls += 1;
        let response = state.scripted.pop_front();
        match response {
            Some(Ok(builds)) => {
                state.current = builds;
            }
            Some(Err(message)) => return Err(PluginError::provider(message)),
            None => {}
        }
        Ok(state.current.iter().take(limit as usize).cloned().collect())
    }

    async fn verify(&self) -> Result<(), PluginError> {
        match &self.verify_error {
            Some(message) => Err(PluginError::provider(message.clone())),
            None => Ok(()),
        }
    }

    fn provider_name(&self) -> &str {
        "MockCiClient"
    }
}

/// Record of an artifact lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactCall {
    pub package: String,
    pub version: String,
}

#[derive(Debug, Default)]
struct MockArtifactState {
    scripted: VecDeque<Result<Vec<ArtifactFile>, String>>,
    calls: Vec<ArtifactCall>,
}

/// Mock artifact host. Scripted responses are returned in order, then empty
/// listings forever.
#[derive(Debug, Clone, Default)]
pub struct MockArtifactClient {
    state: Arc<Mutex<MockArtifactState>>,
}

impl MockArtifactClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_files(&self, files: Vec<ArtifactFile>) {
        lock(&self.state).scripted.push_back(Ok(files));
    }

    pub fn push_error(&self, error: &str) {
        lock(&self.state).scripted.push_back(Err(error.to_string()));
    }

    pub fn calls(&self) -> Vec<ArtifactCall> {
        lock(&self.state).calls.clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.state).calls.len()
    }
}

impl ArtifactClient for MockArtifactClient {
    async fn list_files(
        &self,
        package: &str,
        version: &str,
    ) -> Result<Vec<ArtifactFile>, PluginError> {
        let mut state = lock(&self.state);
        state.calls.push(ArtifactCall {
            package: package.to_string(),
            version: version.to_string(),
        });
        match state.scripted.pop_front() {
            Some(Ok(files)) => Ok(files),
            Some(Err(message)) => Err(PluginError::provider(message)),
            None => Ok(Vec::new()),
        }
    }

    async fn verify(&self) -> Result<(), PluginError> {
        Ok(())
    }

    fn provider_name(&self) -> &str {
        "MockArtifactClient"
    }
}

/// Record of a chat call
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCall {
    Send(Destination, ChatMessage),
    Presence(Option<String>),
}

#[derive(Debug, Default)]
struct MockChatState {
    calls: Vec<ChatCall>,
    fail_sends: bool,
    fail_presence: bool,
}

/// Mock chat backend that records every call
#[derive(Debug, Clone, Default)]
pub struct MockChatClient {
    state: Arc<Mutex<MockChatState>>,
    verify_error: Option<String>,
}

impl MockChatClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verify_error(mut self, error: &str) -> Self {
        self.verify_error = Some(error.to_string());
        self
    }

    /// Make `send_message` fail (the call is still recorded)
    pub fn set_fail_sends(&self, fail: bool) {
        lock(&self.state).fail_sends = fail;
    }

    /// Make `set_presence` fail (the call is still recorded)
    pub fn set_fail_presence(&self, fail: bool) {
        lock(&self.state).fail_presence = fail;
    }

    pub fn calls(&self) -> Vec<ChatCall> {
        lock(&self.state).calls.clone()
    }

    /// Messages sent so far, in order
    pub fn sent(&self) -> Vec<(Destination, ChatMessage)> {
        lock(&self.state)
            .calls
            .iter()
            .filter_map(|call| match call {
                ChatCall::Send(dest, msg) => Some((dest.clone(), msg.clone())),
                ChatCall::Presence(_) => None,
            })
            .collect()
    }

    /// Presence updates so far, in order
    pub fn presence_updates(&self) -> Vec<Option<String>> {
        lock(&self.state)
            .calls
            .iter()
            .filter_map(|call| match call {
                ChatCall::Presence(text) => Some(text.clone()),
                ChatCall::Send(..) => None,
            })
            .collect()
    }
}

impl ChatClient for MockChatClient {
    async fn send_message(
        &self,
        destination: &Destination,
        message: &ChatMessage,
    ) -> Result<(), PluginError> {
        let mut state = lock(&self.state);
        state
            .calls
            .push(ChatCall::Send(destination.clone(), message.clone()));
        if state.fail_sends {
            return Err(PluginError::provider("mock chat send failure"));
        }
        Ok(())
    }

    async fn set_presence(&self, text: Option<&str>) -> Result<(), PluginError> {
        let mut state = lock(&self.state);
        state.calls.push(ChatCall::Presence(text.map(str::to_string)));
        if state.fail_presence {
            return Err(PluginError::provider("mock presence failure"));
        }
        Ok(())
    }

    async fn verify(&self) -> Result<(), PluginError> {
        match &self.verify_error {
            Some(message) => Err(PluginError::provider(message.clone())),
            None => Ok(()),
        }
    }

    fn provider_name(&self) -> &str {
        "MockChatClient"
    }
}

/// Helper function to create a test build
pub fn create_test_build(id: u64, repo_slug: &str, state: BuildState) -> BuildRecord {
    BuildRecord {
        id,
        number: id.to_string(),
        repo_slug: repo_slug.to_string(),
        branch: "main".to_string(),
        state,
        commit_sha: format!("{id:07}abcdef"),
        commit_message: Some(format!("Commit for build {id}")),
        triggered_by: "dev".to_string(),
        finished_at: state
            .is_terminal()
            .then(|| "2026-02-13T10:05:00Z".to_string()),
        tag: None,
        url: format!("https://app.travis-ci.com/{repo_slug}/builds/{id}"),
    }
}

/// Helper function to create a test artifact file
pub fn create_test_file(name: &str) -> ArtifactFile {
    ArtifactFile {
        name: name.to_string(),
        path: format!("com/example/{name}"),
        url: format!("https://dl.example/com/example/{name}"),
    }
}
