//! Ambient "what is running" status

use super::provider::ErasedChatClient;
use super::types::BuildRecord;
use tracing::{debug, warn};

/// Summarizes running builds into a presence string and pushes it to chat
/// when it changes.
#[derive(Debug)]
pub struct PresenceReporter {
    max_names: usize,
    /// Last value accepted by the chat backend; `None` before the first push
    last_pushed: Option<Option<String>>,
}

impl PresenceReporter {
    pub fn new(max_names: usize) -> Self {
        Self {
            max_names: max_names.max(1),
            last_pushed: None,
        }
    }

    /// Status text for the non-terminal builds in `snapshot`, or `None` when
    /// nothing is running.
    ///
    /// Repository names appear once each, in snapshot order.
    pub fn summarize(&self, snapshot: &[BuildRecord]) -> Option<String> {
        let mut names: Vec<&str> = Vec::new();
        for build in snapshot.iter().filter(|b| !b.state.is_terminal()) {
            let name = build.repo_name();
            if !names.contains(&name) {
                names.push(name);
            }
        }

        if names.len() > self.max_names {
            let shown = names[..self.max_names].join(", ");
            let hidden = names.len() - self.max_names;
            return Some(format!("watching {shown}, and {hidden} more"));
        }

        let text = match names.as_slice() {
            [] => return None,
            [one] => (*one).to_string(),
            [a, b] => format!("{a} and {b}"),
            [rest @ .., last] => format!("{}, and {last}", rest.join(", ")),
        };
        Some(format!("watching {text}"))
    }

    /// The value most recently accepted by the chat backend
    pub fn current(&self) -> Option<&str> {
        self.last_pushed.as_ref().and_then(|p| p.as_deref())
    }

    /// Push the summary of `snapshot` if it differs from the last pushed
    /// value. Returns `true` when a push was accepted.
    ///
    /// A rejected push is not remembered, so the next cycle tries again.
    pub async fn report(&mut self, chat: &dyn ErasedChatClient, snapshot: &[BuildRecord]) -> bool {
        let summary = self.summarize(snapshot);
        if self.last_pushed.as_ref() == Some(&summary) {
            return false;
        }

        match chat.set_presence(summary.as_deref()).await {
            Ok(()) => {
                match &summary {
                    Some(text) => debug!("Presence set to '{text}'"),
                    None => debug!("Presence cleared"),
                }
                self.last_pushed = Some(summary);
                true
            }
            Err(e) => {
                warn!("Failed to update presence via {}: {e}", chat.provider_name());
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::build_watch::mock::{MockChatClient, create_test_build};
    use crate::plugins::build_watch::types::BuildState;

    fn running(names: &[&str]) -> Vec<BuildRecord> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| create_test_build(i as u64 + 1, &format!("acme/{name}"), BuildState::Started))
            .collect()
    }

    #[test]
    fn test_summarize_formats() {
        let reporter = PresenceReporter::new(3);
        assert_eq!(reporter.summarize(&[]), None);
        assert_eq!(reporter.summarize(&running(&["a"])).unwrap(), "watching a");
        assert_eq!(
            reporter.summarize(&running(&["a", "b"])).unwrap(),
            "watching a and b"
        );
        assert_eq!(
            reporter.summarize(&running(&["a", "b", "c"])).unwrap(),
            "watching a, b, and c"
        );
        assert_eq!(
            reporter.summarize(&running(&["a", "b", "c", "d", "e"])).unwrap(),
            "watching a, b, c, and 2 more"
        );
    }

    #[test]
    fn test_summarize_skips_terminal_and_dedups() {
        let reporter = PresenceReporter::new(3);
        let snapshot = vec![
            create_test_build(1, "acme/a", BuildState::Passed),
            create_test_build(2, "acme/b", BuildState::Queued),
            create_test_build(3, "acme/b", BuildState::Started),
            create_test_build(4, "acme/c", BuildState::Created),
        ];
        assert_eq!(
            reporter.summarize(&snapshot).unwrap(),
            "watching b and c"
        );

        let idle = vec![create_test_build(1, "acme/a", BuildState::Failed)];
        assert_eq!(reporter.summarize(&idle), None);
    }

    #[tokio::test]
    async fn test_report_pushes_only_on_change() {
        let chat = MockChatClient::new();
        let mut reporter = PresenceReporter::new(3);

        assert!(reporter.report(&chat, &running(&["a"])).await);
        assert!(!reporter.report(&chat, &running(&["a"])).await);
        assert!(reporter.report(&chat, &[]).await);
        assert!(!reporter.report(&chat, &[]).await);

        assert_eq!(
            chat.presence_updates(),
            vec![Some("watching a".to_string()), None]
        );
        assert_eq!(reporter.current(), None);
    }

    #[tokio::test]
    async fn test_report_retries_after_failure() {
        let chat = MockChatClient::new();
        chat.set_fail_presence(true);
        let mut reporter = PresenceReporter::new(3);

        assert!(!reporter.report(&chat, &running(&["a"])).await);
        chat.set_fail_presence(false);
        assert!(reporter.report(&chat, &running(&["a"])).await);
        assert_eq!(reporter.current(), Some("watching a"));
        assert_eq!(chat.presence_updates().len(), 2);
    }
}
