//! Turns transitions into chat messages

use super::provider::ErasedChatClient;
use super::types::{ArtifactFile, BuildState, ChatMessage, MessageAttachment, Transition};
use chrono::{DateTime, SecondsFormat, Utc};
use ci_herald_core::{Destination, Registry};
use std::sync::Arc;
use tracing::{debug, warn};

pub const COLOR_PASSED: u32 = 0x2E_CC71;
pub const COLOR_FAILED: u32 = 0xE7_4C3C;
pub const COLOR_CANCELED: u32 = 0x95_A5A6;

/// Which terminal states produce a message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyPolicy {
    pub notify_canceled: bool,
}

/// Outcome of one notification attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Message accepted by the chat backend
    Sent(Destination),
    /// State does not notify under the current policy
    Suppressed,
    /// Repository is not linked to any destination
    NoDestination,
    /// Chat backend rejected the message; not retried
    Failed(String),
}

/// Composes and delivers build notifications
#[derive(Debug, Clone)]
pub struct Notifier {
    chat: Arc<dyn ErasedChatClient>,
    registry: Arc<dyn Registry>,
    policy: NotifyPolicy,
}

impl Notifier {
    pub fn new(
        chat: Arc<dyn ErasedChatClient>,
        registry: Arc<dyn Registry>,
        policy: NotifyPolicy,
    ) -> Self {
        Self {
            chat,
            registry,
            policy,
        }
    }

    pub fn should_notify(&self, state: BuildState) -> bool {
        match state {
            BuildState::Passed | BuildState::Failed | BuildState::Errored => true,
            BuildState::Canceled => self.policy.notify_canceled,
            BuildState::Created | BuildState::Queued | BuildState::Started => false,
        }
    }

    pub fn has_destination(&self, repo_slug: &str) -> bool {
        self.registry.resolve_destination(repo_slug).is_some()
    }

    /// How the triggering login appears in a message
    pub fn render_identity(&self, login: &str) -> String {
        match self.registry.resolve_identity(login) {
            Some(identity) => identity.mention(),
            None => format!("@{login} (not linked)"),
        }
    }

    /// Build the message for `transition`.
    ///
    /// `artifacts` is `None` when no lookup was made; `Some(&[])` means the
    /// lookup finished and found nothing.
    pub fn compose(
        &self,
        transition: &Transition,
        artifacts: Option<&[ArtifactFile]>,
    ) -> ChatMessage {
        let build = &transition.build;
        let state = transition.new_state();

        let color = match state {
            BuildState::Passed => COLOR_PASSED,
            BuildState::Failed | BuildState::Errored => COLOR_FAILED,
            _ => COLOR_CANCELED,
        };

        let mut lines = vec![format!("**{}** on `{}`", build.repo_slug, build.branch)];
        match build.commit_summary() {
            Some(summary) => lines.push(format!("{summary} ({})", build.short_sha())),
            None => lines.push(format!("Commit {}", build.short_sha())),
        }
        let trigger = self.render_identity(&build.triggered_by);
        match state {
            BuildState::Failed | BuildState::Errored => {
                lines.push(format!("Broken by {trigger}"));
            }
            _ => lines.push(format!("Triggered by {trigger}")),
        }
        if matches!(artifacts, Some([])) {
            lines.push("No artifacts were published for this build.".to_string());
        }

        let attachments = artifacts
            .unwrap_or_default()
            .iter()
            .map(|file| MessageAttachment {
                name: file.name.clone(),
                url: file.url.clone(),
            })
            .collect();

        let timestamp = build
            .finished_at
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        ChatMessage {
            title: format!("{} #{} {}", build.repo_name(), build.number, state),
            url: build.url.clone(),
            color,
            description: lines.join("\n"),
            attachments,
            timestamp,
        }
    }

    /// Deliver the message for `transition`. Never errors: every outcome is
    /// reported as a [`Delivery`] and logged.
    pub async fn notify(
        &self,
        transition: &Transition,
        artifacts: Option<&[ArtifactFile]>,
    ) -> Delivery {
        let build = &transition.build;
        if !self.should_notify(transition.new_state()) {
            return Delivery::Suppressed;
        }

        let Some(destination) = self.registry.resolve_destination(&build.repo_slug) else {
            debug!(
                "No destination linked for {}; dropping build #{} {}",
                build.repo_slug,
                build.number,
                transition.new_state()
            );
            return Delivery::NoDestination;
        };

        let message = self.compose(transition, artifacts);
        match self.chat.send_message(&destination, &message).await {
            Ok(()) => {
                debug!("Notified {destination} about {}", message.title);
                Delivery::Sent(destination)
            }
            Err(e) => {
                warn!(
                    "Failed to notify {destination} about {} via {}: {e}",
                    message.title,
                    self.chat.provider_name()
                );
                Delivery::Failed(e.to_string())
            }
        }
    }
}
