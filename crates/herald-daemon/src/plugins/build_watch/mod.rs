//! Build watch plugin: CI build-state reconciliation and chat notification

mod artifacts;
mod bintray;
mod config;
mod discord;
mod gateway;
mod http;
#[cfg(any(test, feature = "test-support"))]
mod mock;
mod notifier;
mod plugin;
mod poller;
mod presence;
mod provider;
mod reconciler;
mod store;
mod travis;
mod types;

pub use artifacts::{
    AliasNormalizer, ArtifactQuery, ArtifactResolver, BackoffPolicy, Delays, PackageNormalizer,
};
pub use bintray::BintrayClient;
pub use config::{ArtifactsConfig, BuildWatchConfig};
pub use discord::DiscordClient;
pub use gateway::PresenceGateway;
#[cfg(any(test, feature = "test-support"))]
pub use mock::{
    ArtifactCall, ChatCall, MockArtifactClient, MockChatClient, MockCiClient, create_test_build,
    create_test_file,
};
pub use notifier::{COLOR_CANCELED, COLOR_FAILED, COLOR_PASSED, Delivery, Notifier, NotifyPolicy};
pub use plugin::{BuildWatchPlugin, PLUGIN_NAME};
pub use poller::{PollOutcome, Poller};
pub use presence::PresenceReporter;
pub use provider::{
    ArtifactClient, ChatClient, CiClient, ErasedArtifactClient, ErasedChatClient, ErasedCiClient,
};
pub use reconciler::{CycleReport, Reconciler};
pub use store::StateStore;
pub use travis::TravisClient;
pub use types::{ArtifactFile, BuildRecord, BuildState, ChatMessage, MessageAttachment, Transition};
