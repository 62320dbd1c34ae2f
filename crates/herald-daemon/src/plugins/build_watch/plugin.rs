//! Build-watch plugin: drives the reconciler on a fixed timer

use super::artifacts::{AliasNormalizer, ArtifactResolver, BackoffPolicy};
use super::bintray::BintrayClient;
use super::config::BuildWatchConfig;
use super::discord::DiscordClient;
use super::gateway::PresenceGateway;
use super::provider::{
    ArtifactClient, ChatClient, CiClient, ErasedArtifactClient, ErasedChatClient, ErasedCiClient,
};
use super::reconciler::Reconciler;
use super::travis::TravisClient;
use crate::plugin::{PluginContext, PluginError};
use std::sync::Arc;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Name of the plugin and of its `[plugins.<name>]` table
pub const PLUGIN_NAME: &str = "build_watch";

/// How long shutdown waits for in-flight artifact lookups to unwind
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Bridges CI build state to chat notifications
pub struct BuildWatchPlugin {
    /// Injected or parsed configuration
    config: Option<BuildWatchConfig>,
    ci: Option<Arc<dyn ErasedCiClient>>,
    artifacts: Option<Arc<dyn ErasedArtifactClient>>,
    chat: Option<Arc<dyn ErasedChatClient>>,
    /// Built by init; absent when disabled
    reconciler: Option<Reconciler>,
}

impl BuildWatchPlugin {
    pub fn new() -> Self {
        Self {
            config: None,
            ci: None,
            artifacts: None,
            chat: None,
            reconciler: None,
        }
    }

    /// Use `config` instead of parsing `[plugins.build_watch]` at init
    pub fn with_config(mut self, config: BuildWatchConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use `client` instead of building a Travis client from credentials
    pub fn with_ci_client<C: CiClient + 'static>(mut self, client: C) -> Self {
        self.ci = Some(Arc::new(client));
        self
    }

    /// Use `client` for artifact lookups. With no `[artifacts]` table the
    /// default backoff and no package aliases apply.
    pub fn with_artifact_client<C: ArtifactClient + 'static>(mut self, client: C) -> Self {
        self.artifacts = Some(Arc::new(client));
        self
    }

    /// Use `client` instead of building a Discord client from credentials
    pub fn with_chat_client<C: ChatClient + 'static>(mut self, client: C) -> Self {
        self.chat = Some(Arc::new(client));
        self
    }

    /// The reconciler, once init has built it
    pub fn reconciler(&self) -> Option<&Reconciler> {
        self.reconciler.as_ref()
    }

    fn build_clients(
        &mut self,
        ctx: &PluginContext,
        config: &BuildWatchConfig,
    ) -> Result<(), PluginError> {
        let credentials = &ctx.config.credentials;

        if self.ci.is_none() {
            let token = required_secret(
                credentials.travis_token.as_deref(),
                "travis_token",
                "HERALD_TRAVIS_TOKEN",
            )?;
            self.ci = Some(Arc::new(TravisClient::new(
                &config.travis_endpoint,
                &config.travis_web_url,
                token,
            )));
        }

        if self.chat.is_none() {
            let token = required_secret(
                credentials.discord_token.as_deref(),
                "discord_token",
                "HERALD_DISCORD_TOKEN",
            )?;
            let gateway = PresenceGateway::spawn(&config.discord_gateway_url, token);
            self.chat = Some(Arc::new(
                DiscordClient::new(&config.discord_endpoint, token).with_gateway(gateway),
            ));
        }

        if self.artifacts.is_none()
            && let Some(artifacts) = &config.artifacts
        {
            let mut client = BintrayClient::new(
                &artifacts.endpoint,
                &artifacts.download_url,
                &artifacts.subject,
                &artifacts.repo,
            );
            if let (Some(user), Some(key)) = (&credentials.bintray_user, &credentials.bintray_key) {
                client = client.with_credentials(user, key);
            }
            self.artifacts = Some(Arc::new(client));
        }

        Ok(())
    }
}

impl Default for BuildWatchPlugin {
    fn default() -> Self {
        Self::new()
    }
}

fn required_secret<'a>(
    value: Option<&'a str>,
    key: &str,
    env_var: &str,
) -> Result<&'a str, PluginError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PluginError::Init {
            message: format!("{key} is not configured (set [credentials].{key} or {env_var})"),
            source: None,
        })
}

async fn verify(
    name: &str,
    check: impl std::future::Future<Output = Result<(), PluginError>>,
) -> Result<(), PluginError> {
    check.await.map_err(|e| PluginError::Init {
        message: format!("cannot authenticate to {name}"),
        source: Some(Box::new(e)),
    })?;
    debug!("Verified credentials for {name}");
    Ok(())
}

impl BuildWatchPlugin {
    /// Parse config, build and verify backend clients, and build the
    /// reconciler. An error here aborts daemon startup.
    pub async fn init(&mut self, ctx: &PluginContext) -> Result<(), PluginError> {
        let config = match self.config.take() {
            Some(config) => config,
            None => ctx
                .plugin_config(PLUGIN_NAME)
                .map(BuildWatchConfig::from_toml)
                .transpose()?
                .unwrap_or_default(),
        };

        if !config.enabled {
            info!("Build watch is disabled");
            self.config = Some(config);
            return Ok(());
        }

        self.build_clients(ctx, &config)?;
        let (Some(ci), Some(chat)) = (self.ci.clone(), self.chat.clone()) else {
            return Err(PluginError::Init {
                message: "CI and chat clients are required".to_string(),
                source: None,
            });
        };

        verify(ci.provider_name(), ci.verify()).await?;
        verify(chat.provider_name(), chat.verify()).await?;

        let mut reconciler = Reconciler::new(Arc::clone(&ci), chat, Arc::clone(&ctx.registry), &config);
        if let Some(artifacts) = self.artifacts.clone() {
            verify(artifacts.provider_name(), artifacts.verify()).await?;
            let (normalizer, policy) = match &config.artifacts {
                Some(a) => (AliasNormalizer::new(a.package_aliases.clone()), a.backoff),
                None => (AliasNormalizer::default(), BackoffPolicy::default()),
            };
            reconciler = reconciler.with_artifacts(ArtifactResolver::new(
                artifacts,
                Arc::new(normalizer),
                policy,
            ));
        }

        info!(
            "Build watch ready: polling {} every {}s",
            ci.provider_name(),
            config.poll_interval_secs
        );
        self.reconciler = Some(reconciler);
        self.config = Some(config);
        Ok(())
    }

    /// Seed, then run one cycle per interval until `cancel` fires
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), PluginError> {
        let Some(reconciler) = self.reconciler.take() else {
            cancel.cancelled().await;
            return Ok(());
        };
        let mut reconciler = reconciler.with_cancellation(&cancel);
        let period = self
            .config
            .as_ref()
            .map(BuildWatchConfig::poll_interval)
            .unwrap_or_else(|| BuildWatchConfig::default().poll_interval());

        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = reconciler.seed() => {}
        }

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately and seeding just polled
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break;
                }
                _ = ticker.tick() => {
                    let report = reconciler.run_cycle().await;
                    if report.skipped {
                        debug!("Cycle skipped: CI backend unavailable");
                    }
                }
            }
        }

        reconciler.shutdown(SHUTDOWN_GRACE).await;
        self.reconciler = Some(reconciler);
        Ok(())
    }

    /// Abandon in-flight artifact lookups and release the backend clients,
    /// which closes the chat gateway session
    pub async fn shutdown(&mut self) -> Result<(), PluginError> {
        if let Some(reconciler) = self.reconciler.take() {
            reconciler.shutdown(SHUTDOWN_GRACE).await;
        }
        self.ci = None;
        self.artifacts = None;
        self.chat = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::build_watch::mock::{MockChatClient, MockCiClient};
    use ci_herald_core::FileRegistry;
    use ci_herald_core::config::Config;

    fn context(config: Config) -> PluginContext {
        PluginContext::new(Arc::new(config), Arc::new(FileRegistry::default()))
    }

    #[test]
    fn test_required_secret() {
        assert_eq!(required_secret(Some(" abc "), "k", "E").unwrap(), "abc");
        assert!(required_secret(Some("  "), "k", "E").is_err());
        let err = required_secret(None, "travis_token", "HERALD_TRAVIS_TOKEN").unwrap_err();
        assert!(err.to_string().contains("travis_token is not configured"));
    }

    #[tokio::test]
    async fn test_init_with_mocks_builds_reconciler() {
        let mut plugin = BuildWatchPlugin::new()
            .with_ci_client(MockCiClient::new())
            .with_chat_client(MockChatClient::new());
        plugin.init(&context(Config::default())).await.unwrap();
        assert!(plugin.reconciler().is_some());

        plugin.shutdown().await.unwrap();
        assert!(plugin.reconciler().is_none());
    }

    #[tokio::test]
    async fn test_init_without_credentials_fails() {
        let mut plugin = BuildWatchPlugin::new().with_chat_client(MockChatClient::new());
        let err = plugin.init(&context(Config::default())).await.unwrap_err();
        assert!(matches!(err, PluginError::Init { .. }));
        assert!(plugin.reconciler().is_none());
    }

    #[tokio::test]
    async fn test_init_disabled_skips_clients() {
        let mut plugin = BuildWatchPlugin::new().with_config(BuildWatchConfig {
            enabled: false,
            ..Default::default()
        });
        plugin.init(&context(Config::default())).await.unwrap();
        assert!(plugin.reconciler().is_none());

        let cancel = CancellationToken::new();
        cancel.cancel();
        plugin.run(cancel).await.unwrap();
    }

    #[tokio::test]
    async fn test_init_rejects_invalid_plugin_table() {
        let mut config = Config::default();
        let table: toml::Table = toml::from_str("poll_interval_secs = 1").unwrap();
        config.plugins.insert(PLUGIN_NAME.to_string(), table);

        let mut plugin = BuildWatchPlugin::new()
            .with_ci_client(MockCiClient::new())
            .with_chat_client(MockChatClient::new());
        let err = plugin.init(&context(config)).await.unwrap_err();
        assert!(matches!(err, PluginError::Config { .. }));
    }
}
