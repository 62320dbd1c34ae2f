//! Collaborator traits for the CI, artifact and chat backends
//!
//! Each backend trait uses RPITIT with explicit Send bounds and has an
//! object-safe `Erased*` twin with a blanket impl, so the engine can hold
//! `Arc<dyn Erased*>` handles and swap in mocks.

use super::types::{ArtifactFile, BuildRecord, ChatMessage};
use crate::plugin::PluginError;
use ci_herald_core::Destination;
use std::future::Future;
use std::pin::Pin;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, PluginError>> + Send + 'a>>;

/// Lists builds from a CI backend
pub trait CiClient: Send + Sync + std::fmt::Debug {
    /// List up to `limit` builds, most recently finished first
    fn list_builds(
        &self,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<BuildRecord>, PluginError>> + Send;

    /// Check that the configured credentials are accepted
    fn verify(&self) -> impl Future<Output = Result<(), PluginError>> + Send;

    /// Provider name for logging/display
    fn provider_name(&self) -> &str;
}

/// Lists published artifact files
pub trait ArtifactClient: Send + Sync + std::fmt::Debug {
    /// Files published for `package` at `version`; empty when none exist yet
    fn list_files(
        &self,
        package: &str,
        version: &str,
    ) -> impl Future<Output = Result<Vec<ArtifactFile>, PluginError>> + Send;

    fn verify(&self) -> impl Future<Output = Result<(), PluginError>> + Send;

    fn provider_name(&self) -> &str;
}

/// Sends notifications and maintains the ambient presence string
pub trait ChatClient: Send + Sync + std::fmt::Debug {
    fn send_message(
        &self,
        destination: &Destination,
        message: &ChatMessage,
    ) -> impl Future<Output = Result<(), PluginError>> + Send;

    /// Set the presence text; `None` clears it
    fn set_presence(
        &self,
        text: Option<&str>,
    ) -> impl Future<Output = Result<(), PluginError>> + Send;

    fn verify(&self) -> impl Future<Output = Result<(), PluginError>> + Send;

    fn provider_name(&self) -> &str;
}

/// Object-safe version of CiClient
pub trait ErasedCiClient: Send + Sync + std::fmt::Debug {
    fn list_builds(&self, limit: u32) -> BoxFuture<'_, Vec<BuildRecord>>;
    fn verify(&self) -> BoxFuture<'_, ()>;
    fn provider_name(&self) -> &str;
}

impl<T: CiClient> ErasedCiClient for T {
    fn list_builds(&self, limit: u32) -> BoxFuture<'_, Vec<BuildRecord>> {
        Box::pin(CiClient::list_builds(self, limit))
    }

    fn verify(&self) -> BoxFuture<'_, ()> {
        Box::pin(CiClient::verify(self))
    }

    fn provider_name(&self) -> &str {
        CiClient::provider_name(self)
    }
}

/// Object-safe version of ArtifactClient
pub trait ErasedArtifactClient: Send + Sync + std::fmt::Debug {
    fn list_files<'a>(
        &'a self,
        package: &'a str,
        version: &'a str,
    ) -> BoxFuture<'a, Vec<ArtifactFile>>;
    fn verify(&self) -> BoxFuture<'_, ()>;
    fn provider_name(&self) -> &str;
}

impl<T: ArtifactClient> ErasedArtifactClient for T {
    fn list_files<'a>(
        &'a self,
        package: &'a str,
        version: &'a str,
    ) -> BoxFuture<'a, Vec<ArtifactFile>> {
        Box::pin(ArtifactClient::list_files(self, package, version))
    }

    fn verify(&self) -> BoxFuture<'_, ()> {
        Box::pin(ArtifactClient::verify(self))
    }

    fn provider_name(&self) -> &str {
        ArtifactClient::provider_name(self)
    }
}

/// Object-safe version of ChatClient
pub trait ErasedChatClient: Send + Sync + std::fmt::Debug {
    fn send_message<'a>(
        &'a self,
        destination: &'a Destination,
        message: &'a ChatMessage,
    ) -> BoxFuture<'a, ()>;
    fn set_presence<'a>(&'a self, text: Option<&'a str>) -> BoxFuture<'a, ()>;
    fn verify(&self) -> BoxFuture<'_, ()>;
    fn provider_name(&self) -> &str;
}

impl<T: ChatClient> ErasedChatClient for T {
    fn send_message<'a>(
        &'a self,
        destination: &'a Destination,
        message: &'a ChatMessage,
    ) -> BoxFuture<'a, ()> {
        Box::pin(ChatClient::send_message(self, destination, message))
    }

    fn set_presence<'a>(&'a self, text: Option<&'a str>) -> BoxFuture<'a, ()> {
        Box::pin(ChatClient::set_presence(self, text))
    }

    fn verify(&self) -> BoxFuture<'_, ()> {
        Box::pin(ChatClient::verify(self))
    }

    fn provider_name(&self) -> &str {
        ChatClient::provider_name(self)
    }
}
