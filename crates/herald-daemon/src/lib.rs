//! ci-herald daemon: the build-watch reconciliation engine and its runner

pub mod daemon;
pub mod plugin;
pub mod plugins;
