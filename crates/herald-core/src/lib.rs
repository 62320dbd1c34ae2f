//! Core types for ci-herald
//!
//! This crate holds the pieces shared by every ci-herald binary:
//! configuration resolution, home directory lookup, logging setup, and the
//! file-backed registry that maps repositories to chat destinations.

pub mod config;
pub mod home;
pub mod logging;
pub mod registry;

pub use registry::{ChatIdentity, Destination, FileRegistry, Registry, RegistryError};

// Re-export toml for plugin config access
pub use toml;
