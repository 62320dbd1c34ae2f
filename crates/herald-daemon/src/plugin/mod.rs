pub mod context;
pub mod types;

pub use context::PluginContext;
pub use types::PluginError;
