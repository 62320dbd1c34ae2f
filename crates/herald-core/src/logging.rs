//! Shared logging initialization for ci-herald binaries.

use std::sync::OnceLock;

static INIT: OnceLock<()> = OnceLock::new();

fn parse_level(raw: Option<&str>) -> tracing::Level {
    match raw.unwrap_or("info").to_ascii_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

/// Initialize process-level tracing output from `HERALD_LOG`.
///
/// Safe to call multiple times; only the first call installs the subscriber.
/// Best-effort, never returns an error.
pub fn init() {
    let level = parse_level(std::env::var("HERALD_LOG").ok().as_deref());
    init_with_level(level);
}

/// Initialize tracing output at an explicit level (e.g. `--verbose`).
pub fn init_with_level(level: tracing::Level) {
    if INIT.get().is_some() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
    let _ = INIT.set(());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level(Some("DEBUG")), tracing::Level::DEBUG);
        assert_eq!(parse_level(Some("warn")), tracing::Level::WARN);
        assert_eq!(parse_level(Some("nonsense")), tracing::Level::INFO);
        assert_eq!(parse_level(None), tracing::Level::INFO);
    }

    #[test]
    fn test_init_is_idempotent() {
        init_with_level(tracing::Level::INFO);
        init_with_level(tracing::Level::DEBUG);
        init();
    }
}
