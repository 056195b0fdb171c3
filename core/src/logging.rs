//! Tracing bootstrap for binaries and tests built on this crate.

use std::env;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,backend_link=debug";

/// Install a global `fmt` subscriber. Calling it again is a no-op.
///
/// Precedence:
/// 1) `RUST_LOG`
/// 2) `BACKEND_LINK_LOG`
/// 3) internal default filter
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_env_filter(filter_from_env())
        .try_init();
}

fn filter_from_env() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let configured = env::var("BACKEND_LINK_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .and_then(|v| EnvFilter::try_new(v).ok());
    configured.unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}
