//! Tracing setup for binaries and tests.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "ghoulrun=info,ghoulcore=info";

/// Installs a formatting subscriber filtered by `RUST_LOG`, falling back to
/// [`DEFAULT_FILTER`]. Returns `false` if a global subscriber was already set.
pub fn init() -> bool {
    init_with(DEFAULT_FILTER)
}

pub fn init_with(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
