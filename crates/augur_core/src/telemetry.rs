//! Tracing bootstrap for hosts embedding the orchestrator.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "augur=info,warn";

/// Install a global fmt subscriber filtered by `RUST_LOG`.
///
/// Returns `false` when a subscriber was already installed; calling this
/// more than once is harmless.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init()
        .is_ok()
}
