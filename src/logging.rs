//! Tracing setup for binaries and tests.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::core::errors::{Result, WalletError};

/// Installs a global `fmt` subscriber writing to stderr.
///
/// `RUST_LOG` wins when set; otherwise the level is `info`, or `debug` when `debug` is true.
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(debug: bool) -> Result<()> {
    let fallback = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| WalletError::Config(format!("tracing already initialised: {}", e)))
}
