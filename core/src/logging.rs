//! Subscriber setup for binaries and tests that want to see the `tracing` output.

use crate::error::{Result, RlsError};
use tracing_subscriber::EnvFilter;

/// Installs a formatting subscriber. `RUST_LOG` wins over `default_filter` when set.
///
/// # Errors
///
/// `Config` if the filter does not parse or a global subscriber is already installed.
pub fn init_logging(default_filter: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter).map_err(|e| RlsError::Config(e.to_string()))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| RlsError::Config(e.to_string()))
}
