//! Tracing setup for binaries and services embedding the engine.
//!
//! ## Log Level Control
//! ```bash
//! RUST_LOG=debug                        # everything
//! RUST_LOG=till_engine=debug,sqlx=warn  # engine detail, quiet SQL
//! ```

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,till=debug,sqlx=warn";

/// Installs the global fmt subscriber.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    // Only test in the crate that installs the global subscriber.
    #[test]
    fn test_init_tracing_installs_once() {
        assert!(init_tracing());
        assert!(!init_tracing());
        tracing::info!(target: "till_engine", "tracing installed");
    }
}
