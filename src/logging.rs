//! Logging setup for test binaries

use tracing_subscriber::EnvFilter;

/// Default filter when neither `RUST_LOG` nor a level is given
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Install a fmt subscriber writing through the test harness.
///
/// `RUST_LOG` takes precedence over `level`. Returns false if a global
/// subscriber was already installed, which is expected when many tests in
/// one binary call this.
pub fn init_test_logging(level: Option<&str>) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or(DEFAULT_LOG_LEVEL)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_harmless() {
        init_test_logging(Some("debug"));
        assert!(!init_test_logging(Some("debug")));
    }
}
