//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Install a formatted subscriber. `RUST_LOG` wins over `default_filter`.
///
/// Returns false if a global subscriber was already installed; calling this
/// more than once is harmless.
pub fn init_logging(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

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
    fn test_second_init_is_harmless() {
        init_logging("warn");
        assert!(!init_logging("debug"));
    }
}
