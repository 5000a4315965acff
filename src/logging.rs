//! Tracing subscriber setup for the CLI.
//!
//! Logs go to stderr so stdout stays machine-readable. `RUST_LOG` is honoured
//! unless `-v` or `-q` is given.

use crate::error::{QueueError, Result};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Filter used when neither a flag nor `RUST_LOG` says otherwise.
pub const DEFAULT_FILTER: &str = "captionq=info";

/// Build the level filter for the given verbosity flags.
pub fn build_filter(verbose: bool, quiet: bool) -> EnvFilter {
    if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(verbose: bool, quiet: bool) -> Result<()> {
    tracing_subscriber::registry()
        .with(build_filter(verbose, quiet))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose)
                .with_level(true),
        )
        .try_init()
        .map_err(|e| QueueError::ConfigError(format!("failed to initialise logging: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_flag_filters() {
        assert_eq!(build_filter(false, true).to_string(), "error");
        assert_eq!(build_filter(true, false).to_string(), "debug");
        // Quiet wins over verbose
        assert_eq!(build_filter(true, true).to_string(), "error");
    }

    #[test]
    #[serial]
    fn test_default_filter_without_env() {
        // SAFETY: serialized with the other tests touching the environment
        unsafe { std::env::remove_var("RUST_LOG") };
        assert_eq!(build_filter(false, false).to_string(), DEFAULT_FILTER);
    }

    #[test]
    #[serial]
    fn test_rust_log_is_honoured() {
        // SAFETY: serialized with the other tests touching the environment
        unsafe { std::env::set_var("RUST_LOG", "warn") };
        let filter = build_filter(false, false);
        unsafe { std::env::remove_var("RUST_LOG") };
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    #[serial]
    fn test_second_init_fails() {
        // Only the first install in a process can succeed
        let _ = init_logging(false, true);
        assert!(matches!(
            init_logging(false, true),
            Err(QueueError::ConfigError(_))
        ));
    }
}
