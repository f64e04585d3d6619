//! Structured logging setup.
//!
//! Logs go to stderr so stdout stays reserved for transcript JSON.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding a filter directive, checked before `RUST_LOG`.
pub const LOG_ENV: &str = "PARLANCE_LOG";

/// Filter directive for the given verbosity flags.
///
/// `quiet` wins over `verbose`. Dependencies stay at `warn` unless
/// `-vv` is given.
pub fn default_directive(verbose: u8, quiet: bool) -> &'static str {
    match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "warn,parlance=info",
        (false, 1) => "warn,parlance=debug",
        (false, _) => "info,parlance=trace",
    }
}

/// Install the global subscriber.
///
/// An explicit `PARLANCE_LOG` or `RUST_LOG` directive overrides the flags.
/// Calling this twice is harmless: the second call leaves the first
/// subscriber in place.
pub fn init(verbose: u8, quiet: bool) {
    let env_filter = std::env::var(LOG_ENV)
        .ok()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default_directive(verbose, quiet)));

    let result = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose > 1),
        )
        .try_init();

    if result.is_err() {
        tracing::debug!("Logging already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_overrides_verbose() {
        assert_eq!(default_directive(3, true), "warn");
    }

    #[test]
    fn verbosity_raises_crate_level() {
        assert_eq!(default_directive(0, false), "warn,parlance=info");
        assert_eq!(default_directive(1, false), "warn,parlance=debug");
        assert_eq!(default_directive(2, false), "info,parlance=trace");
    }

    #[test]
    fn directives_parse() {
        for v in 0..3 {
            assert!(EnvFilter::try_new(default_directive(v, false)).is_ok());
        }
    }

    #[test]
    fn init_twice_does_not_panic() {
        init(0, true);
        init(2, false);
    }
}
