//! Log subscriber setup for the daemon.

use tracing::Level;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Level used unless verbose output is requested.
pub const DEFAULT_LEVEL: Level = Level::INFO;

/// Level for a `--verbose` switch.
pub fn level(verbose: bool) -> Level {
    if verbose { Level::DEBUG } else { DEFAULT_LEVEL }
}

/// Install the global subscriber. `RUST_LOG`, when set, overrides `level`.
///
/// Fails if a global subscriber is already installed.
pub fn init(level: Level) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(filter(level))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
}

fn filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_selects_debug() {
        assert_eq!(level(false), Level::INFO);
        assert_eq!(level(true), Level::DEBUG);
    }

    #[test]
    fn second_init_is_an_error() {
        let _ = init(Level::INFO);
        assert!(init(Level::DEBUG).is_err());
    }
}
