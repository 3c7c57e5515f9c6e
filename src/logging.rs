//! Logging setup.
//!
//! Handlers log through `tracing`; actix's `Logger` middleware logs through
//! the `log` facade, which tracing-subscriber bridges into the same output.

use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Verbosity level for logging output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    #[must_use]
    pub fn level(self) -> Level {
        match self {
            Self::Quiet => Level::WARN,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
        }
    }

    /// Reads `LIVSAFE_VERBOSE=1` / `LIVSAFE_QUIET=1`.
    pub fn from_env() -> Self {
        let flag = |name: &str| std::env::var(name).is_ok_and(|v| v == "1" || v == "true");
        if flag("LIVSAFE_VERBOSE") {
            Self::Verbose
        } else if flag("LIVSAFE_QUIET") {
            Self::Quiet
        } else {
            Self::Normal
        }
    }
}

/// Initialize the global subscriber. `RUST_LOG` takes precedence over
/// `verbosity`. Calling this twice is harmless.
pub fn init_logging(verbosity: Verbosity) {
    let level = verbosity.level();
    let default_filter = format!("livsafe={level},actix_web={level},actix_server=info");

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true));

    let _ = subscriber.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(Verbosity::Quiet.level(), Level::WARN);
        assert_eq!(Verbosity::Normal.level(), Level::INFO);
        assert_eq!(Verbosity::Verbose.level(), Level::DEBUG);
        assert_eq!(Verbosity::default(), Verbosity::Normal);
    }

    #[test]
    fn test_init_logging_twice_does_not_panic() {
        init_logging(Verbosity::Normal);
        init_logging(Verbosity::Verbose);
    }
}
