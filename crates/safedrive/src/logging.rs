//! Diagnostic logging.
//!
//! Everything is written to stderr through `tracing`, leaving stdout to
//! command output (tables, JSON, evidence paths). The `-v`/`-q` flags pick a
//! [`Verbosity`]; a set `RUST_LOG` replaces the derived filter entirely.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How much diagnostic output the CLI produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only (`-q`).
    Quiet,
    /// Retries, fallbacks and poller lifecycle.
    #[default]
    Normal,
    /// Every request attempt (`-v`).
    Verbose,
    /// Everything, including the HTTP stack (`-vv`).
    Trace,
}

impl Verbosity {
    /// Pick a verbosity from the command-line flags. `quiet` wins.
    #[must_use]
    pub fn from_flags(quiet: bool, verbose: u8) -> Self {
        match (quiet, verbose) {
            (true, _) => Self::Quiet,
            (false, 0) => Self::Normal,
            (false, 1) => Self::Verbose,
            (false, _) => Self::Trace,
        }
    }

    /// The level applied to this crate's own events.
    #[must_use]
    pub fn to_level_filter(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    /// Filter directives used when `RUST_LOG` is unset.
    ///
    /// The HTTP client crates stay at `warn` unless tracing is requested.
    #[must_use]
    pub fn filter_directive(&self) -> String {
        let http = match self {
            Self::Quiet => Level::ERROR,
            Self::Trace => Level::DEBUG,
            Self::Normal | Self::Verbose => Level::WARN,
        };
        format!(
            "safedrive={},reqwest={http},hyper={http}",
            self.to_level_filter()
        )
    }
}

/// Build the filter from `RUST_LOG` if present, else from `verbosity`.
fn build_filter(verbosity: Verbosity, rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(verbosity.filter_directive()))
}

/// Install the global subscriber. Later calls are no-ops.
///
/// ```no_run
/// use safedrive::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::from_flags(false, 1));
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = build_filter(verbosity, rust_log.as_deref());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbosity != Verbosity::Normal),
        )
        .try_init();
}

/// Warnings and errors only, captured by the test harness.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flags() {
        assert_eq!(Verbosity::from_flags(true, 2), Verbosity::Quiet);
        assert_eq!(Verbosity::from_flags(false, 0), Verbosity::Normal);
        assert_eq!(Verbosity::from_flags(false, 1), Verbosity::Verbose);
        assert_eq!(Verbosity::from_flags(false, 5), Verbosity::Trace);
    }

    #[test]
    fn test_verbosity_to_level() {
        assert_eq!(Verbosity::Quiet.to_level_filter(), Level::ERROR);
        assert_eq!(Verbosity::Normal.to_level_filter(), Level::INFO);
        assert_eq!(Verbosity::Verbose.to_level_filter(), Level::DEBUG);
        assert_eq!(Verbosity::Trace.to_level_filter(), Level::TRACE);
    }

    #[test]
    fn test_filter_directive_keeps_http_stack_quiet() {
        assert_eq!(
            Verbosity::Normal.filter_directive(),
            "safedrive=INFO,reqwest=WARN,hyper=WARN"
        );
        assert_eq!(
            Verbosity::Trace.filter_directive(),
            "safedrive=TRACE,reqwest=DEBUG,hyper=DEBUG"
        );
    }

    #[test]
    fn test_build_filter_prefers_rust_log() {
        let filter = build_filter(Verbosity::Quiet, Some("safedrive=debug"));
        let shown = filter.to_string().to_lowercase();
        assert!(shown.contains("safedrive=debug"));
        assert!(!shown.contains("reqwest"));
    }

    #[test]
    fn test_build_filter_falls_back_on_bad_rust_log() {
        let filter = build_filter(Verbosity::Normal, Some("safedrive=loudest"));
        assert!(filter.to_string().to_lowercase().contains("reqwest=warn"));

        let filter = build_filter(Verbosity::Normal, None);
        assert!(filter.to_string().to_lowercase().contains("safedrive=info"));
    }

    #[test]
    fn test_init_logging_twice() {
        init_logging(Verbosity::Quiet);
        init_logging(Verbosity::Trace);
        init_test_logging();
    }
}
