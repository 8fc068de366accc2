// src/logging.rs
//! Logging setup for the `hdemg` binary
//!
//! The library only emits `tracing` events. This module installs the
//! subscriber that prints them.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Verbosity of the printed diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only
    Quiet,
    /// Info and above, which includes data warnings
    #[default]
    Normal,
    Verbose,
    Trace,
}

impl Verbosity {
    /// Map to the tracing level of the crate's own events
    #[must_use]
    pub fn to_level_filter(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    /// Verbosity from the `-q` flag and the number of `-v` flags
    pub fn from_flags(quiet: bool, verbose: u8) -> Self {
        match (quiet, verbose) {
            (true, _) => Self::Quiet,
            (false, 0) => Self::Normal,
            (false, 1) => Self::Verbose,
            _ => Self::Trace,
        }
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over `verbosity`. Calling it again is a no-op.
pub fn init_logging(verbosity: Verbosity) {
    let default_filter = format!("hdemg_core={},hdemg={}", verbosity.to_level_filter(), verbosity.to_level_filter());
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    );
    let _ = subscriber.try_init();
}
