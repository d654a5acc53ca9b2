//! Subscriber setup: human-readable lines on stderr plus the diagnostics
//! collector on the same registry.

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::DEFAULT_LOG_FILTER;
use crate::diagnostics::{self, DiagnosticsLayer};

/// Installs the global subscriber once. Later calls, and calls after some
/// other subscriber won the race, return false.
pub fn init() -> bool {
    if !diagnostics::mark_initialized() {
        return false;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_filter(filter);
    let collector = DiagnosticsLayer::new(diagnostics::global()).with_filter(LevelFilter::DEBUG);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(collector)
        .try_init()
        .is_ok()
}
