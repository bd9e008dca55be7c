//! Logging setup helpers.
//!
//! The engine logs through `tracing` with structured fields throughout
//! (`suite.name = %…`, `binding.ix = …`, `result.status = …`). Embedding
//! applications usually install their own subscriber; these helpers cover
//! binaries and tests that just want sensible output.

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;
use veritas_core::prelude::*;

/// Installs a compact subscriber honoring `RUST_LOG`, defaulting to `info`.
pub fn init_logging() -> Result<()> {
    init_logging_with_filter("info")
}

/// Installs a compact subscriber with an explicit default filter directive.
///
/// `RUST_LOG` still wins when set. Fails if a global subscriber is already
/// installed.
pub fn init_logging_with_filter(default_filter: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().compact())
        .with(filter)
        .try_init()
        .map_err(|e| VeritasError::Internal(format!("cannot install subscriber: {e}")))
}
