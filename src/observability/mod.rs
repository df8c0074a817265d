//! Observability bootstrap.
//!
//! The engine emits `tracing` events and `metrics` counters/histograms
//! throughout; this module wires a subscriber for host applications that do
//! not bring their own. Metric export is the host's concern: the engine
//! records against the global `metrics` recorder and stays exporter-
//! agnostic.

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static INIT: OnceLock<()> = OnceLock::new();

/// Initializes a formatted `tracing` subscriber driven by `RUST_LOG`.
///
/// Defaults to `info` when `RUST_LOG` is unset. Idempotent: repeated calls
/// (e.g. from parallel tests) are no-ops, and an already-installed global
/// subscriber is left in place.
pub fn init() {
    init_with_filter(None);
}

/// Initializes the subscriber with an explicit filter directive, e.g.
/// `"palimpsest=debug"`.
pub fn init_with_filter(filter: Option<&str>) {
    INIT.get_or_init(|| {
        let filter = filter.map_or_else(
            || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            EnvFilter::new,
        );
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
}
