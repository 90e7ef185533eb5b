//! `tracing` initialization.
//!
//! Call [`init`] once at process startup. Every suspension point elsewhere in
//! the crate (LLM calls, vector queries, rerank calls) is already wrapped in
//! its own `#[instrument]` span; this module only wires up the subscriber.

use tracing_subscriber::{EnvFilter, fmt};

/// Install a global `tracing` subscriber reading `RUST_LOG` (default `info`).
///
/// Idempotent: a second call is a no-op rather than a panic, so tests and
/// demo binaries can call it unconditionally.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
