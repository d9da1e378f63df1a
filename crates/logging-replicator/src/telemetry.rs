//! Tracing subscriber bootstrap (ambient, SPEC_FULL.md §1.1).
//!
//! This crate never installs a global subscriber on its own — the embedding
//! process owns that decision. `init()` is a convenience for binaries and
//! integration tests that want the donor's usual `RUST_LOG`-driven
//! `EnvFilter` setup without repeating it at every call site.

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, defaulting to `info`.
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
