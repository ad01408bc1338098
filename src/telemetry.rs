//! Tracing subscriber setup for binaries and tests.
//!
//! The orchestration core itself only *emits* `tracing` spans and events;
//! installing a subscriber is the embedding application's choice. These
//! helpers cover the common case: a fmt subscriber filtered by
//! `RUST_LOG`, falling back to `info` for this crate.

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber filtered by `RUST_LOG`.
///
/// Falls back to `loomflow=info` when `RUST_LOG` is unset. Panics if a
/// global subscriber is already installed; use [`try_init`] where that is
/// a legitimate situation (tests, embedders with their own setup).
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(default_filter())
        .with_target(true)
        .init();
}

/// Like [`init`], but returns quietly when a subscriber already exists.
pub fn try_init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(default_filter())
        .with_target(true)
        .try_init();
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("loomflow=info"))
}
