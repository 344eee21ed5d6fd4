//! Tracing bootstrap for host applications.
//!
//! Braid itself only emits `tracing` events; installing a subscriber is the
//! host's call. This helper wires the conventional env-filter setup
//! (`RUST_LOG`, defaulting to `info`) for hosts that don't have their own.

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once: subsequent calls are no-ops because a
/// global subscriber is already set.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_does_not_panic() {
        init();
        init();
    }
}
