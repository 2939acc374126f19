//! Subscriber setup for binaries and examples embedding the module.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is left to the application. [`init_tracing`] is a convenience for the
//! common case.

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, or by `default_filter`
/// when `RUST_LOG` is unset or invalid.
///
/// Returns `false` if a global subscriber was already installed, in which
/// case nothing changes.
///
/// ## Examples
///
/// ```rust
/// api_module::logging::init_tracing("warn");
/// // A second call is a no-op.
/// assert!(!api_module::logging::init_tracing("debug"));
/// ```
pub fn init_tracing(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
