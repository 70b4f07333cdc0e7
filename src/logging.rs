//! Tracing setup for the binaries.
//!
//! The library only emits events; installing a subscriber is left to the
//! program embedding it.

use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;

/// Install a compact subscriber for the current thread.
///
/// Respects `RUST_LOG` and defaults to `info`. Keep the returned guard alive
/// for as long as logging is wanted.
pub fn init_tracing() -> DefaultGuard {
    use tracing_subscriber::layer::SubscriberExt;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false);

    let subscriber = tracing_subscriber::Registry::default()
        .with(env_filter)
        .with(fmt_layer);

    tracing::subscriber::set_default(subscriber)
}
