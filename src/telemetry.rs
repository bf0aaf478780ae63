//! Log setup for the host app.
//!
//! The library only emits `tracing` events. The host calls [`init`] once at
//! startup; `RUST_LOG` takes precedence over the configured default filter.

use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "eventdeck=info";

/// Install a compact fmt subscriber. Returns `false` if a global subscriber
/// was already set (for example by a test harness or a second `init` call).
pub fn init(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .finish()
        .try_init()
        .is_ok()
}
