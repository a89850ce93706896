//! Log output for the command-line host.
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! whoever embeds it. The CLI calls [`init_tracing`] once at startup.

use tracing_subscriber::EnvFilter;

const DEBUG_ENV: &str = "CODECRAFT_ANALYTICS_DEBUG";

fn is_debug_enabled() -> bool {
    cfg!(debug_assertions) || std::env::var(DEBUG_ENV).unwrap_or_default() == "1"
}

/// `RUST_LOG` wins when set. Otherwise this crate logs at debug when
/// `CODECRAFT_ANALYTICS_DEBUG=1` (or in debug builds) and at warn elsewhere.
pub fn default_directive() -> String {
    let level = if is_debug_enabled() { "debug" } else { "warn" };
    format!("warn,codecraft_analytics={}", level)
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive()));

    // A host that installed its own subscriber keeps it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
