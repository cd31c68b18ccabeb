//! Structured logging initialization.
//!
//! Mirrors `tinyzkp_api`'s `tracing_subscriber::registry()...init()` pattern:
//! env-filter driven verbosity, optional JSON formatting for production
//! deployments.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize global `tracing` logging.
///
/// Reads `RUST_LOG` for filter directives, defaulting to `info` when unset.
/// Call once near the start of `main`; subsequent calls are no-ops (the
/// underlying `set_global_default` failure is swallowed, matching the
/// teacher's tolerance for re-init during tests).
pub fn init() {
    init_with(false)
}

/// Like [`init`], but emits newline-delimited JSON records when `json` is
/// true (for log-shipping deployments).
pub fn init_with(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);

    if json {
        let _ = registry.with(fmt::layer().json()).try_init();
    } else {
        let _ = registry.with(fmt::layer()).try_init();
    }
}
