//! Logging configuration using the `log` and `env_logger` crates.
//!
//! Log levels in this crate:
//!
//! - `warn!` - suspicious but tolerated input (e.g. unclosed regions)
//! - `debug!` - per-build summaries and cleanup results
//! - `trace!` - per-block construction detail
//!
//! Set `RUST_LOG` to control output at runtime, e.g.
//! `RUST_LOG=ir::cfg=trace` for construction detail only.

use log::LevelFilter;
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize logging from the `RUST_LOG` environment variable, defaulting
/// to `warn`. Subsequent calls are no-ops.
pub fn init_from_env() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    });
}

/// Initialize logging for tests. Safe to call from every test; uses
/// test-friendly capture and never panics when already initialized.
pub fn init_test() {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Warn)
        .is_test(true)
        .try_init();
}
