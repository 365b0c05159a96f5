//! Logging initialization
//!
//! The library only emits through the `log` facade; binaries pick the sink.

pub use log::{debug, error, info, trace, warn};

/// Initialize `env_logger` from `RUST_LOG`
pub fn init() {
    env_logger::init();
}

/// Initialize `env_logger` with a default filter used when `RUST_LOG` is unset
///
/// Safe to call more than once; later calls are ignored.
pub fn init_with_level(default_filter: &str) {
    let env = env_logger::Env::default().default_filter_or(default_filter);
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}
