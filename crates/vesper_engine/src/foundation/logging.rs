//! Logging utilities and structured logging support

pub use log::{debug, info, warn, error, trace};

/// Initialize the logging system
///
/// `filter` uses the `env_logger` directive syntax (e.g. `"info,vesper_engine::ecs=debug"`).
/// A `RUST_LOG` environment variable takes precedence over the given filter.
/// Calling this more than once is harmless; later calls are ignored.
pub fn init(filter: &str) {
    let env = env_logger::Env::default().default_filter_or(filter.to_string());
    if env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init()
        .is_err()
    {
        log::debug!("Logger already initialized, ignoring filter '{}'", filter);
    }
}

/// Initialize logging for tests (captured output, debug level)
#[cfg(test)]
pub fn init_for_tests() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}
