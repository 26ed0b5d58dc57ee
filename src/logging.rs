use env_logger::Env;
use log::LevelFilter;

/// Initializes the logger with the `env_logger` crate.
///
/// The filter defaults to `info` and can be overridden through `RUST_LOG`.
/// Calling it twice is harmless.
pub fn init_logger() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info")).try_init();
}

/// Initializes the logger with an explicit maximum level, ignoring `RUST_LOG`.
pub fn init_logger_with_level(level: LevelFilter) {
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_millis()
        .try_init();
}
