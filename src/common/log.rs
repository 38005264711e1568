//! Logging helpers
//!
//! This module sets up the process-wide logger.

/// Initialize the logging system
///
/// `RUST_LOG` takes precedence over `level` when it is set.
///
/// # Parameters
///
/// * `level` - Default log level (`info`, `debug`, ...)
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    env_logger::Builder::from_env(env)
        .format_timestamp_secs()
        .init();
}

/// Log level for the `--debug` switch
pub fn level_for(debug: bool) -> &'static str {
    if debug { "debug" } else { "info" }
}
