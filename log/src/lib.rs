use std::sync::Mutex;

use slog::Drain;
use slog::Fuse;
use slog_async::Async;
use slog_json::Json;

pub use slog::{debug, error, info, o, trace, warn, Discard, Logger};

/// Builds the root JSON logger, writing to standard error.
pub fn initialize_logger() -> Logger {
    let drain = Mutex::new(Json::default(std::io::stderr())).map(Fuse);
    let drain = Async::new(drain).build().fuse();

    Logger::root(
        drain,
        o!("service" => info::NAME, "version" => info::VERSION, "revision" => info::REVISION, "build_timestamp" => info::BUILD_TIMESTAMP),
    )
}

/// Routes `RUST_LOG`-filtered output through slog. The guard must be
/// kept alive for as long as logging is needed.
#[cfg(feature = "env_logging")]
pub fn initialize_env_logger(
) -> Result<slog_scope::GlobalLoggerGuard, Box<dyn std::error::Error + Send + Sync>> {
    Ok(slog_envlogger::init()?)
}

/// A logger that drops everything.
pub fn discard() -> Logger {
    Logger::root(Discard, o!())
}
