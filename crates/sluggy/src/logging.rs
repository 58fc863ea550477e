use std::path::Path;

use sluggy_core::runtime::LOG_FILENAME;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

const LOG_ENV: &str = "SLUGGY_LOG";
const DEFAULT_FILTER: &str = "warn";

/// Install the global subscriber: stderr always, plus `<logs_dir>/sluggy.log`
/// once `sluggy init` has created the directory. Keep the guard alive until exit.
pub fn init_logger(logs_dir: &Path) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (file_layer, guard) = if logs_dir.is_dir() {
        let appender = tracing_appender::rolling::never(logs_dir, LOG_FILENAME);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer().with_writer(writer).with_ansi(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .without_time()
                .with_target(false),
        )
        .with(file_layer)
        .init();

    guard
}
