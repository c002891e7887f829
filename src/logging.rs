use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "gql_telemetry=info";

/// Initializes logging with a console layer and a daily-rotated JSON file
/// layer under `dir`.
///
/// The returned guard flushes the file writer when dropped; keep it alive for
/// the life of the process.
pub fn init_logging(dir: impl AsRef<Path>, file_prefix: &str) -> std::io::Result<WorkerGuard> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let file_appender = tracing_appender::rolling::daily(dir, file_prefix);
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = fmt::layer().with_writer(std::io::stdout);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    // A subscriber installed earlier (tests, embedding applications) stays in place.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    Ok(guard)
}
