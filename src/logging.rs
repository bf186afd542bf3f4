//! Structured logging setup shared by both binaries: human-readable
//! output on stderr, plus a full non-blocking file log under `logs/`.

use std::fs;

use anyhow::Result;
use tracing_appender::non_blocking;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init_logging(filter_override: Option<&str>) -> Result<WorkerGuard> {
    fs::create_dir_all("logs")?;
    let file_appender = tracing_appender::rolling::never("logs", "app.log");
    let (file_writer, guard) = non_blocking(file_appender);

    let filter = match filter_override {
        Some(f) => EnvFilter::new(f),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let stderr_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let file_layer = fmt::layer()
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}
