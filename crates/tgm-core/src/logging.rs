use std::fs;

use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{Builder, Rotation},
};
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::{config::LogConfig, errors::Error, Result};

/// Keeps the background log writers alive; drop it on shutdown to flush.
#[must_use = "dropping the guards stops file logging"]
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

/// Initialize tracing for a binary.
///
/// Console output is colored and filtered by `RUST_LOG` (falling back to
/// `cfg.console_level`). Files in `cfg.log_dir`:
/// - `<service>.YYYY-MM-DD.log`, rotated daily, at `cfg.file_level`
/// - `<service>_errors.YYYY-MM-DD.log`, errors only
pub fn init(service_name: &str, cfg: &LogConfig) -> Result<LogGuards> {
    fs::create_dir_all(&cfg.log_dir)?;

    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,tgm={lvl},tgm_core={lvl},tgm_api={lvl},tgm_mtproto={lvl},{service_name}={lvl}",
            lvl = cfg.console_level
        ))
    });
    let file_filter = EnvFilter::try_new(format!(
        "warn,tgm={lvl},tgm_core={lvl},tgm_api={lvl},tgm_mtproto={lvl}",
        lvl = cfg.file_level
    ))
    .map_err(|e| Error::Config(format!("invalid FILE_LOG_LEVEL: {e}")))?;

    let main_appender = Builder::new()
        .rotation(Rotation::DAILY)
        .filename_prefix(service_name)
        .filename_suffix("log")
        .max_log_files(cfg.max_files.max(1))
        .build(&cfg.log_dir)
        .map_err(|e| Error::Config(format!("cannot open log file: {e}")))?;
    let error_appender = Builder::new()
        .rotation(Rotation::DAILY)
        .filename_prefix(format!("{service_name}_errors"))
        .filename_suffix("log")
        .max_log_files(cfg.max_files.max(1))
        .build(&cfg.log_dir)
        .map_err(|e| Error::Config(format!("cannot open error log file: {e}")))?;

    let (main_writer, main_guard) = tracing_appender::non_blocking(main_appender);
    let (error_writer, error_guard) = tracing_appender::non_blocking(error_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(true)
                .with_filter(console_filter),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(main_writer)
                .with_filter(file_filter),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(error_writer)
                .with_filter(LevelFilter::ERROR),
        )
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialized: {e}")))?;

    Ok(LogGuards {
        _guards: vec![main_guard, error_guard],
    })
}
