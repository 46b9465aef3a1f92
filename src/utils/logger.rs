use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging system.
///
/// RUST_LOG takes precedence over `level`. Logs go to stderr unless `log_file` is set,
/// in which case they are appended to that file (pretty output drops ANSI colours there).
pub fn init_logger(level: &str, json_output: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level '{}'", level))?;

    let registry = tracing_subscriber::registry().with(filter);

    let file = match log_file {
        Some(path) => Some(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?,
        ),
        None => None,
    };

    match (json_output, file) {
        (true, Some(file)) => {
            registry
                .with(fmt::layer().json().with_writer(Mutex::new(file)))
                .try_init()?;
        }
        (true, None) => {
            registry.with(fmt::layer().json().with_writer(std::io::stderr)).try_init()?;
        }
        (false, Some(file)) => {
            registry
                .with(fmt::layer().pretty().with_ansi(false).with_writer(Mutex::new(file)))
                .try_init()?;
        }
        (false, None) => {
            // Pretty formatting for interactive runs
            registry
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .try_init()?;
        }
    }

    Ok(())
}

/// Initialize logger from config
pub fn init_from_config(config: &crate::utils::config::LoggingConfig) -> Result<()> {
    let json = config.output == "json";
    let log_file = if !config.file_path.is_empty() {
        Some(Path::new(&config.file_path))
    } else {
        None
    };

    init_logger(&config.level, json, log_file)
}
