//! Structured logging for Vigil.
//!
//! Console output with uptime timestamps and module targets, plus an optional
//! JSON log file for post-mortem analysis of long unattended runs. The level
//! comes from `RUST_LOG` when set, otherwise from [`LogConfig::level`].

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use vigil_config::LogConfig;

/// Filter used when neither `RUST_LOG` nor the config specify one.
pub const DEFAULT_FILTER: &str = "info";

/// Name of the JSON log file created inside the configured directory.
pub const LOG_FILE_NAME: &str = "vigil.log";

/// Initialize the global tracing subscriber.
///
/// Must be called at most once per process.
///
/// ```no_run
/// use vigil_config::LogConfig;
///
/// vigil_log::init_logging(&LogConfig::default());
/// ```
pub fn init_logging(config: &LogConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if let Some(log_file) = open_log_file(config) {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        subscriber.with(file_layer).init();
        return;
    }

    subscriber.init();
}

/// Filter directive derived from the config, falling back to [`DEFAULT_FILTER`].
pub fn filter_directive(config: &LogConfig) -> String {
    if config.level.trim().is_empty() {
        DEFAULT_FILTER.to_string()
    } else {
        config.level.clone()
    }
}

/// Path of the JSON log file, if file logging is enabled.
pub fn log_file_path(config: &LogConfig) -> Option<PathBuf> {
    match (&config.dir, config.json_file) {
        (Some(dir), true) => Some(dir.join(LOG_FILE_NAME)),
        _ => None,
    }
}

fn open_log_file(config: &LogConfig) -> Option<File> {
    let path = log_file_path(config)?;
    let dir = path.parent().unwrap_or(Path::new("."));
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!("cannot create log directory {}: {e}", dir.display());
        return None;
    }
    match File::create(&path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("cannot create log file {}: {e}", path.display());
            None
        }
    }
}
