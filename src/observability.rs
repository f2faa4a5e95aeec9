// SPDX-License-Identifier: Apache-2.0

//! Logging and observability helpers.

pub mod sensitive;

pub use sensitive::{redact_url, Sensitive};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "sqlgate.log";
const DEFAULT_RETENTION_DAYS: u64 = 14;
const DEFAULT_FILTER: &str = "sqlgate=info,gate_sql=info";

/// Where and how much to log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log directory; defaults to the platform data dir
    pub directory: Option<PathBuf>,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
    pub retention_days: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directory: None,
            filter: DEFAULT_FILTER.to_string(),
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl LogConfig {
    pub fn log_directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(default_log_directory)
    }
}

/// Installs the JSON file subscriber and the panic hook.
///
/// The transport owns stdout, so nothing is ever written there. Returns the
/// directory logs go to.
pub fn init_tracing(config: &LogConfig) -> PathBuf {
    let log_dir = config.log_directory();
    let _ = fs::create_dir_all(&log_dir);

    if let Err(e) = cleanup_old_logs(&log_dir, config.retention_days) {
        eprintln!("Failed to clean up old logs: {}", e);
    }

    let file_appender: RollingFileAppender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(file_appender)
        .json()
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_current_span(true)
        .with_span_list(true)
        .with_ansi(false)
        .with_span_events(FmtSpan::CLOSE)
        .try_init();

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info.payload();
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            format!("PANIC: {}", s)
        } else if let Some(s) = payload.downcast_ref::<String>() {
            format!("PANIC: {}", s)
        } else {
            "PANIC: unknown cause".to_string()
        };

        tracing::error!(target: "panic", location = %location, message = %msg, "Gateway panicked");
        previous_hook(panic_info);
    }));

    tracing::info!(log_dir = %log_dir.display(), "Tracing initialized");
    log_dir
}

fn default_log_directory() -> PathBuf {
    let mut path = dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir);
    path.push("sqlgate");
    path.push("logs");
    path
}

/// Removes rolled log files older than the retention window. Returns how
/// many were removed.
pub fn cleanup_old_logs(log_dir: &Path, retention_days: u64) -> std::io::Result<usize> {
    let now = SystemTime::now();
    let retention = Duration::from_secs(retention_days * 24 * 60 * 60);
    let mut removed = 0;

    for entry in fs::read_dir(log_dir)? {
        let path = entry?.path();
        let is_log = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with(LOG_FILE_PREFIX))
            .unwrap_or(false);
        if !is_log {
            continue;
        }

        let age = fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if age.is_some_and(|age| age > retention) {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => eprintln!("Failed to remove old log file {:?}: {}", path, e),
            }
        }
    }
    Ok(removed)
}
