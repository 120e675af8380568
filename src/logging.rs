//! Tracing setup: a timestamped log file per run, stderr when that fails.

use chrono::NaiveDateTime;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// `<prefix>.<MM_dd_yyyy_h_mm>.log`, hour on a 12-hour clock without padding
pub fn log_file_name(prefix: &str, at: NaiveDateTime) -> String {
    format!("{}.{}.log", prefix, at.format("%m_%d_%Y_%-I_%M"))
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Returns the log file in use, if any.
pub fn init_tracing(log_dir: &Path, prefix: &str) -> Option<PathBuf> {
    let path = log_dir.join(log_file_name(prefix, chrono::Local::now().naive_local()));

    let opened = fs::create_dir_all(log_dir)
        .and_then(|()| OpenOptions::new().create(true).append(true).open(&path));

    match opened {
        Ok(file) => {
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .with(env_filter())
                .try_init();
            tracing::info!(path = %path.display(), "Setup log opened");
            Some(path)
        }
        Err(e) => {
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(env_filter())
                .try_init();
            tracing::warn!("Cannot open log file {:?} for writing: {}", path, e);
            None
        }
    }
}
