//! Logging initialization.
//!
//! Logs go to a file so they never draw over the TUI or mix with a reply
//! printed by `ask`. Each run gets its own file:
//! `<config dir>/logs/maiide.2024-12-06-14-30-25.log`.
//!
//! The level comes from `RUST_LOG` (default `info`), e.g.
//! `RUST_LOG=maiide=debug` to see skipped stream events.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub fn log_file_name() -> String {
    format!("maiide.{}.log", Local::now().format("%Y-%m-%d-%H-%M-%S"))
}

/// Install the global subscriber writing into `log_dir`.
///
/// Returns the log file path, or `None` when logging could not be set up
/// (the program runs on without it).
pub fn init_logging(log_dir: &Path) -> Option<PathBuf> {
    if let Err(e) = fs::create_dir_all(log_dir) {
        eprintln!("Warning: Failed to create logs directory {}: {}", log_dir.display(), e);
        return None;
    }

    let log_path = log_dir.join(log_file_name());
    let log_file = match fs::File::create(&log_path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Warning: Failed to create log file {}: {}", log_path.display(), e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
    {
        eprintln!("Warning: Failed to install logger: {}", e);
        return None;
    }

    // The writer must outlive every log call; keep it for the whole run.
    std::mem::forget(guard);

    tracing::info!("Logging initialized - writing to {}", log_path.display());
    Some(log_path)
}
