//! File logging.
//!
//! The TUI owns the terminal, so log output goes to a daily rolling file
//! instead of stderr.

use std::fs;
use std::path::Path;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

pub const LOG_ENV: &str = "SINHGAD_LOG";
const LOG_FILE: &str = "sinhgad.log";

/// Install the global subscriber. Keep the guard alive for the life of the
/// process or buffered lines are lost.
///
/// Logging never stops the program: on failure a warning goes to stderr and
/// `None` is returned.
pub fn init(config: &Config) -> Option<WorkerGuard> {
    let filter = config.log_filter.as_deref();
    match Config::log_dir() {
        Ok(directory) => init_or_warn(&directory, filter),
        Err(err) => {
            eprintln!("Warning: file logging disabled ({:#})", err);
            None
        }
    }
}

fn init_or_warn(directory: &Path, configured_filter: Option<&str>) -> Option<WorkerGuard> {
    match init_in(directory, configured_filter) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: file logging disabled ({:#})", err);
            None
        }
    }
}

fn init_in(directory: &Path, configured_filter: Option<&str>) -> Result<WorkerGuard> {
    fs::create_dir_all(directory)?;

    let file_appender = tracing_appender::rolling::daily(directory, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(build_filter(configured_filter)?)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()?;

    tracing::info!(directory = %directory.display(), "logging initialized");
    Ok(guard)
}

fn build_filter(configured_filter: Option<&str>) -> Result<EnvFilter> {
    match EnvFilter::try_from_env(LOG_ENV) {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(configured_filter.unwrap_or("info"))?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_configured_filter_is_used() {
        if std::env::var(LOG_ENV).is_ok() {
            return;
        }
        let filter = build_filter(Some("sinhgad=debug")).unwrap();
        assert_eq!(filter.to_string(), "sinhgad=debug");
    }

    #[test]
    fn test_default_filter_is_info() {
        if std::env::var(LOG_ENV).is_ok() {
            return;
        }
        let filter = build_filter(None).unwrap();
        assert_eq!(filter.to_string(), "info");
    }

    #[test]
    fn test_unusable_log_directory_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "file").unwrap();

        assert!(init_or_warn(&blocker.join("logs"), None).is_none());
    }

    #[test]
    fn test_init_creates_log_directory() {
        let dir = TempDir::new().unwrap();
        let logs = dir.path().join("logs");

        // Another test may already own the global subscriber; the directory
        // is created before that matters.
        let _ = init_in(&logs, Some("info"));
        assert!(logs.is_dir());
    }
}
