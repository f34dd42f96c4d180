//! Tracing setup.
//!
//! Logs go to a daily-rolling file under the cache directory, never to the terminal, so `fix`
//! and `parse` output stays clean on stdout. `RUST_LOG` overrides the default `info` filter.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::constants::constants;

fn log_dir() -> Result<PathBuf> {
  let proj_dirs = ProjectDirs::from("", "", &constants().app_name).context("No home directory for log files")?;
  Ok(proj_dirs.cache_dir().join("logs"))
}

fn filter(verbose: bool) -> EnvFilter {
  let default = if verbose { "debug" } else { "info" };
  EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the global subscriber. The returned guard must live until exit or buffered lines
/// are lost.
pub fn init_tracing(verbose: bool) -> Result<WorkerGuard> {
  init_tracing_in(&log_dir()?, verbose)
}

pub fn init_tracing_in(dir: &Path, verbose: bool) -> Result<WorkerGuard> {
  std::fs::create_dir_all(dir).with_context(|| format!("Failed to create log directory {}", dir.display()))?;
  let appender = tracing_appender::rolling::daily(dir, format!("{}.log", constants().app_name));
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(writer).with_ansi(false).with_target(false))
    .with(filter(verbose))
    .try_init()
    .context("Tracing subscriber already installed")?;
  Ok(guard)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn writes_into_the_given_directory() {
    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("logs");
    let guard = init_tracing_in(&logs, true).unwrap();
    tracing::info!("logging: test line");
    drop(guard);
    let written: Vec<_> = std::fs::read_dir(&logs).unwrap().flatten().collect();
    assert_eq!(written.len(), 1);
    let content = std::fs::read_to_string(written[0].path()).unwrap();
    assert!(content.contains("logging: test line"));
  }
}
