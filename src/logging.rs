//! Tracing setup
//!
//! The interactive terminal owns the screen, so in that mode log lines go to a
//! file instead of stderr. `RUST_LOG` overrides the level either way.

use std::env;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

pub enum LogTarget<'a> {
    Stderr,
    File(&'a Path),
}

/// Default log file for interactive runs
pub fn default_log_path() -> PathBuf {
    env::var("GLANCE_LOG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join("glance.log"))
}

fn filter(verbose: bool) -> EnvFilter {
    let default_level = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber; later calls are ignored
pub fn init(verbose: bool, target: LogTarget<'_>) -> io::Result<()> {
    let result = match target {
        LogTarget::Stderr => tracing_subscriber::fmt()
            .with_env_filter(filter(verbose))
            .with_writer(io::stderr)
            .try_init(),
        LogTarget::File(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter(verbose))
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
    };
    if let Err(e) = result {
        tracing::debug!("Tracing already initialized: {}", e);
    }
    Ok(())
}
