//! Session logger: routes `tracing` output to a single file in the OS data directory.
//!
//! The file is truncated at each launch, so it only ever holds output from the most
//! recent session.
//!
//! Log location:
//!   Windows:  `%APPDATA%\IntraPaint\intrapaint.log`
//!   Linux:    `~/.local/share/IntraPaint/intrapaint.log`
//!   macOS:    `~/Library/Application Support/IntraPaint/intrapaint.log`
//!
//! `RUST_LOG` overrides the default `info` filter. With `verbose` set, the same events
//! are mirrored to stderr.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Path of the current session log, once [`init`] has opened it.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

/// Install the global subscriber writing to the default session log.
pub fn init(verbose: bool) {
    init_at(&log_file_path(), verbose);
}

/// Install the global subscriber writing to `path`. Failing to open the file is not
/// fatal; logging then goes to stderr only when `verbose` is set.
pub fn init_at(path: &Path, verbose: bool) {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let file = match OpenOptions::new().create(true).write(true).truncate(true).open(path) {
        Ok(file) => {
            let _ = LOG_PATH.set(path.to_path_buf());
            Some(file)
        }
        Err(e) => {
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
            None
        }
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = file.map(|file| {
        fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(true)
            .with_line_number(true)
    });
    let stderr_layer = verbose.then(|| fmt::layer().with_writer(std::io::stderr).with_target(false));

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init();
    if installed.is_err() {
        // Another subscriber won the race (tests, embedding applications).
        return;
    }

    tracing::info!(log = %path.display(), "IntraPaint session started");

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("PANIC: {}", info);
        prev(info);
    }));
}

fn log_file_path() -> PathBuf {
    data_dir().join("IntraPaint").join("intrapaint.log")
}

/// Platform data directory (without the app sub-folder).
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library").join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}
