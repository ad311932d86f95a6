// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Logging setup: console output filtered by mode, plus a rolling file
//! layer under the log directory.
//!
//! Console level resolution: `LOG_LEVEL` wins, then test mode implies
//! `debug`, otherwise `info`. Silent mode (`-s` or `LOG_SILENT`) keeps only
//! errors on the console; the file layer still records everything at the
//! resolved level. The log directory is `LOG_DIR`, falling back to
//! `/var/log/gicli` and then to a per-user data directory. Files rotate
//! daily and at most [`MAX_LOG_FILES`] are retained; tracing-appender has
//! no byte-size trigger, so the 10 MB threshold is approximated by the
//! daily boundary while the five-file retention cap is kept exact.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Rotated log files kept on disk.
const MAX_LOG_FILES: usize = 5;

/// Initialize the subscriber. The returned guard must stay alive for the
/// process lifetime so buffered file output is flushed.
pub fn init(test_mode: bool, silent: bool) -> Option<WorkerGuard> {
    let level = std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| if test_mode { "debug" } else { "info" }.to_string());

    let silent = silent || std::env::var("LOG_SILENT").is_ok_and(|v| v != "0" && !v.is_empty());
    let console_level = if silent { "error" } else { level.as_str() };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(filter(console_level));

    match file_writer() {
        Some((writer, guard)) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter(&level));
            tracing_subscriber::registry()
                .with(console_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(console_layer).init();
            None
        }
    }
}

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Pick the first writable log directory and build a rolling appender.
fn file_writer() -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let directory = log_directory()?;
    std::fs::create_dir_all(&directory).ok()?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("app")
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(&directory)
        .ok()?;
    let (writer, guard) = tracing_appender::non_blocking(appender);
    Some((writer, guard))
}

fn log_directory() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("LOG_DIR") {
        return Some(PathBuf::from(dir));
    }

    let system = PathBuf::from("/var/log/gicli");
    if is_writable_dir(&system) {
        return Some(system);
    }

    dirs::data_local_dir().map(|base| base.join("gicli").join("log"))
}

fn is_writable_dir(path: &std::path::Path) -> bool {
    if std::fs::create_dir_all(path).is_err() {
        return false;
    }
    let probe = path.join(".gicli-write-probe");
    match std::fs::write(&probe, b"") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}
