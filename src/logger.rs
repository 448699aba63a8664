/*
 * This file is part of gknvidia.
 *
 * Copyright (C) 2025 gknvidia contributors
 *
 * gknvidia is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * gknvidia is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with gknvidia. If not, see <https://www.gnu.org/licenses/>.
 */

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gkn_core::constants::paths::user_config_dir;

const LOG_FILE: &str = "logs.json";
const FALLBACK_LOG_PATH: &str = "/tmp/gknvidia_logs.json";
const LOG_LEVEL_ENV: &str = "GKNVIDIA_LOG";

/// Where `--logging` writes
pub fn log_path() -> PathBuf {
    user_config_dir()
        .map(|dir| dir.join(LOG_FILE))
        .unwrap_or_else(|| PathBuf::from(FALLBACK_LOG_PATH))
}

fn open_append(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    OpenOptions::new().create(true).append(true).open(path).ok()
}

/// Send tracing output as JSON lines to the log file
///
/// The level comes from `GKNVIDIA_LOG` (default `info`). Returns the file
/// actually opened, or `None` when neither location was writable.
pub fn init_logging() -> Option<PathBuf> {
    let primary = log_path();
    let fallback = PathBuf::from(FALLBACK_LOG_PATH);
    let (path, file) = match open_append(&primary) {
        Some(f) => (primary, f),
        None => (fallback.clone(), open_append(&fallback)?),
    };

    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let installed = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .is_ok();

    installed.then_some(path)
}

/// Structured application event
pub fn log_event(event: &str, data: Value) {
    info!(event = event, data = %data, "event");
}
