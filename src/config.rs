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

//! Command line options

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use gkn_core::settings;

pub const DEFAULT_REFRESH_MS: u64 = 1000;
const MIN_REFRESH_MS: u64 = 100;

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "gknvidia")]
#[command(version)]
#[command(about = "NVIDIA GPU monitor panel for the terminal")]
#[command(long_about = "NVIDIA GPU monitor panel for the terminal

Reads clocks, temperature, fan, power, utilization and memory through NVML,
NV-CONTROL (nvidia-settings) or nvidia-smi.

ENVIRONMENT VARIABLES:
    GKNVIDIA_LOG=debug     Log level when --logging is on

FILES:
    ~/.config/gknvidia/gknvidia.conf   Panel settings
    ~/.config/gknvidia/logs.json       JSON log (with --logging)")]
pub struct Options {
    /// Sample every GPU once, print the panel and exit
    #[arg(long)]
    pub once: bool,

    /// With --once, print rows as JSON
    #[arg(long, requires = "once")]
    pub json: bool,

    /// Write JSON logs to ~/.config/gknvidia/logs.json
    #[arg(long)]
    pub logging: bool,

    /// Settings file (default ~/.config/gknvidia/gknvidia.conf)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Refresh interval in milliseconds, at least 100
    #[arg(long = "interval", value_name = "MS", default_value_t = DEFAULT_REFRESH_MS, value_parser = parse_interval)]
    interval_ms: u64,
}

fn parse_interval(value: &str) -> Result<u64, String> {
    let ms: u64 = value
        .parse()
        .map_err(|_| format!("invalid interval '{}'", value))?;
    Ok(ms.max(MIN_REFRESH_MS))
}

impl Options {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Settings file to read and write
    pub fn settings_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(settings::config_path)
    }
}
