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

//! gknvidia - NVIDIA GPU monitor panel for the terminal
//!
//! The terminal host around `gkn-core`: it owns the refresh timer, draws the
//! panel and the options list, and writes the settings file.

pub mod app;
pub mod config;
pub mod events;
pub mod logger;
pub mod ui;
