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

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde_json::json;

use gkn_core::{settings, BackendKind, MetricKind, PluginState, RenderedRow};

use crate::config::DEFAULT_REFRESH_MS;
use crate::logger::log_event;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Focus {
    Panel,
    Options,
}

pub struct App {
    pub plugin: PluginState,
    pub settings_path: PathBuf,
    pub last_refresh: Instant,
    pub refresh_interval: Duration,
    pub rows: Vec<RenderedRow>,
    pub status: String,
    pub focus: Focus,
    // selection inside the options list, by display position
    pub options_idx: usize,
    // backend path popup
    pub show_path_popup: bool,
    pub path_kind: BackendKind,
    pub path_input: String,
    pub path_valid: bool,
    // unsaved option changes and the quit prompt they trigger
    pub dirty: bool,
    pub show_confirm_save_popup: bool,
}

impl App {
    pub fn new(plugin: PluginState, settings_path: PathBuf) -> Self {
        let path_kind = plugin.binding().kind();
        let path_input = plugin.binding().path().to_string();
        Self {
            plugin,
            settings_path,
            last_refresh: Instant::now(),
            refresh_interval: Duration::from_millis(DEFAULT_REFRESH_MS),
            rows: Vec::new(),
            status: String::new(),
            focus: Focus::Panel,
            options_idx: 0,
            show_path_popup: false,
            path_kind,
            path_input,
            path_valid: false,
            dirty: false,
            show_confirm_save_popup: false,
        }
    }

    /// Load the settings file at `settings_path` and build the app around it
    pub fn load(settings_path: PathBuf) -> Self {
        let record = settings::load_settings(&settings_path);
        Self::new(PluginState::new(record), settings_path)
    }

    /// Bind the configured backend and take the first sample
    pub fn create(&mut self) {
        match self.plugin.create() {
            Ok(()) => self.status = self.bound_status(),
            Err(e) => self.status = format!("No GPUs available: {}", e),
        }
        log_event(
            "create",
            json!({
                "backend": self.plugin.binding().kind().tag(),
                "path": self.plugin.binding().path(),
                "gpus": self.plugin.inventory().good_count(),
            }),
        );
        self.refresh();
    }

    pub fn refresh(&mut self) {
        self.rows = self.plugin.refresh();
        self.last_refresh = Instant::now();
    }

    pub fn refresh_due(&self) -> bool {
        self.last_refresh.elapsed() >= self.refresh_interval
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Panel => Focus::Options,
            Focus::Options => Focus::Panel,
        };
    }

    /// Metric under the options cursor
    pub fn selected_metric(&self) -> Option<MetricKind> {
        self.plugin.registry().current_order().get(self.options_idx).copied()
    }

    pub fn select_next(&mut self) {
        if self.options_idx + 1 < MetricKind::COUNT {
            self.options_idx += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.options_idx = self.options_idx.saturating_sub(1);
    }

    pub fn toggle_selected(&mut self) {
        let Some(kind) = self.selected_metric() else {
            return;
        };
        self.plugin.toggle(kind);
        self.dirty = true;
        let state = if self.plugin.registry().is_enabled(kind) { "shown" } else { "hidden" };
        self.status = format!("{} {}", kind.option_label(), state);
        self.refresh();
    }

    /// Move the selected metric one position; the cursor follows it
    pub fn move_selected(&mut self, up: bool) {
        let Some(kind) = self.selected_metric() else {
            return;
        };
        if self.plugin.move_metric(kind, up) {
            if up {
                self.select_prev();
            } else {
                self.select_next();
            }
            self.dirty = true;
            self.refresh();
        }
    }

    pub fn open_path_popup(&mut self) {
        self.path_kind = self.plugin.binding().kind();
        self.path_input = self.plugin.binding().path().to_string();
        self.show_path_popup = true;
        self.revalidate_path();
    }

    pub fn close_path_popup(&mut self) {
        self.show_path_popup = false;
    }

    /// Next backend strategy, starting from its default path
    pub fn cycle_path_kind(&mut self) {
        let all = BackendKind::ALL;
        let pos = all.iter().position(|k| *k == self.path_kind).unwrap_or(0);
        self.path_kind = all[(pos + 1) % all.len()];
        self.path_input = self.path_kind.default_path().to_string();
        self.revalidate_path();
    }

    pub fn path_push(&mut self, c: char) {
        self.path_input.push(c);
        self.revalidate_path();
    }

    pub fn path_pop(&mut self) {
        self.path_input.pop();
        self.revalidate_path();
    }

    pub fn path_clear(&mut self) {
        self.path_input.clear();
        self.revalidate_path();
    }

    /// Runs on every keystroke, so it only looks the path up; the full check
    /// that runs the tool happens in [`apply_path`](Self::apply_path)
    fn revalidate_path(&mut self) {
        self.path_valid = self.plugin.precheck_backend(self.path_kind, &self.path_input);
    }

    /// Fully validate the path in the popup and rebind to it
    pub fn apply_path(&mut self) {
        if !self.path_valid || !self.plugin.stage_backend(self.path_kind, &self.path_input) {
            self.path_valid = false;
            self.status = format!("{} is not a usable {} path", self.path_input, self.path_kind);
            return;
        }
        match self.plugin.apply() {
            Ok(true) => self.status = self.bound_status(),
            Ok(false) => {}
            Err(e) => self.status = format!("No GPUs available: {}", e),
        }
        log_event(
            "rebind",
            json!({
                "backend": self.path_kind.tag(),
                "path": self.path_input,
                "loaded": self.plugin.is_loaded(),
            }),
        );
        self.show_path_popup = false;
        self.dirty = true;
        self.refresh();
    }

    /// Write the current record to the settings file
    pub fn save(&mut self) -> bool {
        match settings::save_settings(&self.settings_path, &self.plugin.config_record()) {
            Ok(()) => {
                self.dirty = false;
                self.status = format!("Saved to {}", self.settings_path.display());
                log_event("save", json!({ "record": self.plugin.encode_config() }));
                true
            }
            Err(e) => {
                self.status = format!("Save failed: {}", e);
                false
            }
        }
    }

    fn bound_status(&self) -> String {
        let binding = self.plugin.binding();
        format!(
            "{} at {}: {} GPU(s)",
            binding.kind(),
            binding.path(),
            self.plugin.inventory().good_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn unbound_app(dir: &TempDir) -> App {
        App::new(PluginState::default(), dir.path().join("gknvidia.conf"))
    }

    #[test]
    fn test_selection_is_clamped() {
        let dir = TempDir::new().unwrap();
        let mut app = unbound_app(&dir);
        app.select_prev();
        assert_eq!(app.options_idx, 0);
        for _ in 0..20 {
            app.select_next();
        }
        assert_eq!(app.options_idx, MetricKind::COUNT - 1);
        assert_eq!(app.selected_metric(), Some(MetricKind::MemoryTotal));
    }

    #[test]
    fn test_toggle_and_move_mark_dirty() {
        let dir = TempDir::new().unwrap();
        let mut app = unbound_app(&dir);
        app.options_idx = 1;
        app.toggle_selected();
        assert!(app.dirty);
        assert!(!app.plugin.registry().is_enabled(MetricKind::UtilizationGpu));

        app.move_selected(true);
        assert_eq!(app.options_idx, 0);
        assert_eq!(app.plugin.registry().current_order()[0], MetricKind::UtilizationGpu);
        // Already at the top
        app.move_selected(true);
        assert_eq!(app.options_idx, 0);
    }

    #[test]
    fn test_invalid_path_is_not_applied() {
        let dir = TempDir::new().unwrap();
        let mut app = unbound_app(&dir);
        app.open_path_popup();
        app.path_clear();
        for c in "/nonexistent/lib.so".chars() {
            app.path_push(c);
        }
        assert!(!app.path_valid);
        app.apply_path();
        assert!(app.show_path_popup);
        assert!(app.status.contains("not a usable"));
        assert!(!app.dirty);
    }

    #[test]
    fn test_found_but_unusable_tool_is_rejected_on_apply() {
        if !std::path::Path::new("/bin/true").exists() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let mut app = unbound_app(&dir);
        app.open_path_popup();
        app.cycle_path_kind();
        app.cycle_path_kind();
        assert_eq!(app.path_kind, BackendKind::Smi);
        app.path_clear();
        for c in "/bin/true".chars() {
            app.path_push(c);
        }
        // located on disk, so typing accepts it
        assert!(app.path_valid);
        assert!(app.plugin.pending_backend().is_none());

        app.apply_path();
        assert!(!app.path_valid);
        assert!(app.show_path_popup);
        assert!(app.status.contains("not a usable"));
        assert!(!app.plugin.is_loaded());
        assert!(!app.dirty);
    }

    #[test]
    fn test_cycle_path_kind_resets_path() {
        let dir = TempDir::new().unwrap();
        let mut app = unbound_app(&dir);
        app.open_path_popup();
        assert_eq!(app.path_kind, BackendKind::Nvml);
        app.cycle_path_kind();
        assert_eq!(app.path_kind, BackendKind::NvControl);
        assert_eq!(app.path_input, "nvidia-settings");
        app.cycle_path_kind();
        app.cycle_path_kind();
        assert_eq!(app.path_kind, BackendKind::Nvml);
    }

    #[test]
    fn test_save_writes_record() {
        let dir = TempDir::new().unwrap();
        let mut app = unbound_app(&dir);
        app.options_idx = 4;
        app.toggle_selected();
        assert!(app.save());
        assert!(!app.dirty);
        let line = settings::read_record_line(&app.settings_path).unwrap();
        assert_eq!(line.as_deref(), Some("NVML 7ef abcdefghijk libnvidia-ml.so"));
    }
}
