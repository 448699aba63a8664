//! Plugin state
//!
//! Everything the host drives: the backend binding, the device inventory,
//! the metric registry and the current layout. The host owns one
//! `PluginState` and calls into it from a single thread.

use std::collections::BTreeMap;

use tracing::{info, warn};

use gkn_error::BindError;
use gkn_gpu::{precheck_path, validate_path, BackendKind, Binding};

use crate::codec::{decode_or_default, ConfigRecord};
use crate::constants::layout::DEFAULT_ROW_HEIGHT;
use crate::display::{render_rows, RenderedRow};
use crate::inventory::Inventory;
use crate::layout::{compute_layout, Layout};
use crate::registry::{MetricKind, MetricRegistry};
use crate::sampler::{sample_all, SampleSet};

/// A backend change the user has entered but not applied yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBackend {
    pub kind: BackendKind,
    pub path: String,
}

pub struct PluginState {
    binding: Binding,
    inventory: Inventory,
    registry: MetricRegistry,
    layout: Layout,
    row_height: i32,
    pending: Option<PendingBackend>,
}

impl PluginState {
    /// State for `record`, with nothing bound yet
    pub fn new(record: ConfigRecord) -> Self {
        Self {
            binding: Binding::unbound(record.backend, record.path),
            inventory: Inventory::empty(),
            registry: record.registry,
            layout: Layout::default(),
            row_height: DEFAULT_ROW_HEIGHT,
            pending: None,
        }
    }

    /// State for a stored config line; a rejected line yields the defaults
    pub fn from_config_line(line: &str) -> Self {
        Self::new(decode_or_default(line))
    }

    /// Bind the configured backend, scan devices and plan the panel
    ///
    /// A bind failure leaves the plugin loaded with no GPUs; the error is
    /// returned for the host to report.
    pub fn create(&mut self) -> Result<(), BindError> {
        let kind = self.binding.kind();
        let path = self.binding.path().to_string();
        self.rebind(kind, &path)
    }

    /// Adopt an already-opened binding
    pub fn attach(&mut self, binding: Binding) {
        self.binding = binding;
        self.rescan();
    }

    /// One refresh tick: sample and render every layout row
    pub fn refresh(&self) -> Vec<RenderedRow> {
        render_rows(&self.layout.rows, &self.sample())
    }

    /// One sampling pass without rendering
    pub fn sample(&self) -> BTreeMap<u32, SampleSet> {
        sample_all(&self.binding, &self.inventory, &self.registry)
    }

    pub fn set_enabled(&mut self, kind: MetricKind, enabled: bool) {
        if self.registry.set_enabled(kind, enabled) {
            self.relayout();
        }
    }

    pub fn toggle(&mut self, kind: MetricKind) {
        let enabled = self.registry.is_enabled(kind);
        self.set_enabled(kind, !enabled);
    }

    /// Swap the display positions of two metrics
    pub fn reorder(&mut self, a: MetricKind, b: MetricKind) {
        self.registry.reorder(a, b);
        self.relayout();
    }

    /// Move `kind` one display position up or down
    pub fn move_metric(&mut self, kind: MetricKind, up: bool) -> bool {
        let moved = self.registry.move_by(kind, up);
        if moved {
            self.relayout();
        }
        moved
    }

    /// Quick usability check for a path still being edited. Stages nothing.
    pub fn precheck_backend(&self, kind: BackendKind, path: &str) -> bool {
        precheck_path(kind, path)
    }

    /// Validate `path` for `kind` and stage it for [`apply`](Self::apply)
    ///
    /// Returns whether the path is usable. An unusable path clears any
    /// previously staged change; the live binding is never touched.
    pub fn stage_backend(&mut self, kind: BackendKind, path: &str) -> bool {
        let valid = validate_path(kind, path);
        self.pending = valid.then(|| PendingBackend {
            kind,
            path: path.to_string(),
        });
        valid
    }

    pub fn pending_backend(&self) -> Option<&PendingBackend> {
        self.pending.as_ref()
    }

    /// Rebind to the staged backend, if any. `Ok(false)` when nothing was
    /// staged.
    pub fn apply(&mut self) -> Result<bool, BindError> {
        match self.pending.take() {
            Some(pending) => self.rebind(pending.kind, &pending.path).map(|_| true),
            None => Ok(false),
        }
    }

    /// Tear down the current backend and bind `kind` at `path`
    ///
    /// On failure the plugin has no backend and no GPUs; the old backend is
    /// not restored.
    pub fn rebind(&mut self, kind: BackendKind, path: &str) -> Result<(), BindError> {
        let result = self.binding.rebind(kind, path);
        if let Err(e) = &result {
            warn!("No GPUs available: {}", e);
        }
        self.rescan();
        result
    }

    /// Release the backend and clear the panel
    pub fn shutdown(&mut self) {
        self.binding.unbind();
        self.inventory = Inventory::empty();
        self.layout = Layout::default();
        self.pending = None;
        info!("Plugin shut down");
    }

    /// Row height measured by the host; triggers a relayout when it changes
    pub fn set_row_height(&mut self, row_height: i32) {
        if row_height != self.row_height {
            self.row_height = row_height;
            self.relayout();
        }
    }

    pub fn config_record(&self) -> ConfigRecord {
        ConfigRecord::new(
            self.binding.kind(),
            self.registry.clone(),
            self.binding.path(),
        )
    }

    pub fn encode_config(&self) -> String {
        self.config_record().encode()
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    pub fn is_loaded(&self) -> bool {
        self.binding.is_loaded()
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    fn rescan(&mut self) {
        self.inventory = Inventory::scan(&self.binding);
        self.relayout();
    }

    fn relayout(&mut self) {
        self.layout = compute_layout(&self.inventory, &self.registry, self.row_height);
    }
}

impl Default for PluginState {
    fn default() -> Self {
        Self::new(ConfigRecord::default())
    }
}
