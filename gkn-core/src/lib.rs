//! gknvidia Core Library
//!
//! GPU telemetry for a monitor panel: which GPUs are present, what they read
//! right now, and where each reading goes on the panel.
//!
//! # Module Structure
//!
//! - `inventory` - GPU slot table, rebuilt on every (re)bind
//! - `registry` - metric definitions, enabled flags and display order
//! - `sampler` - one query per enabled metric per refresh, failures isolated
//! - `layout` - row stacking for the current inventory and registry
//! - `display` - value formatting and horizontal placement
//! - `codec` - one-line configuration record
//! - `settings` - the settings file holding that record
//! - `plugin` - [`PluginState`], the façade the host drives
//!
//! # Example
//!
//! ```no_run
//! use gkn_core::{settings, PluginState};
//!
//! let record = settings::load_settings(&settings::config_path());
//! let mut plugin = PluginState::new(record);
//! if let Err(e) = plugin.create() {
//!     eprintln!("no GPUs: {}", e);
//! }
//! for row in plugin.refresh() {
//!     println!("{} {}", row.label, row.value);
//! }
//! ```

pub mod codec;
pub mod constants;
pub mod display;
pub mod inventory;
pub mod layout;
pub mod plugin;
pub mod registry;
pub mod sampler;
pub mod settings;

#[cfg(test)]
pub(crate) mod test_utils;

pub use codec::{decode, decode_or_default, decode_with, encode, ConfigRecord};
pub use display::{format_reading, x_position, Margins, RenderedRow};
pub use inventory::{Device, Inventory};
pub use layout::{compute_layout, DisplayRow, Layout};
pub use plugin::{PendingBackend, PluginState};
pub use registry::{Alignment, MetricDefinition, MetricKind, MetricRegistry};
pub use sampler::{sample_all, Reading, SampleSet};

pub use gkn_error::{BindError, DecodeError, GknError, Result};
pub use gkn_gpu::{precheck_path, validate_path, BackendKind, Binding};
