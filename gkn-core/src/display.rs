//! Display Formatting Helpers
//!
//! Turns readings into panel strings and places them horizontally. These
//! are host-agnostic: the terminal host and any other frontend share them.

use std::collections::BTreeMap;

use serde::Serialize;

use gkn_gpu::gpu_const::{BYTES_PER_MB, MILLIWATTS_PER_WATT};

use crate::constants::{NOT_AVAILABLE, TEXT_CAPACITY};
use crate::layout::DisplayRow;
use crate::registry::{Alignment, MetricKind};
use crate::sampler::{Reading, SampleSet};

/// Format a reading with its unit suffix
///
/// Percent "42%", clock "1530MHz", temperature "54.0C", fan "1240RPM",
/// power "87W" (truncated from mW), memory "2048MB" (truncated from bytes).
pub fn format_reading(reading: &Reading) -> String {
    match reading {
        Reading::Text(text) => truncate_text(text),
        Reading::Percent(p) => format!("{}%", p),
        Reading::Megahertz(mhz) => format!("{}MHz", mhz),
        Reading::Celsius(c) => format!("{:.1}C", *c as f32),
        Reading::Rpm(rpm) => format!("{}RPM", rpm),
        Reading::Milliwatts(mw) => format!("{}W", mw / MILLIWATTS_PER_WATT),
        Reading::Bytes(bytes) => format!("{}MB", bytes / BYTES_PER_MB),
    }
}

/// Cut `text` to what fits a panel cell
pub fn truncate_text(text: &str) -> String {
    text.chars().take(TEXT_CAPACITY - 1).collect()
}

/// Panel margins, in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Margins {
    pub left: i32,
    pub right: i32,
}

/// X coordinate for a value of width `text_width` in a panel `panel_width` wide
pub fn x_position(alignment: Alignment, panel_width: i32, margins: Margins, text_width: i32) -> i32 {
    match alignment {
        Alignment::Left => margins.left,
        Alignment::Center => (panel_width - text_width) / 2 - 1,
        Alignment::Right => panel_width - margins.left - margins.right - text_width - 1,
    }
}

/// One panel row ready to draw
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedRow {
    pub device_index: u32,
    pub metric: MetricKind,
    pub y: i32,
    pub label: &'static str,
    pub value: String,
    pub alignment: Alignment,
}

/// Pair each layout row with its label and current value
pub fn render_rows(rows: &[DisplayRow], samples: &BTreeMap<u32, SampleSet>) -> Vec<RenderedRow> {
    rows.iter()
        .map(|row| RenderedRow {
            device_index: row.device_index,
            metric: row.metric,
            y: row.y,
            label: row.metric.label(),
            value: samples
                .get(&row.device_index)
                .map(|s| s.display(row.metric))
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            alignment: row.metric.alignment(),
        })
        .collect()
}
