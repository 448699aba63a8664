//! Metric registry
//!
//! The fixed set of metrics, their presentation attributes, and the user's
//! enabled flags and display order. Display order is always a permutation of
//! `0..MetricKind::COUNT`; [`MetricRegistry::reorder`] is the only way to
//! change it after construction.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use gkn_gpu::Query;

/// Telemetry quantity shown per GPU. Declaration order is the natural
/// display order and the bit/symbol index used by the config record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    Name,
    UtilizationGpu,
    UtilizationMemory,
    ClockGraphics,
    ClockMemory,
    Temperature,
    FanSpeedPercent,
    FanSpeedRpm,
    PowerDraw,
    MemoryUsed,
    MemoryTotal,
}

impl MetricKind {
    pub const COUNT: usize = 11;

    pub const ALL: [MetricKind; MetricKind::COUNT] = [
        MetricKind::Name,
        MetricKind::UtilizationGpu,
        MetricKind::UtilizationMemory,
        MetricKind::ClockGraphics,
        MetricKind::ClockMemory,
        MetricKind::Temperature,
        MetricKind::FanSpeedPercent,
        MetricKind::FanSpeedRpm,
        MetricKind::PowerDraw,
        MetricKind::MemoryUsed,
        MetricKind::MemoryTotal,
    ];

    /// Declaration index
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Panel label drawn left of the value
    pub fn label(self) -> &'static str {
        match self {
            MetricKind::Name => "",
            MetricKind::UtilizationGpu => "Load",
            MetricKind::UtilizationMemory => "Mem Load",
            MetricKind::ClockGraphics => "Clock",
            MetricKind::ClockMemory => "Mem Clock",
            MetricKind::Temperature => "Temp",
            MetricKind::FanSpeedPercent => "Fan",
            MetricKind::FanSpeedRpm => "Fan RPM",
            MetricKind::PowerDraw => "Power",
            MetricKind::MemoryUsed => "Used Memory",
            MetricKind::MemoryTotal => "Total Memory",
        }
    }

    /// Label used in the options list
    pub fn option_label(self) -> &'static str {
        match self {
            MetricKind::Name => "GPU Name",
            MetricKind::UtilizationGpu => "GPU Load",
            MetricKind::UtilizationMemory => "GPU Memory Load",
            MetricKind::ClockGraphics => "GPU Clock",
            MetricKind::ClockMemory => "GPU Memory Clock",
            MetricKind::Temperature => "GPU Temperature",
            MetricKind::FanSpeedPercent => "GPU Fan Speed",
            MetricKind::FanSpeedRpm => "GPU Fan Speed (RPM)",
            MetricKind::PowerDraw => "GPU Power Draw",
            MetricKind::MemoryUsed => "GPU Used Memory",
            MetricKind::MemoryTotal => "GPU Total Memory",
        }
    }

    pub fn alignment(self) -> Alignment {
        match self {
            MetricKind::Name => Alignment::Center,
            _ => Alignment::Right,
        }
    }

    /// Backend query that must be resolved for this metric to be sampled
    pub fn required_query(self) -> Query {
        match self {
            MetricKind::Name => Query::DeviceName,
            MetricKind::UtilizationGpu | MetricKind::UtilizationMemory => Query::DeviceUtilization,
            MetricKind::ClockGraphics | MetricKind::ClockMemory => Query::DeviceClock,
            MetricKind::Temperature => Query::DeviceTemperature,
            MetricKind::FanSpeedPercent => Query::DeviceFanSpeed,
            MetricKind::FanSpeedRpm => Query::DeviceFanSpeedRpm,
            MetricKind::PowerDraw => Query::DevicePowerUsage,
            MetricKind::MemoryUsed | MetricKind::MemoryTotal => Query::DeviceMemoryInfo,
        }
    }

    /// Symbol for this metric in the config order string: 'a', 'b', ...
    pub fn order_symbol(self) -> char {
        (b'a' + self.index() as u8) as char
    }

    pub fn from_order_symbol(symbol: char) -> Option<Self> {
        if !symbol.is_ascii_lowercase() {
            return None;
        }
        Self::from_index((symbol as u8 - b'a') as usize)
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.option_label())
    }
}

/// Horizontal placement of a value in its panel row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alignment {
    Left,
    Center,
    Right,
}

/// Presentation record for one metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricDefinition {
    kind: MetricKind,
    enabled: bool,
    display_order: usize,
}

impl MetricDefinition {
    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn display_order(&self) -> usize {
        self.display_order
    }

    pub fn alignment(&self) -> Alignment {
        self.kind.alignment()
    }

    pub fn label(&self) -> &'static str {
        self.kind.label()
    }

    pub fn option_label(&self) -> &'static str {
        self.kind.option_label()
    }
}

/// Enabled flags and display order for every [`MetricKind`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricRegistry {
    definitions: BTreeMap<MetricKind, MetricDefinition>,
}

impl Default for MetricRegistry {
    /// All metrics enabled, in declaration order
    fn default() -> Self {
        Self {
            definitions: MetricKind::ALL
                .iter()
                .map(|kind| {
                    (
                        *kind,
                        MetricDefinition {
                            kind: *kind,
                            enabled: true,
                            display_order: kind.index(),
                        },
                    )
                })
                .collect(),
        }
    }
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an explicit order; `None` unless `order` names every
    /// metric exactly once
    pub fn with_order(order: &[MetricKind]) -> Option<Self> {
        if !is_permutation(order) {
            return None;
        }
        let mut registry = Self::default();
        for (position, kind) in order.iter().enumerate() {
            if let Some(def) = registry.definitions.get_mut(kind) {
                def.display_order = position;
            }
        }
        Some(registry)
    }

    pub fn definition(&self, kind: MetricKind) -> Option<&MetricDefinition> {
        self.definitions.get(&kind)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.definitions.values()
    }

    pub fn is_enabled(&self, kind: MetricKind) -> bool {
        self.definitions.get(&kind).map(|d| d.enabled).unwrap_or(false)
    }

    /// Returns true if the flag changed
    pub fn set_enabled(&mut self, kind: MetricKind, enabled: bool) -> bool {
        match self.definitions.get_mut(&kind) {
            Some(def) if def.enabled != enabled => {
                def.enabled = enabled;
                true
            }
            _ => false,
        }
    }

    /// Swap the display positions of `a` and `b`
    pub fn reorder(&mut self, a: MetricKind, b: MetricKind) {
        if a == b {
            return;
        }
        let (Some(order_a), Some(order_b)) = (
            self.definitions.get(&a).map(|d| d.display_order),
            self.definitions.get(&b).map(|d| d.display_order),
        ) else {
            return;
        };
        if let Some(def) = self.definitions.get_mut(&a) {
            def.display_order = order_b;
        }
        if let Some(def) = self.definitions.get_mut(&b) {
            def.display_order = order_a;
        }
    }

    /// Swap `kind` with its display neighbour above (`up`) or below
    pub fn move_by(&mut self, kind: MetricKind, up: bool) -> bool {
        let order = self.current_order();
        let Some(position) = order.iter().position(|k| *k == kind) else {
            return false;
        };
        let neighbour = if up {
            position.checked_sub(1)
        } else {
            Some(position + 1).filter(|p| *p < order.len())
        };
        match neighbour {
            Some(n) => {
                self.reorder(kind, order[n]);
                true
            }
            None => false,
        }
    }

    /// Every metric sorted by display order
    pub fn current_order(&self) -> Vec<MetricKind> {
        let mut defs: Vec<&MetricDefinition> = self.definitions.values().collect();
        defs.sort_by_key(|d| d.display_order);
        defs.into_iter().map(|d| d.kind).collect()
    }

    /// Enabled metrics sorted by display order
    pub fn enabled_in_order(&self) -> Vec<MetricKind> {
        self.current_order()
            .into_iter()
            .filter(|k| self.is_enabled(*k))
            .collect()
    }

    /// Bit i set when the metric with declaration index i is enabled
    pub fn enabled_mask(&self) -> u16 {
        self.definitions
            .values()
            .filter(|d| d.enabled)
            .fold(0, |mask, d| mask | (1 << d.kind.index()))
    }

    pub fn apply_mask(&mut self, mask: u16) {
        for def in self.definitions.values_mut() {
            def.enabled = mask & (1 << def.kind.index()) != 0;
        }
    }
}

/// True if `order` lists every metric exactly once
pub fn is_permutation(order: &[MetricKind]) -> bool {
    if order.len() != MetricKind::COUNT {
        return false;
    }
    let mut seen = [false; MetricKind::COUNT];
    for kind in order {
        if std::mem::replace(&mut seen[kind.index()], true) {
            return false;
        }
    }
    true
}
