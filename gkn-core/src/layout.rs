//! Layout planner
//!
//! Stacks one block of rows per good device. Pure: the same inventory and
//! registry always give the same rows.

use serde::Serialize;

use crate::constants::layout::{DEVICE_GAP, LAST_DEVICE_GAP, NAME_ROW_GAP, ORIGIN_Y, ROW_GAP};
use crate::inventory::Inventory;
use crate::registry::{MetricKind, MetricRegistry};

/// A (device, metric) row at vertical offset `y`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplayRow {
    pub device_index: u32,
    pub metric: MetricKind,
    pub y: i32,
}

/// Planned rows plus the panel height they need
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Layout {
    pub rows: Vec<DisplayRow>,
    pub height: i32,
}

impl Layout {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Plan the panel for `inventory` and `registry` with rows `row_height` tall
///
/// The name row, when enabled, heads each block regardless of its display
/// position; the rest follow in display order.
pub fn compute_layout(inventory: &Inventory, registry: &MetricRegistry, row_height: i32) -> Layout {
    let enabled = registry.enabled_in_order();
    let show_name = enabled.contains(&MetricKind::Name);
    let metrics: Vec<MetricKind> = show_name
        .then_some(MetricKind::Name)
        .into_iter()
        .chain(enabled.into_iter().filter(|k| *k != MetricKind::Name))
        .collect();

    let devices: Vec<u32> = inventory.good_devices().map(|d| d.index).collect();
    let mut rows = Vec::with_capacity(devices.len() * metrics.len());
    let mut y = ORIGIN_Y;

    for (position, device_index) in devices.iter().enumerate() {
        for metric in &metrics {
            rows.push(DisplayRow {
                device_index: *device_index,
                metric: *metric,
                y,
            });
            y += row_height
                + if *metric == MetricKind::Name {
                    NAME_ROW_GAP
                } else {
                    ROW_GAP
                };
        }
        y += if position + 1 == devices.len() {
            LAST_DEVICE_GAP
        } else {
            DEVICE_GAP
        };
    }

    Layout {
        rows,
        height: if devices.is_empty() { 0 } else { y },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{binding_for, mock_backend};
    use gkn_gpu::Capabilities;

    fn inventory(devices: u32) -> Inventory {
        Inventory::scan(&binding_for(mock_backend(devices, Capabilities::all())))
    }

    fn only(kinds: &[MetricKind]) -> MetricRegistry {
        let mut registry = MetricRegistry::default();
        for kind in MetricKind::ALL {
            registry.set_enabled(kind, kinds.contains(&kind));
        }
        registry
    }

    #[test]
    fn test_two_devices_two_metrics() {
        let inventory = inventory(2);
        let mut registry = only(&[MetricKind::Temperature, MetricKind::ClockGraphics]);
        let layout = compute_layout(&inventory, &registry, 10);

        let summary: Vec<(u32, MetricKind, i32)> =
            layout.rows.iter().map(|r| (r.device_index, r.metric, r.y)).collect();
        assert_eq!(
            summary,
            vec![
                (0, MetricKind::ClockGraphics, -1),
                (0, MetricKind::Temperature, 10),
                (1, MetricKind::ClockGraphics, 31),
                (1, MetricKind::Temperature, 42),
            ]
        );
        assert_eq!(layout.height, 54);

        registry.set_enabled(MetricKind::Name, true);
        let layout = compute_layout(&inventory, &registry, 10);
        assert_eq!(layout.rows.len(), 6);
        assert_eq!(layout.rows[0].metric, MetricKind::Name);
        assert_eq!(layout.rows[1].y, -1 + 10 + 5);
        assert_eq!(layout.rows[3].metric, MetricKind::Name);
    }

    #[test]
    fn test_name_row_anchors_block_after_reorder() {
        let inventory = inventory(1);
        let mut registry = MetricRegistry::default();
        registry.reorder(MetricKind::Name, MetricKind::MemoryTotal);
        let layout = compute_layout(&inventory, &registry, 12);
        assert_eq!(layout.rows[0].metric, MetricKind::Name);
        assert_eq!(layout.rows.last().unwrap().metric, MetricKind::MemoryUsed);
        assert_eq!(layout.rows[1].metric, MetricKind::MemoryTotal);
    }

    #[test]
    fn test_follows_display_order() {
        let inventory = inventory(1);
        let mut registry = only(&[MetricKind::PowerDraw, MetricKind::UtilizationGpu]);
        registry.reorder(MetricKind::PowerDraw, MetricKind::UtilizationGpu);
        let layout = compute_layout(&inventory, &registry, 8);
        let metrics: Vec<MetricKind> = layout.rows.iter().map(|r| r.metric).collect();
        assert_eq!(metrics, vec![MetricKind::PowerDraw, MetricKind::UtilizationGpu]);
    }

    #[test]
    fn test_deterministic() {
        let inventory = inventory(3);
        let registry = MetricRegistry::default();
        assert_eq!(
            compute_layout(&inventory, &registry, 11),
            compute_layout(&inventory, &registry, 11)
        );
    }

    #[test]
    fn test_empty_inventory_has_no_rows() {
        let layout = compute_layout(&Inventory::empty(), &MetricRegistry::default(), 10);
        assert!(layout.is_empty());
        assert_eq!(layout.height, 0);
    }
}
