//! Metric sampler
//!
//! One pass per refresh tick. Each enabled metric on each good device costs
//! exactly one backend query; disabled metrics cost none. Any failure is
//! confined to the metric it happened on.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, trace};

use gkn_error::Result;
use gkn_gpu::{Backend, Binding, ClockDomain, DeviceHandle};

use crate::constants::NOT_AVAILABLE;
use crate::display::format_reading;
use crate::inventory::{Device, Inventory};
use crate::registry::{MetricKind, MetricRegistry};

/// A normalized backend reading
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Reading {
    Text(String),
    Percent(u32),
    Megahertz(u32),
    Celsius(u32),
    Rpm(u32),
    Milliwatts(u32),
    Bytes(u64),
}

/// Readings for one device from one pass; `None` is "unavailable"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SampleSet {
    values: BTreeMap<MetricKind, Option<Reading>>,
}

impl SampleSet {
    /// Every metric unavailable
    pub fn unavailable() -> Self {
        Self {
            values: MetricKind::ALL.iter().map(|k| (*k, None)).collect(),
        }
    }

    pub fn get(&self, kind: MetricKind) -> Option<&Reading> {
        self.values.get(&kind).and_then(|v| v.as_ref())
    }

    pub fn is_available(&self, kind: MetricKind) -> bool {
        self.get(kind).is_some()
    }

    /// Display string, or the sentinel
    pub fn display(&self, kind: MetricKind) -> String {
        self.get(kind)
            .map(format_reading)
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    }

    fn set(&mut self, kind: MetricKind, reading: Option<Reading>) {
        self.values.insert(kind, reading);
    }
}

/// Sample every device in `inventory`, keyed by device index
///
/// Slots that are not good, and every slot when nothing is bound, come back
/// all-unavailable.
pub fn sample_all(
    binding: &Binding,
    inventory: &Inventory,
    registry: &MetricRegistry,
) -> BTreeMap<u32, SampleSet> {
    inventory
        .devices()
        .iter()
        .map(|device| {
            let samples = match (binding.backend(), device.handle) {
                (Some(backend), Some(handle)) if device.good => {
                    sample_device(backend, binding, device, handle, registry)
                }
                _ => SampleSet::unavailable(),
            };
            (device.index, samples)
        })
        .collect()
}

fn sample_device(
    backend: &dyn Backend,
    binding: &Binding,
    device: &Device,
    handle: DeviceHandle,
    registry: &MetricRegistry,
) -> SampleSet {
    let capabilities = binding.capabilities();
    let mut samples = SampleSet::unavailable();

    for kind in MetricKind::ALL {
        if !registry.is_enabled(kind) {
            continue;
        }
        if !capabilities.supports(kind.required_query()) {
            trace!("GPU {}: {:?} not resolved by backend", device.index, kind);
            continue;
        }
        if kind == MetricKind::FanSpeedRpm && device.fan_count == 0 {
            continue;
        }

        match sample_metric(backend, handle, kind) {
            Ok(reading) => samples.set(kind, Some(reading)),
            Err(e) => debug!("GPU {}: {:?} unavailable: {}", device.index, kind, e),
        }
    }

    samples
}

/// Issue the single query backing `kind`
fn sample_metric(backend: &dyn Backend, handle: DeviceHandle, kind: MetricKind) -> Result<Reading> {
    Ok(match kind {
        MetricKind::Name => Reading::Text(backend.device_name(handle)?),
        MetricKind::UtilizationGpu => Reading::Percent(backend.device_utilization(handle)?.gpu),
        MetricKind::UtilizationMemory => Reading::Percent(backend.device_utilization(handle)?.memory),
        MetricKind::ClockGraphics => Reading::Megahertz(backend.device_clock(handle, ClockDomain::Graphics)?),
        MetricKind::ClockMemory => Reading::Megahertz(backend.device_clock(handle, ClockDomain::Memory)?),
        MetricKind::Temperature => Reading::Celsius(backend.device_temperature(handle)?),
        MetricKind::FanSpeedPercent => Reading::Percent(backend.device_fan_speed(handle)?.min(100)),
        MetricKind::FanSpeedRpm => Reading::Rpm(backend.device_fan_speed_rpm(handle, 0)?),
        MetricKind::PowerDraw => Reading::Milliwatts(backend.device_power_usage(handle)?),
        MetricKind::MemoryUsed => Reading::Bytes(backend.device_memory_info(handle)?.used),
        MetricKind::MemoryTotal => Reading::Bytes(backend.device_memory_info(handle)?.total),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{binding_for, expect_healthy_metrics, mock_backend, MockGpu};
    use gkn_error::GknError;
    use gkn_gpu::{BackendKind, Capabilities, MemoryInfo, Query, Utilization};

    fn only(kinds: &[MetricKind]) -> MetricRegistry {
        let mut registry = MetricRegistry::default();
        for kind in MetricKind::ALL {
            registry.set_enabled(kind, kinds.contains(&kind));
        }
        registry
    }

    #[test]
    fn test_all_metrics_formatted() {
        let mut mock = mock_backend(1, Capabilities::all());
        expect_healthy_metrics(&mut mock);
        let binding = binding_for(mock);
        let inventory = Inventory::scan(&binding);

        let samples = sample_all(&binding, &inventory, &MetricRegistry::default());
        let gpu = &samples[&0];
        assert_eq!(gpu.display(MetricKind::Name), "Mock GPU 0");
        assert_eq!(gpu.display(MetricKind::UtilizationGpu), "42%");
        assert_eq!(gpu.display(MetricKind::UtilizationMemory), "17%");
        assert_eq!(gpu.display(MetricKind::ClockGraphics), "1530MHz");
        assert_eq!(gpu.display(MetricKind::ClockMemory), "7000MHz");
        assert_eq!(gpu.display(MetricKind::Temperature), "54.0C");
        assert_eq!(gpu.display(MetricKind::FanSpeedPercent), "35%");
        assert_eq!(gpu.display(MetricKind::FanSpeedRpm), "1240RPM");
        assert_eq!(gpu.display(MetricKind::PowerDraw), "87W");
        assert_eq!(gpu.display(MetricKind::MemoryUsed), "2048MB");
        assert_eq!(gpu.display(MetricKind::MemoryTotal), "8192MB");
    }

    #[test]
    fn test_disabled_metrics_are_never_queried() {
        for disabled in MetricKind::ALL {
            let mut mock = MockGpu::new();
            mock.expect_kind().return_const(BackendKind::Nvml);
            mock.expect_capabilities().returning(Capabilities::all);
            mock.expect_shutdown().return_const(());
            mock.expect_device_count().returning(|| Ok(2));
            mock.expect_device_handle()
                .returning(|i| Ok(DeviceHandle::from_raw(i as usize)));
            mock.expect_device_pci_bus_id()
                .returning(|_| Ok("00000000:01:00.0".to_string()));
            mock.expect_device_fan_count().returning(|_| Ok(1));
            // Two devices, one query per enabled metric per device.
            let calls = |kinds: &[MetricKind]| 2 * kinds.iter().filter(|k| **k != disabled).count();
            // Inventory asks for each name once on top of the sampler.
            mock.expect_device_name()
                .times(2 + calls(&[MetricKind::Name]))
                .returning(|_| Ok("GPU".to_string()));
            mock.expect_device_utilization()
                .times(calls(&[MetricKind::UtilizationGpu, MetricKind::UtilizationMemory]))
                .returning(|_| Ok(Utilization { gpu: 1, memory: 1 }));
            mock.expect_device_clock()
                .times(calls(&[MetricKind::ClockGraphics, MetricKind::ClockMemory]))
                .returning(|_, _| Ok(1000));
            mock.expect_device_temperature()
                .times(calls(&[MetricKind::Temperature]))
                .returning(|_| Ok(50));
            mock.expect_device_fan_speed()
                .times(calls(&[MetricKind::FanSpeedPercent]))
                .returning(|_| Ok(40));
            mock.expect_device_fan_speed_rpm()
                .times(calls(&[MetricKind::FanSpeedRpm]))
                .returning(|_, _| Ok(1500));
            mock.expect_device_power_usage()
                .times(calls(&[MetricKind::PowerDraw]))
                .returning(|_| Ok(100_000));
            mock.expect_device_memory_info()
                .times(calls(&[MetricKind::MemoryUsed, MetricKind::MemoryTotal]))
                .returning(|_| Ok(MemoryInfo::default()));

            let binding = binding_for(mock);
            let inventory = Inventory::scan(&binding);
            let mut registry = MetricRegistry::default();
            registry.set_enabled(disabled, false);

            let samples = sample_all(&binding, &inventory, &registry);
            for set in samples.values() {
                assert!(!set.is_available(disabled));
                assert_eq!(set.display(disabled), NOT_AVAILABLE);
            }
        }
    }

    #[test]
    fn test_disabled_metrics_issue_zero_calls() {
        let mut mock = mock_backend(2, Capabilities::all());
        mock.expect_device_temperature().times(2).returning(|_| Ok(61));
        mock.expect_device_clock()
            .times(2)
            .withf(|_, domain| *domain == ClockDomain::Graphics)
            .returning(|_, _| Ok(1800));
        mock.expect_device_fan_speed().never();
        mock.expect_device_fan_speed_rpm().never();
        mock.expect_device_power_usage().never();
        mock.expect_device_utilization().never();
        mock.expect_device_memory_info().never();

        let binding = binding_for(mock);
        let inventory = Inventory::scan(&binding);
        let registry = only(&[MetricKind::Temperature, MetricKind::ClockGraphics]);

        let samples = sample_all(&binding, &inventory, &registry);
        assert_eq!(samples.len(), 2);
        for set in samples.values() {
            assert_eq!(set.display(MetricKind::Temperature), "61.0C");
            assert_eq!(set.display(MetricKind::ClockGraphics), "1800MHz");
            assert_eq!(set.display(MetricKind::PowerDraw), NOT_AVAILABLE);
        }
    }

    #[test]
    fn test_single_failing_query_is_isolated() {
        let mut mock = mock_backend(1, Capabilities::all());
        mock.expect_device_power_usage()
            .returning(|_| Err(GknError::Nvml {
                call: "power usage",
                message: "GPU is lost".to_string(),
            }));
        mock.expect_device_clock().returning(|_, _| Ok(1500));
        mock.expect_device_temperature().returning(|_| Ok(40));
        mock.expect_device_fan_speed().returning(|_| Ok(30));
        mock.expect_device_fan_speed_rpm().returning(|_, _| Ok(1100));
        mock.expect_device_utilization()
            .returning(|_| Ok(Utilization { gpu: 5, memory: 2 }));
        mock.expect_device_memory_info().returning(|_| {
            Ok(MemoryInfo {
                total: 4096 << 20,
                free: 3072 << 20,
                used: 1024 << 20,
            })
        });

        let binding = binding_for(mock);
        let inventory = Inventory::scan(&binding);
        let samples = sample_all(&binding, &inventory, &MetricRegistry::default());
        let gpu = &samples[&0];

        assert_eq!(gpu.display(MetricKind::PowerDraw), NOT_AVAILABLE);
        for kind in MetricKind::ALL.into_iter().filter(|k| *k != MetricKind::PowerDraw) {
            assert!(gpu.is_available(kind), "{:?} should be available", kind);
        }
    }

    #[test]
    fn test_unresolved_query_is_not_issued() {
        let mut mock = mock_backend(1, Capabilities::all_except(&[Query::DevicePowerUsage]));
        mock.expect_device_power_usage().never();
        mock.expect_device_clock().returning(|_, _| Ok(1));
        mock.expect_device_temperature().returning(|_| Ok(1));
        mock.expect_device_fan_speed().returning(|_| Ok(1));
        mock.expect_device_fan_speed_rpm().returning(|_, _| Ok(1));
        mock.expect_device_utilization()
            .returning(|_| Ok(Utilization::default()));
        mock.expect_device_memory_info()
            .returning(|_| Ok(MemoryInfo::default()));

        let binding = binding_for(mock);
        let inventory = Inventory::scan(&binding);
        let samples = sample_all(&binding, &inventory, &MetricRegistry::default());
        assert!(!samples[&0].is_available(MetricKind::PowerDraw));
        assert!(samples[&0].is_available(MetricKind::Temperature));
    }

    #[test]
    fn test_fan_rpm_skipped_without_fans() {
        let mut mock = MockGpu::new();
        mock.expect_kind().return_const(BackendKind::Nvml);
        mock.expect_capabilities().returning(Capabilities::all);
        mock.expect_shutdown().return_const(());
        mock.expect_device_count().returning(|| Ok(1));
        mock.expect_device_handle()
            .returning(|i| Ok(DeviceHandle::from_raw(i as usize)));
        mock.expect_device_name().returning(|_| Ok("GPU".to_string()));
        mock.expect_device_pci_bus_id()
            .returning(|_| Ok("00000000:01:00.0".to_string()));
        mock.expect_device_fan_count().returning(|_| Ok(0));
        mock.expect_device_fan_speed_rpm().never();

        let binding = binding_for(mock);
        let inventory = Inventory::scan(&binding);
        let samples = sample_all(&binding, &inventory, &only(&[MetricKind::FanSpeedRpm]));
        assert_eq!(samples[&0].display(MetricKind::FanSpeedRpm), NOT_AVAILABLE);
    }

    #[test]
    fn test_bad_devices_and_unbound_binding_are_unavailable() {
        let binding = Binding::unbound(BackendKind::Nvml, "libnvidia-ml.so");
        assert!(sample_all(&binding, &Inventory::empty(), &MetricRegistry::default()).is_empty());

        let mut mock = mock_backend(2, Capabilities::all());
        expect_healthy_metrics(&mut mock);
        let mut binding = binding_for(mock);
        let inventory = Inventory::scan(&binding);
        binding.unbind();

        let samples = sample_all(&binding, &inventory, &MetricRegistry::default());
        assert_eq!(samples.len(), 2);
        assert!(samples.values().all(|s| *s == SampleSet::unavailable()));
    }

    #[test]
    fn test_fan_percent_clamped() {
        let mut mock = mock_backend(1, Capabilities::all());
        mock.expect_device_fan_speed().returning(|_| Ok(130));
        let binding = binding_for(mock);
        let inventory = Inventory::scan(&binding);
        let samples = sample_all(&binding, &inventory, &only(&[MetricKind::FanSpeedPercent]));
        assert_eq!(samples[&0].display(MetricKind::FanSpeedPercent), "100%");
    }
}
