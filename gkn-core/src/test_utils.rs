//! Test utilities
//!
//! A mockall double of [`Backend`] plus builders for the common setups.

use mockall::mock;

use gkn_error::Result;
use gkn_gpu::{
    Backend, BackendKind, Binding, Capabilities, ClockDomain, DeviceHandle, MemoryInfo,
    Utilization,
};

mock! {
    pub Gpu {}

    impl Backend for Gpu {
        fn kind(&self) -> BackendKind;
        fn capabilities(&self) -> Capabilities;
        fn device_count(&self) -> Result<u32>;
        fn device_handle(&self, index: u32) -> Result<DeviceHandle>;
        fn device_name(&self, device: DeviceHandle) -> Result<String>;
        fn device_pci_bus_id(&self, device: DeviceHandle) -> Result<String>;
        fn device_fan_count(&self, device: DeviceHandle) -> Result<u32>;
        fn device_clock(&self, device: DeviceHandle, domain: ClockDomain) -> Result<u32>;
        fn device_temperature(&self, device: DeviceHandle) -> Result<u32>;
        fn device_fan_speed(&self, device: DeviceHandle) -> Result<u32>;
        fn device_fan_speed_rpm(&self, device: DeviceHandle, fan: u32) -> Result<u32>;
        fn device_power_usage(&self, device: DeviceHandle) -> Result<u32>;
        fn device_utilization(&self, device: DeviceHandle) -> Result<Utilization>;
        fn device_memory_info(&self, device: DeviceHandle) -> Result<MemoryInfo>;
        fn shutdown(&mut self);
    }
}

/// A backend reporting `devices` GPUs with two fans each. Only the binding
/// and inventory queries are expected; tests add metric expectations.
pub fn mock_backend(devices: u32, capabilities: Capabilities) -> MockGpu {
    let mut mock = MockGpu::new();
    mock.expect_kind().return_const(BackendKind::Nvml);
    mock.expect_capabilities()
        .returning(move || capabilities.clone());
    mock.expect_shutdown().return_const(());
    mock.expect_device_count().returning(move || Ok(devices));
    mock.expect_device_handle()
        .returning(|index| Ok(DeviceHandle::from_raw(index as usize)));
    mock.expect_device_name()
        .returning(|device| Ok(format!("Mock GPU {}", device.raw())));
    mock.expect_device_pci_bus_id()
        .returning(|device| Ok(format!("00000000:{:02X}:00.0", device.raw() + 1)));
    mock.expect_device_fan_count().returning(|_| Ok(2));
    mock
}

/// Expect every metric query any number of times, with fixed readings
pub fn expect_healthy_metrics(mock: &mut MockGpu) {
    mock.expect_device_clock().returning(|_, domain| {
        Ok(match domain {
            ClockDomain::Graphics => 1530,
            ClockDomain::Memory => 7000,
        })
    });
    mock.expect_device_temperature().returning(|_| Ok(54));
    mock.expect_device_fan_speed().returning(|_| Ok(35));
    mock.expect_device_fan_speed_rpm().returning(|_, _| Ok(1240));
    mock.expect_device_power_usage().returning(|_| Ok(87_512));
    mock.expect_device_utilization()
        .returning(|_| Ok(Utilization { gpu: 42, memory: 17 }));
    mock.expect_device_memory_info().returning(|_| {
        Ok(MemoryInfo {
            total: 8192 * 1024 * 1024,
            free: 6144 * 1024 * 1024,
            used: 2048 * 1024 * 1024,
        })
    });
}

pub fn binding_for(mock: MockGpu) -> Binding {
    Binding::from_backend("mock", Box::new(mock))
}
