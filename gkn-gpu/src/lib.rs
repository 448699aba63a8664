//! NVIDIA GPU telemetry backends for gknvidia
//!
//! Three ways of reaching the driver, all behind the [`Backend`] trait:
//! - NVML loaded at runtime from a configurable path (via `nvml-wrapper`)
//! - NV-CONTROL attributes read through `nvidia-settings`
//! - `nvidia-smi` invoked once per query
//!
//! A [`Binding`] owns at most one live backend. Callers never see which
//! strategy is behind it; they ask the binding's [`Capabilities`] whether a
//! query is available and then issue it.

pub mod nvml;
pub mod nvctrl;
pub mod smi;

mod binding;
mod command;
mod types;
pub mod constants;

pub use binding::{precheck_path, validate_path, Binding};
pub use types::*;
pub use constants as gpu_const;

pub use gkn_error::{BindError, GknError};

pub type Result<T> = std::result::Result<T, GknError>;

/// Query surface of a vendor backend
///
/// Units are normalized by every implementation: clocks in MHz, temperature
/// in whole degrees Celsius, fan speed in percent, fan RPM in rpm, power in
/// milliwatts, memory in bytes. Optional queries a backend cannot answer
/// return [`GknError::Unsupported`] and are reported as unresolved in
/// [`Backend::capabilities`].
pub trait Backend {
    /// Strategy implemented by this backend
    fn kind(&self) -> BackendKind;

    /// Which queries this backend resolved when it was bound
    fn capabilities(&self) -> Capabilities;

    fn device_count(&self) -> Result<u32>;

    fn device_handle(&self, index: u32) -> Result<DeviceHandle>;

    fn device_name(&self, device: DeviceHandle) -> Result<String>;

    /// PCI bus identity, e.g. "00000000:01:00.0"
    fn device_pci_bus_id(&self, device: DeviceHandle) -> Result<String>;

    fn device_fan_count(&self, device: DeviceHandle) -> Result<u32>;

    fn device_clock(&self, device: DeviceHandle, domain: ClockDomain) -> Result<u32>;

    fn device_temperature(&self, device: DeviceHandle) -> Result<u32>;

    fn device_fan_speed(&self, device: DeviceHandle) -> Result<u32>;

    fn device_fan_speed_rpm(&self, device: DeviceHandle, fan: u32) -> Result<u32>;

    fn device_power_usage(&self, device: DeviceHandle) -> Result<u32>;

    fn device_utilization(&self, device: DeviceHandle) -> Result<Utilization>;

    fn device_memory_info(&self, device: DeviceHandle) -> Result<MemoryInfo>;

    /// Release the driver. Must be safe to call more than once.
    fn shutdown(&mut self);
}

/// Open a backend of the given kind at `path`
pub fn open_backend(kind: BackendKind, path: &str) -> std::result::Result<Box<dyn Backend>, BindError> {
    match kind {
        BackendKind::Nvml => Ok(Box::new(nvml::NvmlBackend::open(path)?)),
        BackendKind::NvControl => Ok(Box::new(nvctrl::NvControlBackend::open(path)?)),
        BackendKind::Smi => Ok(Box::new(smi::SmiBackend::open(path)?)),
    }
}
