//! NVIDIA Management Library backend
//!
//! libnvidia-ml is opened at runtime from a user-configurable path through
//! `nvml-wrapper`. Before initializing, the raw symbol table from
//! `nvml-wrapper-sys` is loaded to see which entry points the library has.
//! Only init, shutdown, device count, device by index and device name are
//! required; anything else missing is recorded in the capability set and the
//! matching query answers `Unsupported`.

use std::ffi::OsStr;

use nvml_wrapper::enum_wrappers::device::{Clock, TemperatureSensor};
use nvml_wrapper::error::NvmlError;
use nvml_wrapper::{Device, Nvml};
use nvml_wrapper_sys::bindings::NvmlLib;
use tracing::{debug, info, warn};

use crate::constants::MAX_FANS_PER_GPU;
use crate::{
    Backend, BackendKind, BindError, Capabilities, ClockDomain, DeviceHandle, GknError,
    MemoryInfo, Query, Result, Utilization,
};

fn load_symbols(path: &str) -> std::result::Result<NvmlLib, BindError> {
    if path.trim().is_empty() {
        return Err(BindError::not_found(path, "empty library path"));
    }
    // SAFETY: loading libnvidia-ml runs its initializers; that is the vendor
    // library's contract and an accepted external risk.
    unsafe { NvmlLib::new(path) }.map_err(|e| BindError::not_found(path, e.to_string()))
}

fn symbol_capabilities(lib: &NvmlLib) -> Capabilities {
    let mut caps = Capabilities::none();
    caps.set(Query::Init, lib.nvmlInit_v2.is_ok());
    caps.set(Query::Shutdown, lib.nvmlShutdown.is_ok());
    caps.set(Query::DeviceCount, lib.nvmlDeviceGetCount_v2.is_ok());
    caps.set(Query::DeviceHandle, lib.nvmlDeviceGetHandleByIndex_v2.is_ok());
    caps.set(Query::DeviceName, lib.nvmlDeviceGetName.is_ok());
    caps.set(Query::DeviceClock, lib.nvmlDeviceGetClockInfo.is_ok());
    caps.set(Query::DeviceTemperature, lib.nvmlDeviceGetTemperature.is_ok());
    caps.set(Query::DeviceFanSpeed, lib.nvmlDeviceGetFanSpeed_v2.is_ok());
    caps.set(Query::DevicePowerUsage, lib.nvmlDeviceGetPowerUsage.is_ok());
    caps.set(Query::DeviceUtilization, lib.nvmlDeviceGetUtilizationRates.is_ok());
    caps.set(Query::DeviceMemoryInfo, lib.nvmlDeviceGetMemoryInfo.is_ok());
    caps.set(Query::DeviceFanCount, lib.nvmlDeviceGetNumFans.is_ok());
    caps.set(Query::DevicePciInfo, lib.nvmlDeviceGetPciInfo_v3.is_ok());
    // nvml-wrapper exposes no per-fan RPM reading
    caps.set(Query::DeviceFanSpeedRpm, false);
    caps
}

/// Load `path` and return its capability set if the minimum entry points
/// are all present
fn resolve_capabilities(path: &str) -> std::result::Result<Capabilities, BindError> {
    let caps = symbol_capabilities(&load_symbols(path)?);
    let missing = caps.missing_mandatory();
    if missing.is_empty() {
        Ok(caps)
    } else {
        warn!("{} lacks required NVML entry points: {:?}", path, missing);
        Err(BindError::IncompatibleApi {
            path: path.to_string(),
            missing,
        })
    }
}

/// Open `path` and check the minimum entry points without initializing NVML
pub fn probe(path: &str) -> std::result::Result<(), BindError> {
    resolve_capabilities(path).map(|_| ())
}

fn init_error(path: &str, e: NvmlError) -> BindError {
    match e {
        NvmlError::LibloadingError(e) => BindError::not_found(path, e.to_string()),
        other => BindError::init_failed(path, other.to_string()),
    }
}

fn query_error(query: Query, e: NvmlError) -> GknError {
    match e {
        NvmlError::NotSupported | NvmlError::FunctionNotFound | NvmlError::FailedToLoadSymbol(_) => {
            GknError::Unsupported(query.name())
        }
        other => GknError::Nvml {
            call: query.name(),
            message: other.to_string(),
        },
    }
}

/// A loaded and initialized libnvidia-ml
pub struct NvmlBackend {
    path: String,
    capabilities: Capabilities,
    nvml: Option<Nvml>,
}

impl NvmlBackend {
    pub fn open(path: &str) -> std::result::Result<Self, BindError> {
        let capabilities = resolve_capabilities(path)?;
        let nvml = Nvml::builder()
            .lib_path(OsStr::new(path))
            .init()
            .map_err(|e| init_error(path, e))?;

        info!("NVML initialized from {}", path);
        Ok(Self {
            path: path.to_string(),
            capabilities,
            nvml: Some(nvml),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn nvml(&self) -> Result<&Nvml> {
        self.nvml
            .as_ref()
            .ok_or_else(|| GknError::generic("NVML has been shut down"))
    }

    /// Device handles carry the NVML index; the wrapper's device borrows the
    /// library so it is looked up again for every query.
    fn device(&self, device: DeviceHandle, query: Query) -> Result<Device<'_>> {
        let index = u32::try_from(device.raw())
            .map_err(|_| GknError::generic(format!("device index {} out of range", device.raw())))?;
        self.nvml()?
            .device_by_index(index)
            .map_err(|e| query_error(query, e))
    }
}

impl Backend for NvmlBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Nvml
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn device_count(&self) -> Result<u32> {
        self.nvml()?
            .device_count()
            .map_err(|e| query_error(Query::DeviceCount, e))
    }

    fn device_handle(&self, index: u32) -> Result<DeviceHandle> {
        let handle = DeviceHandle::from_raw(index as usize);
        self.device(handle, Query::DeviceHandle)?;
        Ok(handle)
    }

    fn device_name(&self, device: DeviceHandle) -> Result<String> {
        self.device(device, Query::DeviceName)?
            .name()
            .map_err(|e| query_error(Query::DeviceName, e))
    }

    fn device_pci_bus_id(&self, device: DeviceHandle) -> Result<String> {
        let info = self
            .device(device, Query::DevicePciInfo)?
            .pci_info()
            .map_err(|e| query_error(Query::DevicePciInfo, e))?;
        Ok(info.bus_id)
    }

    fn device_fan_count(&self, device: DeviceHandle) -> Result<u32> {
        let count = self
            .device(device, Query::DeviceFanCount)?
            .num_fans()
            .map_err(|e| query_error(Query::DeviceFanCount, e))?;
        Ok(count.min(MAX_FANS_PER_GPU))
    }

    fn device_clock(&self, device: DeviceHandle, domain: ClockDomain) -> Result<u32> {
        let clock = match domain {
            ClockDomain::Graphics => Clock::Graphics,
            ClockDomain::Memory => Clock::Memory,
        };
        self.device(device, Query::DeviceClock)?
            .clock_info(clock)
            .map_err(|e| query_error(Query::DeviceClock, e))
    }

    fn device_temperature(&self, device: DeviceHandle) -> Result<u32> {
        self.device(device, Query::DeviceTemperature)?
            .temperature(TemperatureSensor::Gpu)
            .map_err(|e| query_error(Query::DeviceTemperature, e))
    }

    fn device_fan_speed(&self, device: DeviceHandle) -> Result<u32> {
        self.device(device, Query::DeviceFanSpeed)?
            .fan_speed(0)
            .map_err(|e| query_error(Query::DeviceFanSpeed, e))
    }

    fn device_fan_speed_rpm(&self, _device: DeviceHandle, _fan: u32) -> Result<u32> {
        self.nvml()?;
        Err(GknError::Unsupported(Query::DeviceFanSpeedRpm.name()))
    }

    fn device_power_usage(&self, device: DeviceHandle) -> Result<u32> {
        self.device(device, Query::DevicePowerUsage)?
            .power_usage()
            .map_err(|e| query_error(Query::DevicePowerUsage, e))
    }

    fn device_utilization(&self, device: DeviceHandle) -> Result<Utilization> {
        let rates = self
            .device(device, Query::DeviceUtilization)?
            .utilization_rates()
            .map_err(|e| query_error(Query::DeviceUtilization, e))?;
        Ok(Utilization {
            gpu: rates.gpu,
            memory: rates.memory,
        })
    }

    fn device_memory_info(&self, device: DeviceHandle) -> Result<MemoryInfo> {
        let memory = self
            .device(device, Query::DeviceMemoryInfo)?
            .memory_info()
            .map_err(|e| query_error(Query::DeviceMemoryInfo, e))?;
        Ok(MemoryInfo {
            total: memory.total,
            free: memory.free,
            used: memory.used,
        })
    }

    fn shutdown(&mut self) {
        let Some(nvml) = self.nvml.take() else {
            return;
        };
        if let Err(e) = nvml.shutdown() {
            warn!("NVML shutdown for {} failed: {}", self.path, e);
        }
        self.capabilities = Capabilities::none();
        debug!("Closed {}", self.path);
    }
}
