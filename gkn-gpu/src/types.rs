//! GPU data types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::constants::{DEFAULT_NVIDIA_SETTINGS, DEFAULT_NVIDIA_SMI, DEFAULT_NVML_SONAME};

/// Acquisition strategy used to reach the vendor driver
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendKind {
    /// libnvidia-ml loaded at runtime
    #[default]
    Nvml,
    /// NV-CONTROL attributes read through nvidia-settings
    NvControl,
    /// nvidia-smi invoked once per query
    Smi,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [BackendKind::Nvml, BackendKind::NvControl, BackendKind::Smi];

    /// Tag stored in the configuration record
    pub fn tag(self) -> &'static str {
        match self {
            BackendKind::Nvml => "NVML",
            BackendKind::NvControl => "NVCTRL",
            BackendKind::Smi => "SMI",
        }
    }

    /// Library or executable used when the configuration names none
    pub fn default_path(self) -> &'static str {
        match self {
            BackendKind::Nvml => DEFAULT_NVML_SONAME,
            BackendKind::NvControl => DEFAULT_NVIDIA_SETTINGS,
            BackendKind::Smi => DEFAULT_NVIDIA_SMI,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackendKind::ALL
            .into_iter()
            .find(|k| k.tag() == s)
            .ok_or_else(|| format!("unknown backend tag '{}'", s))
    }
}

/// Opaque reference to a device, valid until the next inventory pass or
/// until the binding that produced it is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(usize);

impl DeviceHandle {
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> usize {
        self.0
    }
}

/// Clock domain for `device_clock`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockDomain {
    Graphics,
    Memory,
}

/// Combined utilization reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Utilization {
    /// Percent of time the GPU was busy
    pub gpu: u32,
    /// Percent of time device memory was being read or written
    pub memory: u32,
}

/// Framebuffer memory reading, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub total: u64,
    pub free: u64,
    pub used: u64,
}

/// The fixed query surface every backend is measured against
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Query {
    Init,
    Shutdown,
    DeviceCount,
    DeviceHandle,
    DeviceName,
    DeviceClock,
    DeviceTemperature,
    DeviceFanSpeed,
    DeviceFanSpeedRpm,
    DevicePowerUsage,
    DeviceUtilization,
    DeviceMemoryInfo,
    DeviceFanCount,
    DevicePciInfo,
}

impl Query {
    pub const ALL: [Query; 14] = [
        Query::Init,
        Query::Shutdown,
        Query::DeviceCount,
        Query::DeviceHandle,
        Query::DeviceName,
        Query::DeviceClock,
        Query::DeviceTemperature,
        Query::DeviceFanSpeed,
        Query::DeviceFanSpeedRpm,
        Query::DevicePowerUsage,
        Query::DeviceUtilization,
        Query::DeviceMemoryInfo,
        Query::DeviceFanCount,
        Query::DevicePciInfo,
    ];

    /// Entry points a backend must provide to be bound at all
    pub const MANDATORY: [Query; 5] = [
        Query::Init,
        Query::Shutdown,
        Query::DeviceCount,
        Query::DeviceHandle,
        Query::DeviceName,
    ];

    pub fn is_mandatory(self) -> bool {
        Query::MANDATORY.contains(&self)
    }

    /// Backend-neutral name, used in query errors and logs
    pub fn name(self) -> &'static str {
        match self {
            Query::Init => "init",
            Query::Shutdown => "shutdown",
            Query::DeviceCount => "device count",
            Query::DeviceHandle => "device handle",
            Query::DeviceName => "device name",
            Query::DeviceClock => "clock",
            Query::DeviceTemperature => "temperature",
            Query::DeviceFanSpeed => "fan speed",
            Query::DeviceFanSpeedRpm => "fan speed rpm",
            Query::DevicePowerUsage => "power usage",
            Query::DeviceUtilization => "utilization",
            Query::DeviceMemoryInfo => "memory info",
            Query::DeviceFanCount => "fan count",
            Query::DevicePciInfo => "pci info",
        }
    }

    /// NVML entry point name, used in bind errors
    pub fn symbol(self) -> &'static str {
        match self {
            Query::Init => "nvmlInit",
            Query::Shutdown => "nvmlShutdown",
            Query::DeviceCount => "nvmlDeviceGetCount",
            Query::DeviceHandle => "nvmlDeviceGetHandleByIndex",
            Query::DeviceName => "nvmlDeviceGetName",
            Query::DeviceClock => "nvmlDeviceGetClockInfo",
            Query::DeviceTemperature => "nvmlDeviceGetTemperature",
            Query::DeviceFanSpeed => "nvmlDeviceGetFanSpeed",
            Query::DeviceFanSpeedRpm => "nvmlDeviceGetFanSpeedRPM",
            Query::DevicePowerUsage => "nvmlDeviceGetPowerUsage",
            Query::DeviceUtilization => "nvmlDeviceGetUtilizationRates",
            Query::DeviceMemoryInfo => "nvmlDeviceGetMemoryInfo",
            Query::DeviceFanCount => "nvmlDeviceGetNumFans",
            Query::DevicePciInfo => "nvmlDeviceGetPciInfo",
        }
    }
}

/// Per-query availability for one binding
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Capabilities {
    resolved: BTreeMap<Query, bool>,
}

impl Capabilities {
    /// Every query marked unresolved
    pub fn none() -> Self {
        Self {
            resolved: Query::ALL.iter().map(|q| (*q, false)).collect(),
        }
    }

    /// Every query marked resolved
    pub fn all() -> Self {
        Self {
            resolved: Query::ALL.iter().map(|q| (*q, true)).collect(),
        }
    }

    /// All queries except `missing`
    pub fn all_except(missing: &[Query]) -> Self {
        let mut caps = Self::all();
        for q in missing {
            caps.set(*q, false);
        }
        caps
    }

    pub fn set(&mut self, query: Query, resolved: bool) {
        self.resolved.insert(query, resolved);
    }

    pub fn supports(&self, query: Query) -> bool {
        self.resolved.get(&query).copied().unwrap_or(false)
    }

    /// Mandatory entry points that did not resolve, by symbol name
    pub fn missing_mandatory(&self) -> Vec<&'static str> {
        Query::MANDATORY
            .iter()
            .filter(|q| !self.supports(**q))
            .map(|q| q.symbol())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Query, bool)> + '_ {
        self.resolved.iter().map(|(q, r)| (*q, *r))
    }
}
