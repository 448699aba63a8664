//! NV-CONTROL backend
//!
//! Attributes are read from the X server through `nvidia-settings -t -q`.
//! The GPU and fan listings are taken once when the backend is opened;
//! readings are fresh on every query. NV-CONTROL does not expose power draw.

use tracing::{debug, info, warn};

use crate::command::{is_not_available, parse_u32, run, run_for_bind};
use crate::constants::{BYTES_PER_MB, MAX_FANS_PER_GPU};
use crate::{
    Backend, BackendKind, BindError, Capabilities, ClockDomain, DeviceHandle, GknError,
    MemoryInfo, Query, Result, Utilization,
};

/// X display nvidia-settings connects to
fn display() -> String {
    std::env::var("DISPLAY").unwrap_or_else(|_| ":0".to_string())
}

/// Check that `path` runs and reaches an X server with NV-CONTROL
pub fn probe(path: &str) -> std::result::Result<(), BindError> {
    let listing = run_for_bind(path, &["-q", "gpus"], Some(&display()))?;
    if parse_target_list(&listing, "gpu").is_empty() {
        return Err(BindError::init_failed(path, "no NV-CONTROL GPU targets"));
    }
    Ok(())
}

/// One `[n] host:0[kind:n] (Name)` entry of a target listing
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    id: u32,
    name: String,
}

/// Parse `nvidia-settings -q gpus` / `-q fans` output
fn parse_target_list(stdout: &str, kind: &str) -> Vec<Target> {
    let marker = format!("[{}:", kind);
    stdout
        .lines()
        .filter_map(|line| {
            let start = line.find(&marker)? + marker.len();
            let rest = &line[start..];
            let id = rest[..rest.find(']')?].trim().parse().ok()?;
            let name = match (line.find('('), line.rfind(')')) {
                (Some(open), Some(close)) if close > open => line[open + 1..close].trim().to_string(),
                _ => String::new(),
            };
            Some(Target { id, name })
        })
        .collect()
}

/// Distribute fan targets over GPUs in listing order
///
/// NV-CONTROL lists fans without their owning GPU. With one GPU every fan is
/// its own; otherwise fans are split evenly, remainder to the lowest GPUs.
fn assign_fans(gpu_count: usize, fans: &[Target]) -> Vec<Vec<u32>> {
    let mut assigned = vec![Vec::new(); gpu_count];
    if gpu_count == 0 {
        return assigned;
    }
    let per_gpu = fans.len() / gpu_count;
    let remainder = fans.len() % gpu_count;
    let mut ids = fans.iter().map(|f| f.id);
    for (i, slot) in assigned.iter_mut().enumerate() {
        let take = per_gpu + usize::from(i < remainder);
        slot.extend(ids.by_ref().take(take));
    }
    assigned
}

/// `GPUCurrentClockFreqs` is "graphics,memory"
fn parse_clock_pair(value: &str) -> Result<(u32, u32)> {
    let (gr, mem) = value
        .trim()
        .split_once(',')
        .ok_or_else(|| GknError::parse("GPUCurrentClockFreqs", value.trim()))?;
    Ok((
        parse_u32("GPUCurrentClockFreqs", gr)?,
        parse_u32("GPUCurrentClockFreqs", mem)?,
    ))
}

/// `GPUUtilization` is "graphics=5, memory=3, video=0, PCIe=0"
fn parse_utilization(value: &str) -> Result<Utilization> {
    let field = |key: &str| -> Result<u32> {
        value
            .split(',')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == key)
            .ok_or_else(|| GknError::parse("GPUUtilization", value.trim()))
            .and_then(|(_, v)| parse_u32("GPUUtilization", v))
    };
    Ok(Utilization {
        gpu: field("graphics")?,
        memory: field("memory")?,
    })
}

#[derive(Debug, Clone)]
struct NvGpu {
    id: u32,
    name: String,
    fans: Vec<u32>,
}

pub struct NvControlBackend {
    path: String,
    display: String,
    gpus: Vec<NvGpu>,
    open: bool,
}

impl NvControlBackend {
    pub fn open(path: &str) -> std::result::Result<Self, BindError> {
        let x_display = display();
        let gpu_listing = run_for_bind(path, &["-q", "gpus"], Some(&x_display))?;
        let gpu_targets = parse_target_list(&gpu_listing, "gpu");
        if gpu_targets.is_empty() {
            return Err(BindError::init_failed(path, "no NV-CONTROL GPU targets"));
        }

        let fan_targets = match run(path, &["-q", "fans"], Some(&x_display)) {
            Ok(listing) => parse_target_list(&listing, "fan"),
            Err(e) => {
                warn!("nvidia-settings fan listing failed: {}", e);
                Vec::new()
            }
        };

        let gpus = gpu_targets
            .iter()
            .zip(assign_fans(gpu_targets.len(), &fan_targets))
            .map(|(target, fans)| NvGpu {
                id: target.id,
                name: target.name.clone(),
                fans,
            })
            .collect::<Vec<_>>();

        info!(
            "NV-CONTROL on {} via {}: {} GPU(s), {} fan(s)",
            x_display,
            path,
            gpus.len(),
            fan_targets.len()
        );
        Ok(Self {
            path: path.to_string(),
            display: x_display,
            gpus,
            open: true,
        })
    }

    fn gpu(&self, device: DeviceHandle) -> Result<&NvGpu> {
        if !self.open {
            return Err(GknError::generic("NV-CONTROL backend has been shut down"));
        }
        self.gpus
            .get(device.raw())
            .ok_or(GknError::DeviceNotFound(device.raw() as u32))
    }

    /// Terse attribute read, e.g. `[gpu:0]/GPUCoreTemp`
    fn attribute(&self, target: &str, attribute: &'static str) -> Result<String> {
        let query = format!("{}/{}", target, attribute);
        let value = run(&self.path, &["-t", "-q", &query], Some(&self.display))?;
        let value = value.trim().to_string();
        if is_not_available(&value) {
            return Err(GknError::Unsupported(attribute));
        }
        Ok(value)
    }

    fn gpu_attribute(&self, device: DeviceHandle, attribute: &'static str) -> Result<String> {
        let target = format!("[gpu:{}]", self.gpu(device)?.id);
        self.attribute(&target, attribute)
    }

    fn first_fan(&self, device: DeviceHandle) -> Result<u32> {
        self.gpu(device)?
            .fans
            .first()
            .copied()
            .ok_or(GknError::Unsupported("fan"))
    }
}

impl Backend for NvControlBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::NvControl
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all_except(&[Query::DevicePowerUsage])
    }

    fn device_count(&self) -> Result<u32> {
        if !self.open {
            return Err(GknError::generic("NV-CONTROL backend has been shut down"));
        }
        Ok(self.gpus.len() as u32)
    }

    fn device_handle(&self, index: u32) -> Result<DeviceHandle> {
        let device = DeviceHandle::from_raw(index as usize);
        self.gpu(device)?;
        Ok(device)
    }

    fn device_name(&self, device: DeviceHandle) -> Result<String> {
        let gpu = self.gpu(device)?;
        if gpu.name.is_empty() {
            return Err(GknError::Unsupported("gpus"));
        }
        Ok(gpu.name.clone())
    }

    fn device_pci_bus_id(&self, device: DeviceHandle) -> Result<String> {
        let domain = parse_u32("PCIDomain", &self.gpu_attribute(device, "PCIDomain")?)?;
        let bus = parse_u32("PCIBus", &self.gpu_attribute(device, "PCIBus")?)?;
        let dev = parse_u32("PCIDevice", &self.gpu_attribute(device, "PCIDevice")?)?;
        let func = parse_u32("PCIFunc", &self.gpu_attribute(device, "PCIFunc")?)?;
        Ok(format!("{:08X}:{:02X}:{:02X}.{:X}", domain, bus, dev, func))
    }

    fn device_fan_count(&self, device: DeviceHandle) -> Result<u32> {
        Ok((self.gpu(device)?.fans.len() as u32).min(MAX_FANS_PER_GPU))
    }

    fn device_clock(&self, device: DeviceHandle, domain: ClockDomain) -> Result<u32> {
        let (graphics, memory) =
            parse_clock_pair(&self.gpu_attribute(device, "GPUCurrentClockFreqs")?)?;
        Ok(match domain {
            ClockDomain::Graphics => graphics,
            ClockDomain::Memory => memory,
        })
    }

    fn device_temperature(&self, device: DeviceHandle) -> Result<u32> {
        parse_u32("GPUCoreTemp", &self.gpu_attribute(device, "GPUCoreTemp")?)
    }

    fn device_fan_speed(&self, device: DeviceHandle) -> Result<u32> {
        let fan = self.first_fan(device)?;
        let value = self.attribute(&format!("[fan:{}]", fan), "GPUCurrentFanSpeed")?;
        parse_u32("GPUCurrentFanSpeed", &value)
    }

    fn device_fan_speed_rpm(&self, device: DeviceHandle, fan: u32) -> Result<u32> {
        let target = self
            .gpu(device)?
            .fans
            .get(fan as usize)
            .copied()
            .ok_or(GknError::Unsupported("fan"))?;
        let value = self.attribute(&format!("[fan:{}]", target), "GPUCurrentFanSpeedRPM")?;
        parse_u32("GPUCurrentFanSpeedRPM", &value)
    }

    fn device_power_usage(&self, _device: DeviceHandle) -> Result<u32> {
        Err(GknError::Unsupported(Query::DevicePowerUsage.name()))
    }

    fn device_utilization(&self, device: DeviceHandle) -> Result<Utilization> {
        parse_utilization(&self.gpu_attribute(device, "GPUUtilization")?)
    }

    fn device_memory_info(&self, device: DeviceHandle) -> Result<MemoryInfo> {
        let used = parse_u32("UsedDedicatedGPUMemory", &self.gpu_attribute(device, "UsedDedicatedGPUMemory")?)?;
        let total = parse_u32("TotalDedicatedGPUMemory", &self.gpu_attribute(device, "TotalDedicatedGPUMemory")?)?;
        let used = used as u64 * BYTES_PER_MB;
        let total = total as u64 * BYTES_PER_MB;
        Ok(MemoryInfo {
            total,
            free: total.saturating_sub(used),
            used,
        })
    }

    fn shutdown(&mut self) {
        if self.open {
            self.open = false;
            self.gpus.clear();
            debug!("Closed NV-CONTROL backend at {}", self.path);
        }
    }
}
