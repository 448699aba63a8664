//! nvidia-smi backend
//!
//! Every query is one `nvidia-smi --query-gpu=... --format=csv,noheader,nounits`
//! invocation against a single GPU index. nvidia-smi has no per-fan RPM or
//! fan enumeration, so those queries are unresolved.

use tracing::{debug, info};

use crate::command::{parse_f64, parse_u32, run, run_for_bind};
use crate::constants::{BYTES_PER_MB, MILLIWATTS_PER_WATT};
use crate::{
    Backend, BackendKind, BindError, Capabilities, ClockDomain, DeviceHandle, GknError,
    MemoryInfo, Query, Result, Utilization,
};

/// Check that `path` runs and can list GPUs
pub fn probe(path: &str) -> std::result::Result<(), BindError> {
    list_gpus(path).map(|_| ())
}

/// Run `path -L` and return the GPU count. Output that is neither a GPU
/// listing nor nvidia-smi's empty-listing message means `path` is some other
/// program.
fn list_gpus(path: &str) -> std::result::Result<u32, BindError> {
    let listing = run_for_bind(path, &["-L"], None)?;
    check_listing(path, &listing)
}

fn check_listing(path: &str, listing: &str) -> std::result::Result<u32, BindError> {
    let count = parse_gpu_list(listing);
    if count > 0 || listing.contains(NO_DEVICES) {
        Ok(count)
    } else {
        debug!("{} -L printed no GPU listing: {:?}", path, listing.trim());
        Err(BindError::IncompatibleApi {
            path: path.to_string(),
            missing: vec!["GPU listing"],
        })
    }
}

const NO_DEVICES: &str = "No devices were found";

/// Count the `GPU n: ...` lines of `nvidia-smi -L`
fn parse_gpu_list(stdout: &str) -> u32 {
    stdout
        .lines()
        .filter(|line| line.trim_start().starts_with("GPU "))
        .count() as u32
}

/// Split one csv line of `--format=csv,noheader,nounits` output
fn parse_csv_fields(stdout: &str, expected: usize) -> Option<Vec<String>> {
    let line = stdout.lines().find(|l| !l.trim().is_empty())?;
    let fields: Vec<String> = line.split(',').map(|s| s.trim().to_string()).collect();
    if fields.len() < expected {
        debug!("Short nvidia-smi line: {}", line);
        return None;
    }
    Some(fields)
}

pub struct SmiBackend {
    path: String,
    open: bool,
}

impl SmiBackend {
    pub fn open(path: &str) -> std::result::Result<Self, BindError> {
        let count = list_gpus(path)?;
        info!("nvidia-smi at {} lists {} GPU(s)", path, count);
        Ok(Self {
            path: path.to_string(),
            open: true,
        })
    }

    fn query(&self, device: DeviceHandle, fields: &[&str]) -> Result<Vec<String>> {
        if !self.open {
            return Err(GknError::generic("nvidia-smi backend has been shut down"));
        }
        let index = device.raw().to_string();
        let query = format!("--query-gpu={}", fields.join(","));
        let stdout = run(
            &self.path,
            &["-i", &index, &query, "--format=csv,noheader,nounits"],
            None,
        )?;
        parse_csv_fields(&stdout, fields.len())
            .ok_or_else(|| GknError::parse("nvidia-smi", stdout.trim().to_string()))
    }

    fn query_one(&self, device: DeviceHandle, field: &'static str) -> Result<String> {
        let mut fields = self.query(device, &[field])?;
        Ok(fields.swap_remove(0))
    }
}

impl Backend for SmiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Smi
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all_except(&[Query::DeviceFanCount, Query::DeviceFanSpeedRpm])
    }

    fn device_count(&self) -> Result<u32> {
        if !self.open {
            return Err(GknError::generic("nvidia-smi backend has been shut down"));
        }
        Ok(parse_gpu_list(&run(&self.path, &["-L"], None)?))
    }

    fn device_handle(&self, index: u32) -> Result<DeviceHandle> {
        if index >= self.device_count()? {
            return Err(GknError::DeviceNotFound(index));
        }
        Ok(DeviceHandle::from_raw(index as usize))
    }

    fn device_name(&self, device: DeviceHandle) -> Result<String> {
        let name = self.query_one(device, "name")?;
        if crate::command::is_not_available(&name) {
            return Err(GknError::Unsupported(Query::DeviceName.name()));
        }
        Ok(name)
    }

    fn device_pci_bus_id(&self, device: DeviceHandle) -> Result<String> {
        let bus_id = self.query_one(device, "pci.bus_id")?;
        if crate::command::is_not_available(&bus_id) {
            return Err(GknError::Unsupported(Query::DevicePciInfo.name()));
        }
        Ok(bus_id)
    }

    fn device_fan_count(&self, _device: DeviceHandle) -> Result<u32> {
        Err(GknError::Unsupported(Query::DeviceFanCount.name()))
    }

    fn device_clock(&self, device: DeviceHandle, domain: ClockDomain) -> Result<u32> {
        let field = match domain {
            ClockDomain::Graphics => "clocks.gr",
            ClockDomain::Memory => "clocks.mem",
        };
        parse_u32(field, &self.query_one(device, field)?)
    }

    fn device_temperature(&self, device: DeviceHandle) -> Result<u32> {
        parse_u32("temperature.gpu", &self.query_one(device, "temperature.gpu")?)
    }

    fn device_fan_speed(&self, device: DeviceHandle) -> Result<u32> {
        parse_u32("fan.speed", &self.query_one(device, "fan.speed")?)
    }

    fn device_fan_speed_rpm(&self, _device: DeviceHandle, _fan: u32) -> Result<u32> {
        Err(GknError::Unsupported(Query::DeviceFanSpeedRpm.name()))
    }

    fn device_power_usage(&self, device: DeviceHandle) -> Result<u32> {
        let watts = parse_f64("power.draw", &self.query_one(device, "power.draw")?)?;
        Ok((watts * MILLIWATTS_PER_WATT as f64) as u32)
    }

    fn device_utilization(&self, device: DeviceHandle) -> Result<Utilization> {
        let fields = self.query(device, &["utilization.gpu", "utilization.memory"])?;
        Ok(Utilization {
            gpu: parse_u32("utilization.gpu", &fields[0])?,
            memory: parse_u32("utilization.memory", &fields[1])?,
        })
    }

    fn device_memory_info(&self, device: DeviceHandle) -> Result<MemoryInfo> {
        let fields = self.query(device, &["memory.total", "memory.free", "memory.used"])?;
        let mib = |query: &'static str, value: &str| -> Result<u64> {
            Ok(parse_u32(query, value)? as u64 * BYTES_PER_MB)
        };
        Ok(MemoryInfo {
            total: mib("memory.total", &fields[0])?,
            free: mib("memory.free", &fields[1])?,
            used: mib("memory.used", &fields[2])?,
        })
    }

    fn shutdown(&mut self) {
        if self.open {
            self.open = false;
            debug!("Closed nvidia-smi backend at {}", self.path);
        }
    }
}
