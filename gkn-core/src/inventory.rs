//! Device inventory
//!
//! A full rebuild of the GPU slot table, run when a backend is bound. Normal
//! refresh ticks reuse the table; a hot-plugged GPU shows up after the next
//! rebind.

use serde::Serialize;
use tracing::{debug, info};

use gkn_gpu::gpu_const::{MAX_FANS_PER_GPU, MAX_GPUS};
use gkn_gpu::{Backend, Binding, DeviceHandle, Query};

/// One GPU slot from the last inventory pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub index: u32,
    /// Handle, name and identity all resolved in the last pass
    pub good: bool,
    #[serde(skip)]
    pub handle: Option<DeviceHandle>,
    pub name: String,
    pub bus_identity: String,
    pub fan_count: u32,
}

impl Device {
    fn absent(index: u32) -> Self {
        Self {
            index,
            good: false,
            handle: None,
            name: String::new(),
            bus_identity: String::new(),
            fan_count: 0,
        }
    }
}

/// Ordered GPU slots, at most `capacity` of them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Inventory {
    devices: Vec<Device>,
}

impl Inventory {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Rebuild from `binding` with the default capacity
    pub fn scan(binding: &Binding) -> Self {
        Self::scan_with_capacity(binding, MAX_GPUS)
    }

    /// Rebuild from `binding`, ignoring GPUs past `capacity`
    ///
    /// An unloaded binding or a failing device count yields an empty
    /// inventory; zero GPUs is a normal state.
    pub fn scan_with_capacity(binding: &Binding, capacity: usize) -> Self {
        let Some(backend) = binding.backend() else {
            debug!("No backend bound, inventory is empty");
            return Self::empty();
        };

        let reported = match backend.device_count() {
            Ok(count) => count,
            Err(e) => {
                debug!("Device count unavailable: {}", e);
                return Self::empty();
            }
        };

        let count = (reported as usize).min(capacity);
        if count < reported as usize {
            info!("{} GPUs reported, tracking the first {}", reported, count);
        }

        let capabilities = binding.capabilities();
        let with_identity = capabilities.supports(Query::DevicePciInfo);
        let with_fans = capabilities.supports(Query::DeviceFanCount);

        let devices: Vec<Device> = (0..count as u32)
            .map(|index| read_device(backend, index, with_identity, with_fans))
            .collect();

        let inventory = Self { devices };
        info!(
            "Inventory: {} slot(s), {} good",
            inventory.len(),
            inventory.good_count()
        );
        inventory
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn device(&self, index: u32) -> Option<&Device> {
        self.devices.get(index as usize)
    }

    pub fn good_devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(|d| d.good)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn good_count(&self) -> usize {
        self.good_devices().count()
    }
}

fn read_device(backend: &dyn Backend, index: u32, with_identity: bool, with_fans: bool) -> Device {
    let mut device = Device::absent(index);

    let handle = match backend.device_handle(index) {
        Ok(handle) => handle,
        Err(e) => {
            debug!("GPU {}: no handle: {}", index, e);
            return device;
        }
    };

    let name = match backend.device_name(handle) {
        Ok(name) => name,
        Err(e) => {
            debug!("GPU {}: no name: {}", index, e);
            return device;
        }
    };

    // Backends without a PCI query still give each slot a stable identity.
    let bus_identity = if with_identity {
        match backend.device_pci_bus_id(handle) {
            Ok(id) => id,
            Err(e) => {
                debug!("GPU {}: no bus identity: {}", index, e);
                return device;
            }
        }
    } else {
        format!("GPU{}", index)
    };

    let fan_count = if with_fans {
        backend
            .device_fan_count(handle)
            .map(|n| n.min(MAX_FANS_PER_GPU))
            .unwrap_or_else(|e| {
                debug!("GPU {}: fan count unavailable: {}", index, e);
                0
            })
    } else {
        0
    };

    debug!("GPU {}: {} [{}] fans={}", index, name, bus_identity, fan_count);
    device.good = true;
    device.handle = Some(handle);
    device.name = name;
    device.bus_identity = bus_identity;
    device.fan_count = fan_count;
    device
}
