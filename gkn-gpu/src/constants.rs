//! GPU-related constants

/// Default NVML shared object looked up through the dynamic loader
pub const DEFAULT_NVML_SONAME: &str = "libnvidia-ml.so";

/// Default NV-CONTROL client
pub const DEFAULT_NVIDIA_SETTINGS: &str = "nvidia-settings";

/// Default management CLI
pub const DEFAULT_NVIDIA_SMI: &str = "nvidia-smi";

/// Number of GPU slots tracked by an inventory pass
pub const MAX_GPUS: usize = 4;

/// Maximum number of fans per GPU (safety cap)
pub const MAX_FANS_PER_GPU: u32 = 4;

/// Bytes per megabyte (for memory conversion)
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Milliwatts per watt (for power conversion)
pub const MILLIWATTS_PER_WATT: u32 = 1000;

/// Values nvidia-smi and nvidia-settings print instead of a reading
pub const NOT_AVAILABLE_MARKERS: &[&str] = &["", "N/A", "[N/A]", "[Not Supported]", "[Unknown Error]"];
