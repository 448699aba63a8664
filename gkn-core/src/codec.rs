//! Configuration record codec
//!
//! Current form, four whitespace-separated fields:
//!
//! ```text
//! NVML 7ff abcdefghijk libnvidia-ml.so
//! ```
//!
//! backend tag, enabled mask in hex (bit i = metric i), display order as one
//! symbol per position (`a` = first declared metric), backend path.
//!
//! The ten-field boolean form written by older releases is still read:
//!
//! ```text
//! NVML <clock> <temp> <fan> <power> <load> <memload> <usedmem> <totalmem> <path>
//! ```

use serde::Serialize;
use tracing::warn;

use gkn_error::DecodeError;
use gkn_gpu::{validate_path, BackendKind};

use crate::registry::{is_permutation, MetricKind, MetricRegistry};

const CURRENT_FIELDS: usize = 4;
const LEGACY_FIELDS: usize = 10;

/// Metrics named by the legacy flags, in field order
const LEGACY_FLAGS: [MetricKind; 8] = [
    MetricKind::ClockGraphics,
    MetricKind::Temperature,
    MetricKind::FanSpeedPercent,
    MetricKind::PowerDraw,
    MetricKind::UtilizationGpu,
    MetricKind::UtilizationMemory,
    MetricKind::MemoryUsed,
    MetricKind::MemoryTotal,
];

/// Decoded plugin configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigRecord {
    pub backend: BackendKind,
    pub registry: MetricRegistry,
    pub path: String,
}

impl Default for ConfigRecord {
    /// NVML at its default soname, every metric on, natural order
    fn default() -> Self {
        Self {
            backend: BackendKind::Nvml,
            registry: MetricRegistry::default(),
            path: BackendKind::Nvml.default_path().to_string(),
        }
    }
}

impl ConfigRecord {
    pub fn new(backend: BackendKind, registry: MetricRegistry, path: impl Into<String>) -> Self {
        Self {
            backend,
            registry,
            path: path.into(),
        }
    }

    pub fn encode(&self) -> String {
        encode(self.backend, &self.registry, &self.path)
    }
}

/// Encode in the current form
pub fn encode(backend: BackendKind, registry: &MetricRegistry, path: &str) -> String {
    format!(
        "{} {:03x} {} {}",
        backend.tag(),
        registry.enabled_mask(),
        encode_order(&registry.current_order()),
        path
    )
}

pub fn encode_order(order: &[MetricKind]) -> String {
    order.iter().map(|k| k.order_symbol()).collect()
}

/// Parse an order string; the result is always a full permutation
pub fn decode_order(order: &str) -> Result<Vec<MetricKind>, DecodeError> {
    let invalid = |reason: &str| DecodeError::InvalidPermutation {
        order: order.to_string(),
        reason: reason.to_string(),
    };

    if order.chars().count() != MetricKind::COUNT {
        return Err(invalid(&format!("expected {} symbols", MetricKind::COUNT)));
    }
    let kinds = order
        .chars()
        .map(|c| MetricKind::from_order_symbol(c).ok_or_else(|| invalid(&format!("unknown symbol '{}'", c))))
        .collect::<Result<Vec<_>, _>>()?;
    if !is_permutation(&kinds) {
        return Err(invalid("repeated symbol"));
    }
    Ok(kinds)
}

/// Decode, requiring the backend path to pass [`validate_path`]
pub fn decode(line: &str) -> Result<ConfigRecord, DecodeError> {
    decode_with(line, validate_path)
}

/// Decode with a caller-supplied path check
pub fn decode_with<F>(line: &str, path_is_valid: F) -> Result<ConfigRecord, DecodeError>
where
    F: Fn(BackendKind, &str) -> bool,
{
    let fields: Vec<&str> = line.split_whitespace().collect();
    let record = match fields.len() {
        0 => return Err(DecodeError::Empty),
        CURRENT_FIELDS => decode_current(&fields)?,
        LEGACY_FIELDS => decode_legacy(&fields)?,
        found => {
            return Err(DecodeError::FieldCount {
                expected: "4 or 10",
                found,
            })
        }
    };

    if !path_is_valid(record.backend, &record.path) {
        return Err(DecodeError::UnloadablePath(record.path));
    }
    Ok(record)
}

/// Decode, falling back to [`ConfigRecord::default`] on any rejection
pub fn decode_or_default(line: &str) -> ConfigRecord {
    decode(line).unwrap_or_else(|e| {
        warn!("Rejected configuration '{}': {}, using defaults", line.trim(), e);
        ConfigRecord::default()
    })
}

fn decode_backend(tag: &str) -> Result<BackendKind, DecodeError> {
    tag.parse()
        .map_err(|_| DecodeError::UnknownBackend(tag.to_string()))
}

fn decode_current(fields: &[&str]) -> Result<ConfigRecord, DecodeError> {
    let backend = decode_backend(fields[0])?;

    let mask = u16::from_str_radix(fields[1], 16)
        .map_err(|_| DecodeError::InvalidMask(fields[1].to_string()))?;
    if mask >> MetricKind::COUNT != 0 {
        return Err(DecodeError::InvalidMask(fields[1].to_string()));
    }

    let order = decode_order(fields[2])?;
    let mut registry = MetricRegistry::with_order(&order).ok_or_else(|| DecodeError::InvalidPermutation {
        order: fields[2].to_string(),
        reason: "not a permutation".to_string(),
    })?;
    registry.apply_mask(mask);

    Ok(ConfigRecord::new(backend, registry, fields[3]))
}

fn decode_legacy(fields: &[&str]) -> Result<ConfigRecord, DecodeError> {
    // Older releases only ever wrote NVML records.
    if fields[0] != BackendKind::Nvml.tag() {
        return Err(DecodeError::UnknownBackend(fields[0].to_string()));
    }

    let mut registry = MetricRegistry::default();
    for (kind, flag) in LEGACY_FLAGS.iter().zip(&fields[1..9]) {
        let value: i64 = flag
            .parse()
            .map_err(|_| DecodeError::InvalidFlag(flag.to_string()))?;
        registry.set_enabled(*kind, value != 0);
    }

    Ok(ConfigRecord::new(BackendKind::Nvml, registry, fields[9]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accept_any(_: BackendKind, _: &str) -> bool {
        true
    }

    #[test]
    fn test_default_record_encoding() {
        assert_eq!(
            ConfigRecord::default().encode(),
            "NVML 7ff abcdefghijk libnvidia-ml.so"
        );
    }

    #[test]
    fn test_order_round_trip() {
        for order in ["abcdefghijk", "kjihgfedcba", "bacdefghijk", "fkaebjcidhg"] {
            let record = decode_with(&format!("SMI 123 {} /usr/bin/nvidia-smi", order), accept_any).unwrap();
            assert_eq!(encode_order(&record.registry.current_order()), order);
            assert_eq!(record.encode(), format!("SMI 123 {} /usr/bin/nvidia-smi", order));
        }
    }

    #[test]
    fn test_decode_mask() {
        let record = decode_with("NVCTRL 020 abcdefghijk nvidia-settings", accept_any).unwrap();
        assert_eq!(record.backend, BackendKind::NvControl);
        assert_eq!(record.registry.enabled_in_order(), vec![MetricKind::Temperature]);

        assert!(matches!(
            decode_with("NVML 800 abcdefghijk x", accept_any),
            Err(DecodeError::InvalidMask(_))
        ));
        assert!(matches!(
            decode_with("NVML zz abcdefghijk x", accept_any),
            Err(DecodeError::InvalidMask(_))
        ));
    }

    #[test]
    fn test_decode_rejects_bad_orders() {
        for order in ["abcdefghij", "abcdefghijkl", "abcdefghijj", "abcdefghijz", "Abcdefghijk"] {
            let result = decode_with(&format!("NVML 7ff {} x", order), accept_any);
            assert!(
                matches!(result, Err(DecodeError::InvalidPermutation { .. })),
                "{} accepted",
                order
            );
        }
    }

    #[test]
    fn test_decode_rejects_field_count_and_tag() {
        assert_eq!(decode_with("", accept_any), Err(DecodeError::Empty));
        assert_eq!(
            decode_with("NVML 7ff abcdefghijk", accept_any),
            Err(DecodeError::FieldCount {
                expected: "4 or 10",
                found: 3
            })
        );
        assert!(matches!(
            decode_with("AMD 7ff abcdefghijk x", accept_any),
            Err(DecodeError::UnknownBackend(_))
        ));
    }

    #[test]
    fn test_decode_rejects_unloadable_path() {
        let result = decode_with("NVML 7ff abcdefghijk /nope/libnvidia-ml.so", |_, _| false);
        assert_eq!(
            result,
            Err(DecodeError::UnloadablePath("/nope/libnvidia-ml.so".to_string()))
        );
    }

    #[test]
    fn test_decode_legacy_flags() {
        let record = decode_with("NVML 1 0 1 0 1 1 0 7 /usr/lib/libnvidia-ml.so.1", accept_any).unwrap();
        let registry = &record.registry;
        assert!(registry.is_enabled(MetricKind::ClockGraphics));
        assert!(!registry.is_enabled(MetricKind::Temperature));
        assert!(registry.is_enabled(MetricKind::FanSpeedPercent));
        assert!(!registry.is_enabled(MetricKind::PowerDraw));
        assert!(!registry.is_enabled(MetricKind::MemoryUsed));
        assert!(registry.is_enabled(MetricKind::MemoryTotal));
        // Not covered by the legacy flags
        assert!(registry.is_enabled(MetricKind::Name));
        assert!(registry.is_enabled(MetricKind::FanSpeedRpm));
        assert!(registry.is_enabled(MetricKind::ClockMemory));
        assert_eq!(registry.current_order(), MetricKind::ALL.to_vec());
        assert_eq!(record.path, "/usr/lib/libnvidia-ml.so.1");

        assert!(matches!(
            decode_with("NVML 1 0 1 0 1 yes 0 1 x", accept_any),
            Err(DecodeError::InvalidFlag(_))
        ));
        assert!(matches!(
            decode_with("SMI 1 1 1 1 1 1 1 1 x", accept_any),
            Err(DecodeError::UnknownBackend(_))
        ));
    }

    #[test]
    fn test_malformed_line_falls_back_to_default() {
        assert_eq!(decode_or_default("NVML 7ff"), ConfigRecord::default());
        assert_eq!(decode_or_default("garbage"), ConfigRecord::default());
        assert_eq!(
            decode_or_default("NVML 001 abcdefghijk /nonexistent/libnvidia-ml.so"),
            ConfigRecord::default()
        );
    }
}
