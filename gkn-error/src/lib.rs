//! Unified error handling for gknvidia
//!
//! A single error type is shared by every gknvidia crate. Backend binding and
//! configuration decoding get their own narrower enums because callers treat
//! them differently: a bind failure means "no GPUs", a decode failure means
//! "use the default record". Both convert into [`GknError`].

use std::io;
use std::path::PathBuf;

/// Result type alias using GknError
pub type Result<T> = std::result::Result<T, GknError>;

/// Unified error type for all gknvidia operations
#[derive(thiserror::Error, Debug)]
pub enum GknError {
    // ============================================================================
    // Binding and Decoding
    // ============================================================================
    #[error(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    // ============================================================================
    // Backend Query Errors
    // ============================================================================
    #[error("Query not supported by backend: {0}")]
    Unsupported(&'static str),

    #[error("NVML {call} failed: {message}")]
    Nvml {
        call: &'static str,
        message: String,
    },

    #[error("Failed to run {program}: {reason}")]
    Command {
        program: String,
        reason: String,
    },

    #[error("Could not parse {query} from '{value}'")]
    Parse {
        query: &'static str,
        value: String,
    },

    #[error("GPU {0} not found")]
    DeviceNotFound(u32),

    // ============================================================================
    // I/O
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: io::Error,
    },

    #[error("{0}")]
    Generic(String),
}

impl GknError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a command error for `program`
    pub fn command(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Command {
            program: program.into(),
            reason: reason.into(),
        }
    }

    /// Create a parse error for a query result
    pub fn parse(query: &'static str, value: impl Into<String>) -> Self {
        Self::Parse {
            query,
            value: value.into(),
        }
    }

    /// True when the error only means the backend lacks the query
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}

impl From<String> for GknError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

impl From<&str> for GknError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}

/// Failure to establish a backend binding
///
/// Fatal to all telemetry until the path is corrected; the plugin reports
/// this as the "no GPUs" state.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    #[error("Backend not loadable at {path}: {reason}")]
    NotFound {
        path: String,
        reason: String,
    },

    #[error("Backend at {path} is missing required entry points: {}", missing.join(", "))]
    IncompatibleApi {
        path: String,
        missing: Vec<&'static str>,
    },

    #[error("Backend at {path} failed to initialize: {reason}")]
    InitFailed {
        path: String,
        reason: String,
    },
}

impl BindError {
    /// Create a not-found error
    pub fn not_found(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotFound {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an init-failed error
    pub fn init_failed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InitFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Path the failed bind was attempted against
    pub fn path(&self) -> &str {
        match self {
            Self::NotFound { path, .. }
            | Self::IncompatibleApi { path, .. }
            | Self::InitFailed { path, .. } => path,
        }
    }
}

/// Rejection of a persisted configuration record
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Empty configuration record")]
    Empty,

    #[error("Wrong field count: expected {expected}, found {found}")]
    FieldCount {
        expected: &'static str,
        found: usize,
    },

    #[error("Unknown backend tag: {0}")]
    UnknownBackend(String),

    #[error("Invalid enabled mask: {0}")]
    InvalidMask(String),

    #[error("Invalid enable flag: {0}")]
    InvalidFlag(String),

    #[error("Invalid metric order '{order}': {reason}")]
    InvalidPermutation {
        order: String,
        reason: String,
    },

    #[error("Backend path is not loadable: {0}")]
    UnloadablePath(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_path() {
        let err = BindError::not_found("/opt/libnvidia-ml.so", "no such file");
        assert_eq!(err.path(), "/opt/libnvidia-ml.so");

        let err = BindError::IncompatibleApi {
            path: "libfoo.so".to_string(),
            missing: vec!["nvmlInit", "nvmlShutdown"],
        };
        assert_eq!(err.path(), "libfoo.so");
        assert!(err.to_string().contains("nvmlInit, nvmlShutdown"));
    }

    #[test]
    fn test_conversions() {
        let err: GknError = BindError::init_failed("x", "code 9").into();
        assert!(matches!(err, GknError::Bind(BindError::InitFailed { .. })));

        let err: GknError = DecodeError::Empty.into();
        assert!(matches!(err, GknError::Decode(DecodeError::Empty)));

        let err: GknError = "boom".into();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_is_unsupported() {
        assert!(GknError::Unsupported("power usage").is_unsupported());
        let err = GknError::Nvml {
            call: "temperature",
            message: "GPU is lost".to_string(),
        };
        assert!(!err.is_unsupported());
        assert_eq!(err.to_string(), "NVML temperature failed: GPU is lost");
        assert!(!GknError::DeviceNotFound(0).is_unsupported());
    }
}
