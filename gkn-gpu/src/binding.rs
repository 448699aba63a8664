//! Backend binding lifecycle
//!
//! A binding is replaced wholesale: `rebind` tears the old backend down
//! completely before the new one is attempted, and a failed rebind leaves the
//! binding empty rather than falling back to the previous backend.

use tracing::{debug, info, warn};

use crate::{command, nvctrl, nvml, open_backend, smi, Backend, BackendKind, BindError, Capabilities};

/// The plugin's single live connection to a vendor backend
pub struct Binding {
    kind: BackendKind,
    path: String,
    backend: Option<Box<dyn Backend>>,
    capabilities: Capabilities,
}

impl Binding {
    /// A binding with nothing loaded
    pub fn unbound(kind: BackendKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            backend: None,
            capabilities: Capabilities::none(),
        }
    }

    /// Load the backend of `kind` from `path`
    pub fn bind(kind: BackendKind, path: &str) -> Result<Self, BindError> {
        let backend = open_backend(kind, path)?;
        info!("Bound {} backend at {}", kind, path);
        Ok(Self::from_backend(path, backend))
    }

    /// Wrap an already-opened backend
    pub fn from_backend(path: impl Into<String>, backend: Box<dyn Backend>) -> Self {
        let capabilities = backend.capabilities();
        for (query, _) in capabilities.iter().filter(|(_, resolved)| !resolved) {
            debug!("Backend query {} unavailable", query.name());
        }
        Self {
            kind: backend.kind(),
            path: path.into(),
            backend: Some(backend),
            capabilities,
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.backend.is_some()
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn backend(&self) -> Option<&dyn Backend> {
        self.backend.as_deref()
    }

    /// Shut the backend down and release it. No-op when nothing is bound.
    pub fn unbind(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.shutdown();
            info!("Unbound {} backend at {}", self.kind, self.path);
        }
        self.capabilities = Capabilities::none();
    }

    /// Unbind, then bind `kind` at `path`. On failure the binding stays empty.
    pub fn rebind(&mut self, kind: BackendKind, path: &str) -> Result<(), BindError> {
        self.unbind();
        self.kind = kind;
        self.path = path.to_string();

        match open_backend(kind, path) {
            Ok(backend) => {
                *self = Self::from_backend(path, backend);
                info!("Rebound {} backend at {}", kind, path);
                Ok(())
            }
            Err(e) => {
                warn!("Rebind to {} failed: {}", path, e);
                Err(e)
            }
        }
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        self.unbind();
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// Check that `path` could be bound as `kind`, without touching any live
/// binding. Used for immediate feedback while the user edits the path.
pub fn validate_path(kind: BackendKind, path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    let result = match kind {
        BackendKind::Nvml => nvml::probe(path),
        BackendKind::NvControl => nvctrl::probe(path),
        BackendKind::Smi => smi::probe(path),
    };
    match result {
        Ok(()) => true,
        Err(e) => {
            debug!("Path validation failed: {}", e);
            false
        }
    }
}

/// Cheap check for use on every keystroke while a path is typed
///
/// Executables are only located on disk, never run. A library has to be
/// loaded to be checked at all, so NVML paths get the full [`validate_path`].
pub fn precheck_path(kind: BackendKind, path: &str) -> bool {
    match kind {
        BackendKind::Nvml => validate_path(kind, path),
        BackendKind::NvControl | BackendKind::Smi => command::resolve_executable(path).is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_missing_library_is_not_found() {
        let err = Binding::bind(BackendKind::Nvml, "/nonexistent/libnvidia-ml.so.999").unwrap_err();
        assert!(matches!(err, BindError::NotFound { .. }));
    }

    #[test]
    fn test_bind_library_without_nvml_entry_points() {
        let err = Binding::bind(BackendKind::Nvml, "libc.so.6").unwrap_err();
        assert!(matches!(err, BindError::IncompatibleApi { .. }));
        assert!(!validate_path(BackendKind::Nvml, "libc.so.6"));
    }

    #[test]
    fn test_unbind_is_idempotent() {
        let mut binding = Binding::unbound(BackendKind::Nvml, "libnvidia-ml.so");
        binding.unbind();
        binding.unbind();
        assert!(!binding.is_loaded());
        assert!(binding.backend().is_none());
    }

    #[test]
    fn test_failed_rebind_leaves_binding_empty() {
        let mut binding = Binding::unbound(BackendKind::Nvml, "libnvidia-ml.so");
        assert!(binding.rebind(BackendKind::Smi, "/nonexistent/nvidia-smi").is_err());
        assert!(!binding.is_loaded());
        assert_eq!(binding.kind(), BackendKind::Smi);
        assert_eq!(binding.path(), "/nonexistent/nvidia-smi");
        assert!(binding.capabilities().missing_mandatory().len() == 5);
    }

    #[test]
    fn test_precheck_only_locates_executables() {
        assert!(!precheck_path(BackendKind::Smi, ""));
        assert!(!precheck_path(BackendKind::Smi, "/nonexistent/nvidia-smi"));
        assert!(!precheck_path(BackendKind::NvControl, "/nonexistent/nvidia-settings"));
        assert!(!precheck_path(BackendKind::Nvml, "/nonexistent/libnvidia-ml.so"));
        if std::path::Path::new("/bin/true").exists() {
            // found on disk, but only the full check runs it
            assert!(precheck_path(BackendKind::Smi, "/bin/true"));
            assert!(!validate_path(BackendKind::Smi, "/bin/true"));
        }
    }

    #[test]
    fn test_validate_rejects_empty_and_missing_paths() {
        assert!(!validate_path(BackendKind::Nvml, ""));
        assert!(!validate_path(BackendKind::Nvml, "   "));
        assert!(!validate_path(BackendKind::Nvml, "/nonexistent/libnvidia-ml.so"));
        assert!(!validate_path(BackendKind::Smi, "/nonexistent/nvidia-smi"));
        assert!(!validate_path(BackendKind::NvControl, "/nonexistent/nvidia-settings"));
    }
}
