//! Helpers for the subprocess-backed strategies

use std::env;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::trace;

use crate::constants::NOT_AVAILABLE_MARKERS;
use crate::{BindError, GknError, Result};

/// Run `program args...` and return its stdout
///
/// `display` is exported as `DISPLAY` for tools that talk to the X server.
pub(crate) fn run(program: &str, args: &[&str], display: Option<&str>) -> Result<String> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(display) = display {
        cmd.env("DISPLAY", display);
    }

    let output = cmd
        .output()
        .map_err(|e| GknError::command(program, e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GknError::command(
            program,
            format!("{} ({})", output.status, stderr.trim()),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    trace!("{} {:?} -> {:?}", program, args, stdout.trim());
    Ok(stdout)
}

/// Like [`run`], but classified as a bind failure: a missing executable is
/// `NotFound`, a tool that runs and fails is `InitFailed`
pub(crate) fn run_for_bind(
    program: &str,
    args: &[&str],
    display: Option<&str>,
) -> std::result::Result<String, BindError> {
    if program.trim().is_empty() {
        return Err(BindError::not_found(program, "empty executable path"));
    }

    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(display) = display {
        cmd.env("DISPLAY", display);
    }

    match cmd.output() {
        Ok(output) if output.status.success() => {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(BindError::init_failed(
                program,
                format!("{} ({})", output.status, stderr.trim()),
            ))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound || e.kind() == io::ErrorKind::PermissionDenied => {
            Err(BindError::not_found(program, e.to_string()))
        }
        Err(e) => Err(BindError::init_failed(program, e.to_string())),
    }
}

/// Locate `program` without running it: a path is checked directly, a bare
/// name is searched for on `PATH`
pub(crate) fn resolve_executable(program: &str) -> Option<PathBuf> {
    let program = program.trim();
    if program.is_empty() {
        return None;
    }
    if program.contains('/') {
        let path = PathBuf::from(program);
        return is_executable(&path).then_some(path);
    }
    env::var_os("PATH").and_then(|paths| {
        env::split_paths(&paths)
            .map(|dir| dir.join(program))
            .find(|candidate| is_executable(candidate))
    })
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// True for the placeholders vendor tools print instead of a reading
pub(crate) fn is_not_available(value: &str) -> bool {
    NOT_AVAILABLE_MARKERS.contains(&value.trim())
}

/// Parse an unsigned reading, rejecting vendor placeholders
pub(crate) fn parse_u32(query: &'static str, value: &str) -> Result<u32> {
    let value = value.trim();
    if is_not_available(value) {
        return Err(GknError::Unsupported(query));
    }
    value.parse().map_err(|_| GknError::parse(query, value))
}

/// Parse a decimal reading (nvidia-smi prints power as "123.45")
pub(crate) fn parse_f64(query: &'static str, value: &str) -> Result<f64> {
    let value = value.trim();
    if is_not_available(value) {
        return Err(GknError::Unsupported(query));
    }
    value.parse().map_err(|_| GknError::parse(query, value))
}
