//! Settings file
//!
//! The plugin owns one line, `nvidia <record>`, in
//! ~/.config/gknvidia/gknvidia.conf. Other lines are preserved on save.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use gkn_error::{GknError, Result};

use crate::codec::{decode_or_default, ConfigRecord};
use crate::constants::paths::{user_config_dir, APP_DIR, CONFIG_FILE, CONFIG_KEYWORD};

/// Default settings file location
pub fn config_path() -> PathBuf {
    user_config_dir()
        .unwrap_or_else(|| PathBuf::from(".").join(APP_DIR))
        .join(CONFIG_FILE)
}

/// The record part of the plugin's line, if the file has one
pub fn find_record_line(contents: &str) -> Option<&str> {
    contents.lines().find_map(|line| {
        let line = line.trim();
        let rest = line.strip_prefix(CONFIG_KEYWORD)?;
        rest.starts_with(char::is_whitespace).then(|| rest.trim())
    })
}

/// Read the record line from `path`; `Ok(None)` when the file or line is
/// missing
pub fn read_record_line(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        debug!("No settings file at {:?}", path);
        return Ok(None);
    }
    let contents = fs::read_to_string(path).map_err(|e| GknError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(find_record_line(&contents).map(str::to_string))
}

/// Load the record stored at `path`, or the default record
pub fn load_settings(path: &Path) -> ConfigRecord {
    match read_record_line(path) {
        Ok(Some(line)) => {
            let record = decode_or_default(&line);
            info!("Loaded settings from {:?}", path);
            record
        }
        Ok(None) => ConfigRecord::default(),
        Err(e) => {
            warn!("Could not read settings: {}", e);
            ConfigRecord::default()
        }
    }
}

/// Write `record` to `path`, replacing only the plugin's line
pub fn save_settings(path: &Path, record: &ConfigRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let existing = if path.exists() {
        fs::read_to_string(path).map_err(|e| GknError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?
    } else {
        String::new()
    };

    let mut contents: String = existing
        .lines()
        .filter(|line| find_record_line(line).is_none())
        .map(|line| format!("{}\n", line))
        .collect();
    contents.push_str(&format!("{} {}\n", CONFIG_KEYWORD, record.encode()));

    // Write to a temp file then rename over the settings file
    let temp_path = path.with_extension("conf.tmp");
    let write_err = |e| GknError::FileWrite {
        path: temp_path.clone(),
        source: e,
    };
    let mut file = fs::File::create(&temp_path).map_err(write_err)?;
    file.write_all(contents.as_bytes()).map_err(write_err)?;
    file.sync_all().map_err(write_err)?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|e| GknError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })?;

    debug!("Saved settings to {:?}", path);
    Ok(())
}
