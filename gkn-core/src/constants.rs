//! Core constants
//!
//! Panel geometry, display sentinels and settings file locations.

/// Placeholder rendered for any disabled, unsupported or failed reading
pub const NOT_AVAILABLE: &str = "N/A";

/// Text capacity of a panel cell, including the terminator of the host's
/// fixed buffers. Names longer than `TEXT_CAPACITY - 1` chars are cut.
pub const TEXT_CAPACITY: usize = 64;

/// Panel layout spacing, in pixels
pub mod layout {
    /// Y coordinate of the first row
    pub const ORIGIN_Y: i32 = -1;

    /// Gap below an ordinary metric row
    pub const ROW_GAP: i32 = 1;

    /// Gap below a device's name row
    pub const NAME_ROW_GAP: i32 = 5;

    /// Gap between two device blocks
    pub const DEVICE_GAP: i32 = 10;

    /// Gap after the final device block
    pub const LAST_DEVICE_GAP: i32 = 1;

    /// Row height used when the host has not measured its font
    pub const DEFAULT_ROW_HEIGHT: i32 = 12;
}

/// Settings file
pub mod paths {
    /// Keyword that prefixes the plugin's line in the settings file
    pub const CONFIG_KEYWORD: &str = "nvidia";

    /// Directory under the user config dir
    pub const APP_DIR: &str = "gknvidia";

    /// File name inside [`APP_DIR`]
    pub const CONFIG_FILE: &str = "gknvidia.conf";

    /// Resolve `$XDG_CONFIG_HOME`, then `$HOME/.config`, then the platform
    /// config dir
    pub fn user_config_dir() -> Option<std::path::PathBuf> {
        let base = std::env::var("XDG_CONFIG_HOME")
            .ok()
            .filter(|v| !v.is_empty())
            .map(std::path::PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .filter(|v| !v.is_empty())
                    .map(|home| std::path::PathBuf::from(home).join(".config"))
            })
            .or_else(dirs::config_dir)?;
        Some(base.join(APP_DIR))
    }
}
