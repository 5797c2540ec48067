//! Centralized path resolution for platform-appropriate user data directories.
//!
//! In development mode (cargo run), paths resolve to local directories.
//! In installed mode, paths resolve to platform-specific locations:
//! - Windows: `%APPDATA%\Saveforged\`
//! - macOS: `~/Library/Application Support/Saveforged/`
//! - Linux: `~/.config/saveforged/` (config), `~/.local/share/saveforged/` (data)

use std::path::PathBuf;

/// Returns true when running in development mode (cargo run).
///
/// Detection methods:
/// - `CARGO` env var is set (cargo run sets this)
/// - Debug assertions enabled (debug builds)
pub fn is_dev_mode() -> bool {
    std::env::var("CARGO").is_ok() || cfg!(debug_assertions)
}

/// Platform-appropriate config directory.
///
/// - Dev mode: current directory
/// - Linux: `~/.config/saveforged/`
/// - Windows/macOS: same as data_dir
pub fn config_dir() -> Option<PathBuf> {
    if is_dev_mode() {
        return Some(PathBuf::from("."));
    }

    #[cfg(target_os = "linux")]
    {
        dirs::config_dir().map(|p| p.join("saveforged"))
    }

    #[cfg(not(target_os = "linux"))]
    {
        data_dir()
    }
}

/// Platform-appropriate data directory.
pub fn data_dir() -> Option<PathBuf> {
    if is_dev_mode() {
        return Some(PathBuf::from("."));
    }

    dirs::data_dir().map(|p| p.join("saveforged"))
}

/// Path to the save preset file.
///
/// - Dev mode: `./save_preset.json`
/// - Installed: `{config_dir}/save_preset.json`
pub fn preset_file() -> PathBuf {
    config_dir()
        .map(|p| p.join("save_preset.json"))
        .unwrap_or_else(|| PathBuf::from("save_preset.json"))
}

/// Directory holding slot blobs.
///
/// - Dev mode: `./saves/`
/// - Installed: `{data_dir}/saves/`
pub fn saves_dir() -> PathBuf {
    data_dir()
        .map(|p| p.join("saves"))
        .unwrap_or_else(|| PathBuf::from("saves"))
}

/// Path to the logs directory.
pub fn logs_dir() -> PathBuf {
    data_dir()
        .map(|p| p.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Ensure all required directories exist.
///
/// Called early in startup to create config, saves and logs directories.
pub fn ensure_directories() -> std::io::Result<()> {
    if let Some(config) = config_dir() {
        std::fs::create_dir_all(&config)?;
    }
    std::fs::create_dir_all(saves_dir())?;
    std::fs::create_dir_all(logs_dir())?;
    Ok(())
}
