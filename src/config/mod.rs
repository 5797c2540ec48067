use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::DEFAULT_MAX_SLOTS;

/// Save preset persisted to disk.
///
/// Every field falls back to its default when missing from the file, so old
/// preset files keep loading after new options are added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SavePreset {
    /// Number of usable slots; valid ids are `0..max_slots`
    pub max_slots: i32,

    /// Reload the current slot when the manager initializes
    pub auto_load: bool,

    /// Save the current slot when the manager shuts down
    pub save_on_exit: bool,

    /// Template used to instantiate fresh slot infos (None = default)
    pub slot_info_template: Option<String>,

    /// Template used to instantiate fresh slot data (None = default)
    pub slot_data_template: Option<String>,

    /// Emit informational logs for save/load activity
    pub logging_enabled: bool,
}

impl Default for SavePreset {
    fn default() -> Self {
        Self {
            max_slots: DEFAULT_MAX_SLOTS,
            auto_load: false,
            save_on_exit: false,
            slot_info_template: None,
            slot_data_template: None,
            logging_enabled: true,
        }
    }
}

impl SavePreset {
    pub fn is_valid_slot(&self, slot: i32) -> bool {
        slot >= 0 && slot < self.max_slots
    }
}

/// Result of loading the preset from disk
pub struct LoadPresetResult {
    pub preset: SavePreset,
    /// Error message if the preset was reset to defaults due to an error
    pub reset_reason: Option<String>,
}

/// Load the save preset from disk
pub fn load_preset(path: &Path) -> LoadPresetResult {
    let (preset, reset_reason) = if path.exists() {
        match std::fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(preset) => {
                    info!("Loaded save preset from {:?}", path);
                    (preset, None)
                }
                Err(e) => {
                    warn!("Failed to parse save preset: {}", e);
                    (
                        SavePreset::default(),
                        Some(format!("Save preset was corrupted: {}", e)),
                    )
                }
            },
            Err(e) => {
                warn!("Failed to read save preset: {}", e);
                (
                    SavePreset::default(),
                    Some(format!("Could not read save preset: {}", e)),
                )
            }
        }
    } else {
        info!("No save preset found, using defaults");
        (SavePreset::default(), None)
    };

    LoadPresetResult {
        preset,
        reset_reason,
    }
}

/// Save the preset to disk
pub fn save_preset(preset: &SavePreset, path: &Path) {
    match serde_json::to_string_pretty(preset) {
        Ok(json) => {
            if let Err(e) = std::fs::write(path, json) {
                error!("Failed to save preset: {}", e);
            } else {
                info!("Save preset written to {:?}", path);
            }
        }
        Err(e) => {
            error!("Failed to serialize preset: {}", e);
        }
    }
}
