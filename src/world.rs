//! Collaborator interfaces implemented by the host game.

use bevy::tasks::Task;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_SCREENSHOT_HEIGHT, DEFAULT_SCREENSHOT_WIDTH};

/// The live game world as seen by the save manager.
///
/// Covers authority, the active map and its streaming regions, and the
/// capture/apply hooks that turn world state into slot payloads. The manager
/// calls these from the main loop only.
pub trait WorldContext: Send + Sync {
    /// Whether this instance may mutate persisted state (e.g. is the host)
    fn has_authority(&self) -> bool;

    /// Whether a world is loaded and usable
    fn is_valid(&self) -> bool {
        true
    }

    /// Name of the active map
    fn current_map(&self) -> String;

    /// Streaming regions of the active map
    fn streaming_regions(&self) -> Vec<String>;

    /// Whether `region` is currently loaded into the live world
    fn is_region_visible(&self, region: &str) -> bool;

    /// Capture the persistent world state
    fn capture_world(&self) -> serde_json::Value;

    /// Apply a previously captured world state
    fn apply_world(&mut self, world: &serde_json::Value);

    /// Serialize a region that is about to unload
    fn serialize_region(&mut self, region: &str) -> Result<Vec<u8>, String>;

    /// Restore a region that just became visible
    fn deserialize_region(&mut self, region: &str, bytes: &[u8]) -> Result<(), String>;

    /// Start travelling to `map`. Completion is reported to the manager
    /// through `on_map_load_finished`.
    fn open_map(&mut self, map: &str) -> Result<(), String>;
}

/// Requested screenshot resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotSize {
    pub width: u32,
    pub height: u32,
}

impl Default for ScreenshotSize {
    fn default() -> Self {
        Self {
            width: DEFAULT_SCREENSHOT_WIDTH,
            height: DEFAULT_SCREENSHOT_HEIGHT,
        }
    }
}

/// Screenshot utility used by save tasks.
pub trait ScreenshotCapture: Send + Sync {
    /// Begin a capture for `slot`. The task resolves to a reference (usually
    /// a file path) stored in the slot info.
    fn request(&self, slot: i32, size: ScreenshotSize) -> Task<Result<String, String>>;
}
