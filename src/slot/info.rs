//! Slot metadata, the small record listed on load screens.

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_TEMPLATE, SAVE_FORMAT_VERSION};

fn default_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}

/// Metadata stored in a slot's info blob.
///
/// Cheap to decode compared to [`SlotData`](super::SlotData), so slot listings
/// only ever read this blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotInfo {
    pub id: i32,
    /// Display name shown on load screens
    pub name: String,
    /// Secondary display line (chapter, location, ...)
    #[serde(default)]
    pub subname: String,
    pub saved_at: DateTime<Utc>,
    /// Accumulated play time in seconds
    #[serde(default)]
    pub played_time: f64,
    /// Map that was active when the slot was written
    #[serde(default)]
    pub map: String,
    /// Reference returned by the screenshot collaborator, if one was taken
    #[serde(default)]
    pub screenshot: Option<String>,
    /// Crate version that wrote the slot (empty for legacy slots)
    #[serde(default)]
    pub version: String,
    #[serde(default = "default_template")]
    pub template: String,
}

impl Default for SlotInfo {
    fn default() -> Self {
        Self {
            id: 0,
            name: "New Game".to_string(),
            subname: String::new(),
            saved_at: DateTime::<Utc>::default(),
            played_time: 0.0,
            map: String::new(),
            screenshot: None,
            version: SAVE_FORMAT_VERSION.to_string(),
            template: default_template(),
        }
    }
}

impl SlotInfo {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Whether this build can read a slot written by `self.version`
    pub fn is_compatible(&self) -> bool {
        is_compatible_version(&self.version, SAVE_FORMAT_VERSION)
    }
}

/// Compare save versions, returns true if data written by `saved` can be read by `current`.
///
/// Legacy slots without a version are accepted. Otherwise the major version
/// must match (the minor version for 0.x releases) and the slot must not come
/// from a newer release.
pub fn is_compatible_version(saved: &str, current: &str) -> bool {
    if saved.is_empty() {
        return true;
    }

    match (Version::parse(saved), Version::parse(current)) {
        (Ok(saved_v), Ok(current_v)) => {
            if saved_v > current_v {
                return false;
            }
            if current_v.major == 0 {
                saved_v.major == 0 && saved_v.minor == current_v.minor
            } else {
                saved_v.major == current_v.major
            }
        }
        _ => false,
    }
}
