//! Slot data, the full application-state payload of a slot.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::DEFAULT_TEMPLATE;

fn default_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}

/// In-memory save buffer.
///
/// The world payload is opaque to the orchestrator: it is captured from and
/// applied to the [`WorldContext`](crate::world::WorldContext). Region
/// payloads are only meaningful while their region is hidden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotData {
    /// Map the payload belongs to
    pub map: String,
    #[serde(default)]
    pub world: serde_json::Value,
    /// Serialized streaming regions, keyed by region id
    #[serde(default)]
    pub regions: BTreeMap<String, Vec<u8>>,
    #[serde(default = "default_template")]
    pub template: String,
}

impl Default for SlotData {
    fn default() -> Self {
        Self {
            map: String::new(),
            world: serde_json::Value::Null,
            regions: BTreeMap::new(),
            template: default_template(),
        }
    }
}

impl SlotData {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn region(&self, region: &str) -> Option<&[u8]> {
        self.regions.get(region).map(Vec::as_slice)
    }
}
