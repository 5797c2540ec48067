//! Slot id to blob name mapping.

use crate::constants::SLOT_DATA_SUFFIX;

/// Name of the metadata blob owned by `slot`
pub fn slot_info_name(slot: i32) -> String {
    slot.to_string()
}

/// Name of the data blob owned by `slot`
pub fn slot_data_name(slot: i32) -> String {
    format!("{}{}", slot, SLOT_DATA_SUFFIX)
}
