//! Slot model: naming, metadata, data payload and templates.

mod data;
mod info;
mod naming;
mod templates;

#[cfg(test)]
mod tests;

pub use data::SlotData;
pub use info::{SlotInfo, is_compatible_version};
pub use naming::{slot_data_name, slot_info_name};
pub use templates::SlotTemplates;
