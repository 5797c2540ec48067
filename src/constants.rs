//! Centralized constants used across the crate.
//!
//! This module contains magic numbers and configuration values that are used
//! in multiple places or would benefit from being named constants.

/// Default number of save slots when the preset does not override it
pub const DEFAULT_MAX_SLOTS: i32 = 100;

/// File extension used by the file blob store
pub const BLOB_EXTENSION: &str = "sav";

/// Suffix appended to the slot id to name the data blob
pub const SLOT_DATA_SUFFIX: &str = "_data";

/// Name of the template used when the preset does not select one
pub const DEFAULT_TEMPLATE: &str = "default";

/// Default screenshot width in pixels
pub const DEFAULT_SCREENSHOT_WIDTH: u32 = 640;

/// Default screenshot height in pixels
pub const DEFAULT_SCREENSHOT_HEIGHT: u32 = 360;

/// Version of the crate writing slots (stored in every slot info)
pub const SAVE_FORMAT_VERSION: &str = env!("CARGO_PKG_VERSION");
