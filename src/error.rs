//! Error types for slot persistence.

use thiserror::Error;

/// Failure of a single blob store operation.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob '{0}' not found")]
    NotFound(String),

    #[error("blob I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything that can go wrong while admitting or running a slot task.
///
/// Validation variants (`InvalidSlot`, `NoAuthorityOrContext`, `NotFound`,
/// `OverwriteDenied`) are normally caught at admission and only reach a
/// callback when the condition appears while the task waits in the queue.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("slot {0} is outside the configured range")]
    InvalidSlot(i32),

    #[error("no authority or valid world context")]
    NoAuthorityOrContext,

    #[error("slot {0} is not saved")]
    NotFound(i32),

    #[error("slot {0} already exists and overwriting was not allowed")]
    OverwriteDenied(i32),

    #[error("invalid task parameters: {0}")]
    InvalidParameters(String),

    #[error(transparent)]
    Io(#[from] BlobError),

    #[error("failed to (de)serialize slot: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("slot was written by incompatible version {saved} (running {current})")]
    IncompatibleVersion { saved: String, current: String },

    #[error("world rejected region '{region}': {reason}")]
    Region { region: String, reason: String },

    #[error("could not enter map '{0}'")]
    MapTransitionFailure(String),

    #[error("task interrupted by shutdown")]
    Interrupted,
}
