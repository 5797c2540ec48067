//! Slot persistence orchestration.
//!
//! A single [`SaveManager`] owns the current slot and runs every save, load
//! and streaming-region task through one FIFO queue, one task at a time.
//!
//! ## Module Structure
//!
//! - [`task`] - Task state machine and the operation enum
//! - [`saver`] - Save task steps (screenshot, capture, background write)
//! - [`loader`] - Load task steps (background read, map travel, restore)
//! - [`region`] - Region tasks and visibility notifiers
//! - [`infos`] - Background slot enumeration
//! - [`observers`] - Save/load lifecycle subscribers
//! - [`manager`] - The queue itself
//! - [`registry`] - Owner -> manager map for multi-instance hosts
//! - [`messages`] - Message types for the Bevy plugin
//! - [`systems`] - Systems driving the manager resource
//!
//! ## Systems
//!
//! - [`init_save_manager`] - Initializes the manager at startup
//! - [`tick_save_manager`] - Advances the queue once per frame
//! - [`shutdown_on_exit`] - Flushes the queue when the app exits

mod infos;
mod loader;
mod manager;
mod messages;
mod observers;
mod region;
mod registry;
mod saver;
mod systems;
mod task;

#[cfg(test)]
mod tests;

pub use infos::InfosCallback;
pub use manager::{DeleteOutcome, PersistenceEvent, SaveManager};
pub use messages::{
    DeleteSlotRequest, GameLoaded, GameSaved, LoadSlotInfosRequest, LoadSlotRequest,
    MapLoadFinished, MapLoadStarted, SaveSlotRequest, SlotInfosLoaded,
};
pub use observers::{LifecycleEvent, SaveObserver, Subscribers};
pub use region::{RegionNotifier, RegionTransition};
pub use registry::{InstanceId, SaveManagerRegistry};
pub use systems::{
    SlotInfoInbox, forward_persistence_events, forward_slot_infos, handle_delete_requests,
    handle_load_requests, handle_map_messages, handle_save_requests, handle_slot_info_requests,
    init_save_manager, shutdown_on_exit, tick_save_manager,
};
pub use task::{SlotTask, TaskCallback, TaskId, TaskKind, TaskResult, TaskState};

use crate::slot::{slot_data_name, slot_info_name};
use crate::store::BlobStore;

/// A slot is saved when both its metadata and data blobs exist
pub(crate) fn slot_exists(store: &dyn BlobStore, slot: i32) -> bool {
    store.exists(&slot_info_name(slot)) && store.exists(&slot_data_name(slot))
}
