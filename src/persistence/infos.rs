//! Background slot info enumeration.

use bevy::prelude::*;
use bevy::tasks::{AsyncComputeTaskPool, Task, TaskPool};
use futures_lite::future;
use std::sync::Arc;

use crate::error::PersistError;
use crate::slot::{SlotInfo, slot_info_name};
use crate::store::BlobStore;

/// Callback receiving the slot listing on the main loop
pub type InfosCallback = Box<dyn FnOnce(Vec<SlotInfo>) + Send + Sync>;

/// One in-flight enumeration.
pub(crate) struct LoadInfosJob {
    task: Task<Vec<SlotInfo>>,
    callback: Option<InfosCallback>,
}

impl LoadInfosJob {
    pub fn spawn(
        store: Arc<dyn BlobStore>,
        max_slots: i32,
        sort_by_recent: bool,
        callback: InfosCallback,
    ) -> Self {
        let task_pool = AsyncComputeTaskPool::get_or_init(TaskPool::new);
        let task = task_pool
            .spawn(async move { collect_slot_infos(store.as_ref(), max_slots, sort_by_recent) });

        Self {
            task,
            callback: Some(callback),
        }
    }

    /// Check the job once; on completion fire the callback and report true
    pub fn poll(&mut self) -> bool {
        let Some(infos) = future::block_on(future::poll_once(&mut self.task)) else {
            return false;
        };
        if let Some(callback) = self.callback.take() {
            callback(infos);
        }
        true
    }

    /// Wait for the background scan to end without firing the callback
    pub fn force_completion(self) {
        future::block_on(self.task);
    }
}

/// Read the info blob of `slot`
pub(crate) fn read_slot_info(store: &dyn BlobStore, slot: i32) -> Result<SlotInfo, PersistError> {
    let bytes = store.load(&slot_info_name(slot))?;
    Ok(SlotInfo::from_bytes(&bytes)?)
}

/// Scan every slot id and decode the infos of saved slots.
///
/// Slots whose info blob cannot be decoded are skipped with a warning.
pub(crate) fn collect_slot_infos(
    store: &dyn BlobStore,
    max_slots: i32,
    sort_by_recent: bool,
) -> Vec<SlotInfo> {
    let mut infos: Vec<SlotInfo> = (0..max_slots)
        .filter(|slot| super::slot_exists(store, *slot))
        .filter_map(|slot| match read_slot_info(store, slot) {
            Ok(info) => Some(info),
            Err(e) => {
                warn!("Skipping unreadable slot {}: {}", slot, e);
                None
            }
        })
        .collect();

    if sort_by_recent {
        infos.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
    }
    infos
}
