//! Load task: background blob reads, map travel and world restore.

use bevy::prelude::*;
use bevy::tasks::{IoTaskPool, Task, TaskPool};
use std::sync::Arc;

use crate::constants::SAVE_FORMAT_VERSION;
use crate::error::PersistError;
use crate::slot::{SlotData, SlotInfo, slot_data_name, slot_info_name};
use crate::store::BlobStore;

use super::task::{Progress, TaskContext};

type LoadedSlot = (SlotInfo, SlotData);

enum LoadStep {
    Idle,
    Reading(Task<Result<LoadedSlot, PersistError>>),
    /// Map travel requested, waiting for the host to report completion
    AwaitingMap { map: String },
    MapReady { map: String },
    Done,
}

pub(crate) struct LoadOp {
    slot: i32,
    step: LoadStep,
}

impl LoadOp {
    pub fn new(slot: i32) -> Self {
        Self {
            slot,
            step: LoadStep::Idle,
        }
    }

    pub fn slot(&self) -> i32 {
        self.slot
    }

    pub fn is_awaiting_map(&self) -> bool {
        matches!(self.step, LoadStep::AwaitingMap { .. })
    }

    pub fn on_map_loaded(&mut self) {
        if let LoadStep::AwaitingMap { map } = std::mem::replace(&mut self.step, LoadStep::Done) {
            self.step = LoadStep::MapReady { map };
        }
    }

    pub fn begin(&mut self, ctx: &mut TaskContext) -> Progress {
        if !ctx.preset.is_valid_slot(self.slot) {
            return Progress::Done(Err(PersistError::InvalidSlot(self.slot)));
        }
        if !ctx.slot_exists(self.slot) {
            warn!("Slot {} is not saved, nothing to load", self.slot);
            return Progress::Done(Err(PersistError::NotFound(self.slot)));
        }

        self.step = LoadStep::Reading(spawn_read(ctx.store.clone(), self.slot));
        Progress::Pending
    }

    pub fn tick(&mut self, ctx: &mut TaskContext) -> Progress {
        match std::mem::replace(&mut self.step, LoadStep::Done) {
            LoadStep::Reading(mut task) => match ctx.poll(&mut task) {
                None => {
                    self.step = LoadStep::Reading(task);
                    Progress::Pending
                }
                Some(Ok((info, data))) => self.replace_current(ctx, info, data),
                Some(Err(e)) => Progress::Done(Err(e)),
            },
            LoadStep::MapReady { map } => {
                if ctx.world.current_map() != map {
                    return Progress::Done(Err(PersistError::MapTransitionFailure(map)));
                }
                Progress::Done(restore_world(ctx))
            }
            LoadStep::AwaitingMap { map } => {
                self.step = LoadStep::AwaitingMap { map };
                Progress::Awaiting
            }
            LoadStep::Idle | LoadStep::Done => Progress::Pending,
        }
    }

    /// Swap the loaded slot in as the current one, travelling first when the
    /// slot belongs to another map.
    fn replace_current(&mut self, ctx: &mut TaskContext, info: SlotInfo, data: SlotData) -> Progress {
        if !info.is_compatible() {
            return Progress::Done(Err(PersistError::IncompatibleVersion {
                saved: info.version,
                current: SAVE_FORMAT_VERSION.to_string(),
            }));
        }

        *ctx.info = info;
        *ctx.data = data;

        let map = ctx.data.map.clone();
        if map.is_empty() || map == ctx.world.current_map() {
            return Progress::Done(restore_world(ctx));
        }

        if ctx.preset.logging_enabled {
            info!("Slot {} belongs to map '{}', travelling", self.slot, map);
        }
        if let Err(e) = ctx.world.open_map(&map) {
            error!("Failed to open map '{}': {}", map, e);
            return Progress::Done(Err(PersistError::MapTransitionFailure(map)));
        }
        self.step = LoadStep::AwaitingMap { map };
        Progress::Awaiting
    }
}

/// Apply the current slot data to the live world, including every region
/// that is already visible.
fn restore_world(ctx: &mut TaskContext) -> Result<Option<SlotInfo>, PersistError> {
    ctx.world.apply_world(&ctx.data.world);

    for region in ctx.world.streaming_regions() {
        if !ctx.world.is_region_visible(&region) {
            continue;
        }
        if let Some(bytes) = ctx.data.regions.get(&region) {
            ctx.world
                .deserialize_region(&region, bytes)
                .map_err(|reason| PersistError::Region {
                    region: region.clone(),
                    reason,
                })?;
        }
    }

    Ok(Some(ctx.info.clone()))
}

fn spawn_read(store: Arc<dyn BlobStore>, slot: i32) -> Task<Result<LoadedSlot, PersistError>> {
    let task_pool = IoTaskPool::get_or_init(TaskPool::new);
    task_pool.spawn(async move { read_slot(store.as_ref(), slot) })
}

fn read_slot(store: &dyn BlobStore, slot: i32) -> Result<LoadedSlot, PersistError> {
    let info = SlotInfo::from_bytes(&store.load(&slot_info_name(slot))?)?;
    let data = SlotData::from_bytes(&store.load(&slot_data_name(slot))?)?;
    Ok((info, data))
}
