//! Save task: screenshot, world capture and background blob writes.

use bevy::prelude::*;
use bevy::tasks::{IoTaskPool, Task, TaskPool};
use chrono::Utc;
use std::sync::Arc;

use crate::constants::SAVE_FORMAT_VERSION;
use crate::error::PersistError;
use crate::slot::{SlotInfo, slot_data_name, slot_info_name};
use crate::store::BlobStore;
use crate::world::ScreenshotSize;

use super::task::{Progress, TaskContext};

enum SaveStep {
    Idle,
    Screenshot(Task<Result<String, String>>),
    Capture { screenshot: Option<String> },
    Writing {
        info: SlotInfo,
        task: Task<Result<(), PersistError>>,
    },
    Done,
}

pub(crate) struct SaveOp {
    slot: i32,
    overwrite: bool,
    screenshot: Option<ScreenshotSize>,
    step: SaveStep,
}

impl SaveOp {
    pub fn new(slot: i32, overwrite: bool, screenshot: Option<ScreenshotSize>) -> Self {
        Self {
            slot,
            overwrite,
            screenshot,
            step: SaveStep::Idle,
        }
    }

    pub fn slot(&self) -> i32 {
        self.slot
    }

    pub fn begin(&mut self, ctx: &mut TaskContext) -> Progress {
        if !ctx.preset.is_valid_slot(self.slot) {
            return Progress::Done(Err(PersistError::InvalidSlot(self.slot)));
        }

        // The slot may have been written by a task queued ahead of us
        if !self.overwrite && ctx.slot_exists(self.slot) {
            warn!("Slot {} already exists, not overwriting", self.slot);
            return Progress::Done(Err(PersistError::OverwriteDenied(self.slot)));
        }

        self.step = match (self.screenshot, ctx.screenshots) {
            (Some(size), Some(capture)) => SaveStep::Screenshot(capture.request(self.slot, size)),
            (Some(_), None) => {
                warn!("Screenshot requested but no capture utility is registered");
                SaveStep::Capture { screenshot: None }
            }
            (None, _) => SaveStep::Capture { screenshot: None },
        };
        Progress::Pending
    }

    pub fn tick(&mut self, ctx: &mut TaskContext) -> Progress {
        match std::mem::replace(&mut self.step, SaveStep::Done) {
            SaveStep::Screenshot(task) if ctx.is_blocking() && !task.is_finished() => {
                // Capture needs rendered frames, which stop once we flush on exit
                warn!("Dropping unfinished screenshot for slot {}", self.slot);
                self.step = SaveStep::Capture { screenshot: None };
                Progress::Pending
            }
            SaveStep::Screenshot(mut task) => {
                let screenshot = match ctx.poll(&mut task) {
                    None => {
                        self.step = SaveStep::Screenshot(task);
                        return Progress::Pending;
                    }
                    Some(Ok(reference)) => Some(reference),
                    Some(Err(e)) => {
                        // A missing thumbnail never fails the save itself
                        warn!("Screenshot for slot {} failed: {}", self.slot, e);
                        None
                    }
                };
                self.step = SaveStep::Capture { screenshot };
                Progress::Pending
            }
            SaveStep::Capture { screenshot } => match self.capture_and_write(ctx, screenshot) {
                Ok((info, task)) => {
                    self.step = SaveStep::Writing { info, task };
                    Progress::Pending
                }
                Err(e) => Progress::Done(Err(e)),
            },
            SaveStep::Writing { info, mut task } => match ctx.poll(&mut task) {
                None => {
                    self.step = SaveStep::Writing { info, task };
                    Progress::Pending
                }
                Some(Ok(())) => {
                    *ctx.info = info.clone();
                    Progress::Done(Ok(Some(info)))
                }
                Some(Err(e)) => Progress::Done(Err(e)),
            },
            SaveStep::Idle | SaveStep::Done => Progress::Pending,
        }
    }

    /// Refresh the current slot data from the world, build the slot info and
    /// hand both encoded blobs to the I/O pool.
    fn capture_and_write(
        &self,
        ctx: &mut TaskContext,
        screenshot: Option<String>,
    ) -> Result<(SlotInfo, Task<Result<(), PersistError>>), PersistError> {
        let map = ctx.world.current_map();

        ctx.data.map = map.clone();
        ctx.data.world = ctx.world.capture_world();

        // Visible regions hold live state; hidden ones already have a payload
        for region in ctx.world.streaming_regions() {
            if !ctx.world.is_region_visible(&region) {
                continue;
            }
            let bytes = ctx
                .world
                .serialize_region(&region)
                .map_err(|reason| PersistError::Region {
                    region: region.clone(),
                    reason,
                })?;
            ctx.data.regions.insert(region, bytes);
        }

        let info = SlotInfo {
            id: self.slot,
            name: ctx.info.name.clone(),
            subname: ctx.info.subname.clone(),
            saved_at: Utc::now(),
            played_time: ctx.info.played_time,
            map,
            screenshot,
            version: SAVE_FORMAT_VERSION.to_string(),
            template: ctx.info.template.clone(),
        };

        let info_bytes = info.to_bytes()?;
        let data_bytes = ctx.data.to_bytes()?;
        let task = spawn_write(ctx.store.clone(), self.slot, info_bytes, data_bytes);

        Ok((info, task))
    }
}

fn spawn_write(
    store: Arc<dyn BlobStore>,
    slot: i32,
    info_bytes: Vec<u8>,
    data_bytes: Vec<u8>,
) -> Task<Result<(), PersistError>> {
    let task_pool = IoTaskPool::get_or_init(TaskPool::new);
    task_pool.spawn(async move { write_slot(store.as_ref(), slot, &info_bytes, &data_bytes) })
}

fn write_slot(
    store: &dyn BlobStore,
    slot: i32,
    info_bytes: &[u8],
    data_bytes: &[u8],
) -> Result<(), PersistError> {
    // Data first: an info blob on disk implies its data blob is complete
    store.save(&slot_data_name(slot), data_bytes)?;
    store.save(&slot_info_name(slot), info_bytes)?;
    Ok(())
}
