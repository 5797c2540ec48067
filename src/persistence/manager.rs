//! The save manager: single-flight task queue over the current slot.

use bevy::prelude::*;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::SavePreset;
use crate::slot::{SlotData, SlotInfo, SlotTemplates, slot_data_name, slot_info_name};
use crate::store::BlobStore;
use crate::world::{ScreenshotCapture, ScreenshotSize, WorldContext};

use super::infos::{LoadInfosJob, read_slot_info};
use super::observers::{LifecycleEvent, SaveObserver, Subscribers};
use super::region::{RegionNotifier, RegionTransition};
use super::task::{Drive, SlotTask, TaskContext, TaskId, TaskKind, TaskResult, TaskState};

/// Broadcast produced when a save or load completes successfully
#[derive(Debug, Clone, PartialEq)]
pub enum PersistenceEvent {
    GameSaved(SlotInfo),
    GameLoaded(SlotInfo),
}

/// Result of deleting both blobs of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Both blobs were removed
    Deleted,
    /// Only one of the two blobs could be removed
    Partial,
    NotFound,
}

/// Owns the current slot and runs save, load and region tasks one at a time.
///
/// Requests are appended to a FIFO queue. Only the head of the queue ever
/// runs; it is started as soon as it reaches the front and advanced by
/// [`SaveManager::tick`], which the plugin calls once per frame. Blob I/O and
/// slot enumeration happen on Bevy's task pools and are polled, never awaited.
#[derive(Resource)]
pub struct SaveManager {
    preset: SavePreset,
    templates: SlotTemplates,
    store: Arc<dyn BlobStore>,
    world: Box<dyn WorldContext>,
    screenshots: Option<Box<dyn ScreenshotCapture>>,

    current_info: SlotInfo,
    current_data: SlotData,
    in_slot: bool,

    tasks: VecDeque<SlotTask>,
    next_task_id: TaskId,
    last_completed: Option<(TaskId, bool)>,
    max_running: usize,

    info_jobs: Vec<LoadInfosJob>,
    subscribers: Subscribers,
    region_notifiers: Vec<RegionNotifier>,
    events: Vec<PersistenceEvent>,

    initialized: bool,
    shut_down: bool,
}

impl SaveManager {
    pub fn new(
        preset: SavePreset,
        store: Arc<dyn BlobStore>,
        world: impl WorldContext + 'static,
    ) -> Self {
        Self {
            preset,
            templates: SlotTemplates::default(),
            store,
            world: Box::new(world),
            screenshots: None,
            current_info: SlotInfo::default(),
            current_data: SlotData::default(),
            in_slot: false,
            tasks: VecDeque::new(),
            next_task_id: 1,
            last_completed: None,
            max_running: 0,
            info_jobs: Vec::new(),
            subscribers: Subscribers::default(),
            region_notifiers: Vec::new(),
            events: Vec::new(),
            initialized: false,
            shut_down: false,
        }
    }

    pub fn with_screenshots(mut self, capture: impl ScreenshotCapture + 'static) -> Self {
        self.screenshots = Some(Box::new(capture));
        self
    }

    pub fn with_templates(mut self, templates: SlotTemplates) -> Self {
        self.templates = templates;
        self
    }

    /// First-use setup: fresh slot from templates, optional auto-load,
    /// region notifiers for the active map.
    pub fn init(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;

        self.try_instantiate_info(false);
        self.update_region_notifiers();

        if self.preset.auto_load && !self.reload_current_slot() {
            debug!("Auto-load skipped, slot {} is not saved", self.current_info.id);
        }
    }

    /// Replace the current info and data with fresh template instances.
    /// Does nothing while a saved slot is loaded unless `forced`.
    pub fn try_instantiate_info(&mut self, forced: bool) {
        if self.in_slot && !forced {
            return;
        }
        self.current_info = self
            .templates
            .instantiate_info(self.preset.slot_info_template.as_deref());
        self.current_data = self
            .templates
            .instantiate_data(self.preset.slot_data_template.as_deref());
        self.in_slot = false;
    }

    /// Finish outstanding work before the manager goes away.
    ///
    /// Queued tasks are driven to completion with blocking polls; a loader
    /// parked on a map transition is interrupted. With `save_on_exit` the
    /// current slot is then saved, unless a load was interrupted, since the
    /// current slot no longer matches the live world. Enumeration jobs are
    /// waited for but their callbacks never fire.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }

        let interrupted_load = self.flush();
        if self.preset.save_on_exit {
            if interrupted_load {
                warn!(
                    "Skipping save on exit, slot {} was still loading",
                    self.current_info.id
                );
            } else if self.save_current_slot(None) {
                self.flush();
            } else {
                warn!("Save on exit was rejected");
            }
        }

        self.region_notifiers.clear();
        for job in self.info_jobs.drain(..) {
            job.force_completion();
        }
        self.shut_down = true;

        if self.preset.logging_enabled {
            info!("Save manager shut down");
        }
    }

    /// Queue a save of the current world into `slot`.
    ///
    /// Returns false, without creating a task, when the request can never
    /// succeed. Also returns false when the task failed in its synchronous
    /// preamble; `on_done` has then already been called.
    pub fn request_save(
        &mut self,
        slot: i32,
        overwrite: bool,
        screenshot: Option<ScreenshotSize>,
        on_done: impl FnOnce(&TaskResult) + Send + Sync + 'static,
    ) -> bool {
        if !self.can_mutate() {
            warn!("Cannot save slot {}: no authority or valid world", slot);
            return false;
        }
        if !overwrite && self.is_slot_saved(slot) {
            warn!("Slot {} already exists, not overwriting", slot);
            return false;
        }

        match SlotTask::save(&self.preset, slot, overwrite, screenshot) {
            Ok(task) => self.admit(task.bind(on_done)),
            Err(e) => {
                warn!("Rejected save request: {}", e);
                false
            }
        }
    }

    /// Queue a load of `slot`, replacing the current slot on success.
    ///
    /// The slot must be saved, or about to be saved by a task already queued.
    pub fn request_load(
        &mut self,
        slot: i32,
        on_done: impl FnOnce(&TaskResult) + Send + Sync + 'static,
    ) -> bool {
        if !self.can_mutate() {
            warn!("Cannot load slot {}: no authority or valid world", slot);
            return false;
        }
        let known = self.is_slot_saved(slot) || self.has_pending_save(slot);
        if self.preset.is_valid_slot(slot) && !known {
            warn!("Slot {} is not saved, nothing to load", slot);
            return false;
        }

        match SlotTask::load(&self.preset, slot) {
            Ok(task) => self.admit(task.bind(on_done)),
            Err(e) => {
                warn!("Rejected load request: {}", e);
                false
            }
        }
    }

    /// Save the current slot in place
    pub fn save_current_slot(&mut self, screenshot: Option<ScreenshotSize>) -> bool {
        let slot = self.current_info.id;
        self.request_save(slot, true, screenshot, |_| {})
    }

    /// Reload the current slot from disk
    pub fn reload_current_slot(&mut self) -> bool {
        let slot = self.current_info.id;
        self.request_load(slot, |_| {})
    }

    /// Delete both blobs of `slot`; true if either was removed
    pub fn delete_slot(&mut self, slot: i32) -> bool {
        self.delete_slot_outcome(slot) != DeleteOutcome::NotFound
    }

    pub fn delete_slot_outcome(&mut self, slot: i32) -> DeleteOutcome {
        if !self.preset.is_valid_slot(slot) {
            warn!("Cannot delete slot {}: outside the configured range", slot);
            return DeleteOutcome::NotFound;
        }

        let info_deleted = self.store.delete(&slot_info_name(slot)).is_ok();
        let data_deleted = self.store.delete(&slot_data_name(slot)).is_ok();

        let outcome = match (info_deleted, data_deleted) {
            (true, true) => DeleteOutcome::Deleted,
            (false, false) => DeleteOutcome::NotFound,
            _ => DeleteOutcome::Partial,
        };
        match outcome {
            DeleteOutcome::Deleted if self.preset.logging_enabled => {
                info!("Deleted slot {}", slot);
            }
            DeleteOutcome::Partial => warn!("Slot {} was only partially deleted", slot),
            _ => {}
        }
        outcome
    }

    /// Whether both blobs of `slot` exist
    pub fn is_slot_saved(&self, slot: i32) -> bool {
        self.preset.is_valid_slot(slot) && super::slot_exists(self.store.as_ref(), slot)
    }

    /// Enumerate saved slots in the background. `on_done` runs on the main
    /// loop from a later [`SaveManager::tick`].
    pub fn load_slot_infos(
        &mut self,
        sort_by_recent: bool,
        on_done: impl FnOnce(Vec<SlotInfo>) + Send + Sync + 'static,
    ) {
        self.info_jobs.push(LoadInfosJob::spawn(
            self.store.clone(),
            self.preset.max_slots,
            sort_by_recent,
            Box::new(on_done),
        ));
    }

    /// Read the metadata of one slot synchronously
    pub fn load_info(&self, slot: i32) -> Option<SlotInfo> {
        if !self.is_slot_saved(slot) {
            return None;
        }
        read_slot_info(self.store.as_ref(), slot)
            .inspect_err(|e| warn!("Failed to read slot {} info: {}", slot, e))
            .ok()
    }

    /// Read the data blob belonging to `info` synchronously
    pub fn load_data(&self, info: &SlotInfo) -> Option<SlotData> {
        if !self.is_slot_saved(info.id) {
            return None;
        }
        let bytes = self
            .store
            .load(&slot_data_name(info.id))
            .inspect_err(|e| warn!("Failed to read slot {} data: {}", info.id, e))
            .ok()?;
        SlotData::from_bytes(&bytes)
            .inspect_err(|e| warn!("Failed to decode slot {} data: {}", info.id, e))
            .ok()
    }

    pub fn subscribe<O: SaveObserver + 'static>(&mut self, observer: &Arc<O>) -> bool {
        self.subscribers.subscribe(observer)
    }

    pub fn subscribe_dyn(&mut self, observer: &Arc<dyn SaveObserver>) -> bool {
        self.subscribers.subscribe_dyn(observer)
    }

    pub fn unsubscribe<O: SaveObserver + ?Sized>(&mut self, observer: &Arc<O>) -> bool {
        self.subscribers.unsubscribe(observer)
    }

    /// Advance the manager by one frame
    pub fn tick(&mut self, delta: f32) {
        if self.shut_down {
            return;
        }
        self.current_info.played_time += f64::from(delta);

        self.poll_region_notifiers();

        self.pump(Drive::Poll);
        self.with_head(Drive::Poll, |task, ctx| task.tick(ctx, delta));
        self.pump(Drive::Poll);

        self.info_jobs.retain_mut(|job| !job.poll());
    }

    pub fn on_map_load_started(&mut self, map: &str) {
        if self.preset.logging_enabled {
            info!("Map '{}' is loading", map);
        }
    }

    /// The host finished loading a map. Resumes a loader waiting on it and
    /// rebuilds the region notifiers for the new map.
    pub fn on_map_load_finished(&mut self) {
        if let Some(head) = self.tasks.front_mut()
            && head.is_awaiting_map()
        {
            head.on_map_loaded();
        }
        self.update_region_notifiers();
    }

    /// Take the broadcasts produced since the last call
    pub fn drain_events(&mut self) -> Vec<PersistenceEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn preset(&self) -> &SavePreset {
        &self.preset
    }

    pub fn current_info(&self) -> &SlotInfo {
        &self.current_info
    }

    /// Display fields (name, subname) of the slot that will be saved next
    pub fn current_info_mut(&mut self) -> &mut SlotInfo {
        &mut self.current_info
    }

    pub fn current_data(&self) -> &SlotData {
        &self.current_data
    }

    /// Whether the current slot was loaded from or written to storage
    pub fn is_in_slot(&self) -> bool {
        self.in_slot
    }

    pub fn is_busy(&self) -> bool {
        !self.tasks.is_empty()
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_loading_infos(&self) -> bool {
        !self.info_jobs.is_empty()
    }

    /// Highest number of simultaneously running tasks ever observed
    pub fn max_concurrent_running(&self) -> usize {
        self.max_running
    }

    pub fn world(&self) -> &dyn WorldContext {
        &*self.world
    }

    pub fn world_mut(&mut self) -> &mut dyn WorldContext {
        &mut *self.world
    }

    fn can_mutate(&self) -> bool {
        !self.shut_down && self.world.is_valid() && self.world.has_authority()
    }

    fn has_pending_save(&self, slot: i32) -> bool {
        self.tasks
            .iter()
            .any(|task| task.kind() == TaskKind::Save && task.slot() == Some(slot))
    }

    /// Append a configured task; it starts right away when the queue was idle.
    /// Returns false if the task already failed.
    fn admit(&mut self, mut task: SlotTask) -> bool {
        let id = self.next_task_id;
        self.next_task_id += 1;

        task.assign_id(id);
        task.schedule();
        self.tasks.push_back(task);

        if self.tasks.len() == 1 {
            self.pump(Drive::Poll);
        }
        self.last_completed != Some((id, false))
    }

    /// Start the head when it is scheduled and retire it when it is done,
    /// until the head is a task still in flight or the queue is empty.
    fn pump(&mut self, drive: Drive) {
        while let Some(head) = self.tasks.front() {
            let state = head.state();
            if state == TaskState::Scheduled {
                match head.kind() {
                    TaskKind::Save => self.subscribers.notify(LifecycleEvent::SaveBegan),
                    TaskKind::Load => self.subscribers.notify(LifecycleEvent::LoadBegan),
                    TaskKind::SerializeRegion | TaskKind::DeserializeRegion => {}
                }
                self.with_head(drive, |task, ctx| task.begin(ctx));
            } else if state.is_terminal() {
                if let Some(task) = self.tasks.pop_front() {
                    self.complete(task);
                }
            } else {
                break;
            }
        }
    }

    /// Lend the current slot and collaborators to the head task
    fn with_head(&mut self, drive: Drive, step: impl FnOnce(&mut SlotTask, &mut TaskContext)) {
        let Self {
            preset,
            store,
            world,
            screenshots,
            current_info,
            current_data,
            tasks,
            ..
        } = self;
        let Some(head) = tasks.front_mut() else {
            return;
        };

        let mut ctx = TaskContext {
            preset,
            store,
            world: &mut **world,
            screenshots: screenshots.as_deref(),
            info: current_info,
            data: current_data,
            drive,
        };
        step(head, &mut ctx);

        let running = self.tasks.iter().filter(|t| t.state().is_running()).count();
        self.max_running = self.max_running.max(running);
    }

    fn complete(&mut self, mut task: SlotTask) {
        let Some(result) = task.take_outcome() else {
            return;
        };
        let failed = result.is_err();
        self.last_completed = Some((task.id(), !failed));

        match (task.kind(), result) {
            (TaskKind::Save, result) => {
                match result {
                    Ok(Some(info)) => {
                        self.in_slot = true;
                        if self.preset.logging_enabled {
                            info!("Saved slot {}", info.id);
                        }
                        self.events.push(PersistenceEvent::GameSaved(info));
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Saving slot {:?} failed: {}", task.slot(), e),
                }
                self.subscribers
                    .notify(LifecycleEvent::SaveFinished { error: failed });
            }
            (TaskKind::Load, result) => {
                match result {
                    Ok(Some(info)) => {
                        self.in_slot = true;
                        if self.preset.logging_enabled {
                            info!("Loaded slot {}", info.id);
                        }
                        self.events.push(PersistenceEvent::GameLoaded(info));
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Loading slot {:?} failed: {}", task.slot(), e),
                }
                self.subscribers
                    .notify(LifecycleEvent::LoadFinished { error: failed });
            }
            (TaskKind::SerializeRegion | TaskKind::DeserializeRegion, Err(e)) => {
                warn!("Region task failed: {}", e);
            }
            (TaskKind::SerializeRegion | TaskKind::DeserializeRegion, Ok(_)) => {}
        }
    }

    /// Drive every queued task to a terminal state with blocking polls.
    /// Returns true if a loader had to be interrupted.
    fn flush(&mut self) -> bool {
        let mut interrupted_load = false;
        while !self.tasks.is_empty() {
            self.pump(Drive::Block);

            let Some(head) = self.tasks.front_mut() else {
                break;
            };
            if head.state() == TaskState::Awaiting {
                warn!("Interrupting task {} waiting on a map transition", head.id());
                interrupted_load |= head.kind() == TaskKind::Load;
                head.interrupt();
                continue;
            }
            self.with_head(Drive::Block, |task, ctx| task.tick(ctx, 0.0));
        }
        interrupted_load
    }

    fn update_region_notifiers(&mut self) {
        let world = &*self.world;
        self.region_notifiers = world
            .streaming_regions()
            .into_iter()
            .map(|region| RegionNotifier::new(region, world))
            .collect();
    }

    /// Turn region visibility changes into region tasks
    fn poll_region_notifiers(&mut self) {
        let world = &*self.world;
        let transitions: Vec<(String, RegionTransition)> = self
            .region_notifiers
            .iter_mut()
            .filter_map(|notifier| {
                notifier
                    .poll(world)
                    .map(|transition| (notifier.region().to_string(), transition))
            })
            .collect();

        for (region, transition) in transitions {
            let task = match transition {
                RegionTransition::Hidden => SlotTask::serialize_region(&region),
                RegionTransition::Shown => SlotTask::deserialize_region(&region),
            };
            match task {
                Ok(task) => {
                    self.admit(task);
                }
                Err(e) => warn!("Ignoring region '{}': {}", region, e),
            }
        }
    }
}

impl Drop for SaveManager {
    fn drop(&mut self) {
        for job in self.info_jobs.drain(..) {
            job.force_completion();
        }
    }
}
