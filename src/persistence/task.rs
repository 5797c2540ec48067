//! Slot task state machine shared by every operation kind.

use bevy::prelude::*;
use bevy::tasks::Task;
use futures_lite::future;
use std::sync::Arc;

use crate::config::SavePreset;
use crate::error::PersistError;
use crate::slot::{SlotData, SlotInfo};
use crate::store::BlobStore;
use crate::world::{ScreenshotCapture, ScreenshotSize, WorldContext};

use super::loader::LoadOp;
use super::region::RegionOp;
use super::saver::SaveOp;

/// Outcome delivered to a task's callback. Save and load tasks carry the slot
/// info they wrote or read; region tasks carry `None`.
pub type TaskResult = Result<Option<SlotInfo>, PersistError>;

/// Completion callback bound to a task
pub type TaskCallback = Box<dyn FnOnce(&TaskResult) + Send + Sync>;

/// Identifier of a task within one manager
pub type TaskId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    NotStarted,
    /// Admitted to the queue, waiting to become head
    Scheduled,
    Running,
    /// Running, but parked on an external signal (map transition)
    Awaiting,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }

    /// Awaiting counts as running from the caller's point of view
    pub fn is_running(self) -> bool {
        matches!(self, TaskState::Running | TaskState::Awaiting)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Save,
    Load,
    SerializeRegion,
    DeserializeRegion,
}

/// How background handles are resolved while driving a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Drive {
    /// Check once and report pending (normal frames)
    Poll,
    /// Block until the handle resolves (shutdown only)
    Block,
}

/// What a step of an operation produced
pub(crate) enum Progress {
    Pending,
    /// Parked until an external signal arrives
    Awaiting,
    Done(TaskResult),
}

/// State lent to the running task for the duration of one call.
pub(crate) struct TaskContext<'a> {
    pub preset: &'a SavePreset,
    pub store: &'a Arc<dyn BlobStore>,
    pub world: &'a mut dyn WorldContext,
    pub screenshots: Option<&'a dyn ScreenshotCapture>,
    pub info: &'a mut SlotInfo,
    pub data: &'a mut SlotData,
    pub drive: Drive,
}

impl TaskContext<'_> {
    pub fn poll<T>(&self, task: &mut Task<T>) -> Option<T> {
        match self.drive {
            Drive::Poll => future::block_on(future::poll_once(task)),
            Drive::Block => Some(future::block_on(task)),
        }
    }

    /// Whether background handles are being waited on (shutdown flush)
    pub fn is_blocking(&self) -> bool {
        self.drive == Drive::Block
    }

    pub fn slot_exists(&self, slot: i32) -> bool {
        super::slot_exists(self.store.as_ref(), slot)
    }
}

pub(crate) enum TaskOp {
    Save(SaveOp),
    Load(LoadOp),
    SerializeRegion(RegionOp),
    DeserializeRegion(RegionOp),
}

/// One queued unit of work.
pub struct SlotTask {
    id: TaskId,
    op: TaskOp,
    state: TaskState,
    callback: Option<TaskCallback>,
    outcome: Option<TaskResult>,
}

impl SlotTask {
    fn new(op: TaskOp) -> Self {
        Self {
            id: 0,
            op,
            state: TaskState::NotStarted,
            callback: None,
            outcome: None,
        }
    }

    /// Configure a save task. Fails fast on parameters that can never succeed.
    pub fn save(
        preset: &SavePreset,
        slot: i32,
        overwrite: bool,
        screenshot: Option<ScreenshotSize>,
    ) -> Result<Self, PersistError> {
        if !preset.is_valid_slot(slot) {
            return Err(PersistError::InvalidSlot(slot));
        }
        if let Some(size) = screenshot
            && (size.width == 0 || size.height == 0)
        {
            return Err(PersistError::InvalidParameters(format!(
                "screenshot size {}x{}",
                size.width, size.height
            )));
        }
        Ok(Self::new(TaskOp::Save(SaveOp::new(slot, overwrite, screenshot))))
    }

    pub fn load(preset: &SavePreset, slot: i32) -> Result<Self, PersistError> {
        if !preset.is_valid_slot(slot) {
            return Err(PersistError::InvalidSlot(slot));
        }
        Ok(Self::new(TaskOp::Load(LoadOp::new(slot))))
    }

    pub fn serialize_region(region: &str) -> Result<Self, PersistError> {
        Ok(Self::new(TaskOp::SerializeRegion(RegionOp::new(region)?)))
    }

    pub fn deserialize_region(region: &str) -> Result<Self, PersistError> {
        Ok(Self::new(TaskOp::DeserializeRegion(RegionOp::new(region)?)))
    }

    /// Attach the completion callback. Binding again replaces the previous one.
    pub fn bind(mut self, callback: impl FnOnce(&TaskResult) + Send + Sync + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn kind(&self) -> TaskKind {
        match self.op {
            TaskOp::Save(_) => TaskKind::Save,
            TaskOp::Load(_) => TaskKind::Load,
            TaskOp::SerializeRegion(_) => TaskKind::SerializeRegion,
            TaskOp::DeserializeRegion(_) => TaskKind::DeserializeRegion,
        }
    }

    /// Slot targeted by a save or load task
    pub fn slot(&self) -> Option<i32> {
        match &self.op {
            TaskOp::Save(op) => Some(op.slot()),
            TaskOp::Load(op) => Some(op.slot()),
            TaskOp::SerializeRegion(_) | TaskOp::DeserializeRegion(_) => None,
        }
    }

    pub fn outcome(&self) -> Option<&TaskResult> {
        self.outcome.as_ref()
    }

    pub(crate) fn take_outcome(&mut self) -> Option<TaskResult> {
        self.outcome.take()
    }

    pub(crate) fn assign_id(&mut self, id: TaskId) {
        self.id = id;
    }

    /// Whether the task is a loader parked on a map transition
    pub fn is_awaiting_map(&self) -> bool {
        self.state == TaskState::Awaiting
            && matches!(&self.op, TaskOp::Load(op) if op.is_awaiting_map())
    }

    /// Admission: `NotStarted -> Scheduled`
    pub(crate) fn schedule(&mut self) {
        if self.state != TaskState::NotStarted {
            warn!("Task {} scheduled twice (state {:?})", self.id, self.state);
            return;
        }
        self.state = TaskState::Scheduled;
    }

    /// Head of queue: `Scheduled -> Running` plus the synchronous preamble
    pub(crate) fn begin(&mut self, ctx: &mut TaskContext) {
        if self.state != TaskState::Scheduled {
            warn!("Task {} started from state {:?}", self.id, self.state);
            return;
        }
        self.state = TaskState::Running;

        let progress = match &mut self.op {
            TaskOp::Save(op) => op.begin(ctx),
            TaskOp::Load(op) => op.begin(ctx),
            TaskOp::SerializeRegion(op) => op.serialize(ctx),
            TaskOp::DeserializeRegion(op) => op.deserialize(ctx),
        };
        self.apply(progress);
    }

    pub(crate) fn tick(&mut self, ctx: &mut TaskContext, _delta: f32) {
        if self.state != TaskState::Running {
            return;
        }

        let progress = match &mut self.op {
            TaskOp::Save(op) => op.tick(ctx),
            TaskOp::Load(op) => op.tick(ctx),
            // Region work completes inside begin()
            TaskOp::SerializeRegion(_) | TaskOp::DeserializeRegion(_) => Progress::Pending,
        };
        self.apply(progress);
    }

    /// External notification that the awaited map finished loading
    pub(crate) fn on_map_loaded(&mut self) {
        if let TaskOp::Load(op) = &mut self.op
            && self.state == TaskState::Awaiting
        {
            op.on_map_loaded();
            self.state = TaskState::Running;
        }
    }

    /// Cut a task short (shutdown). No-op on terminal tasks.
    pub(crate) fn interrupt(&mut self) {
        if !self.state.is_terminal() {
            self.finish(Err(PersistError::Interrupted));
        }
    }

    fn apply(&mut self, progress: Progress) {
        match progress {
            Progress::Pending => {}
            Progress::Awaiting => self.state = TaskState::Awaiting,
            Progress::Done(result) => self.finish(result),
        }
    }

    /// Enter the terminal state and fire the callback exactly once
    fn finish(&mut self, result: TaskResult) {
        if self.state.is_terminal() {
            return;
        }

        self.state = if result.is_ok() {
            TaskState::Succeeded
        } else {
            TaskState::Failed
        };

        if let Some(callback) = self.callback.take() {
            callback(&result);
        }
        self.outcome = Some(result);
    }
}
