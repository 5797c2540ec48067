//! Streaming region tasks and the notifiers that enqueue them.

use crate::error::PersistError;
use crate::world::WorldContext;

use super::task::{Progress, TaskContext};

pub(crate) struct RegionOp {
    region: String,
}

impl RegionOp {
    pub fn new(region: &str) -> Result<Self, PersistError> {
        if region.is_empty() {
            return Err(PersistError::InvalidParameters(
                "empty region id".to_string(),
            ));
        }
        Ok(Self {
            region: region.to_string(),
        })
    }

    /// Region is unloading: store its state in the current slot data
    pub fn serialize(&self, ctx: &mut TaskContext) -> Progress {
        match ctx.world.serialize_region(&self.region) {
            Ok(bytes) => {
                ctx.data.regions.insert(self.region.clone(), bytes);
                Progress::Done(Ok(None))
            }
            Err(reason) => Progress::Done(Err(self.error(reason))),
        }
    }

    /// Region became visible: restore it from the current slot data, if any
    pub fn deserialize(&self, ctx: &mut TaskContext) -> Progress {
        let Some(bytes) = ctx.data.regions.get(&self.region) else {
            return Progress::Done(Ok(None));
        };
        match ctx.world.deserialize_region(&self.region, bytes) {
            Ok(()) => Progress::Done(Ok(None)),
            Err(reason) => Progress::Done(Err(self.error(reason))),
        }
    }

    fn error(&self, reason: String) -> PersistError {
        PersistError::Region {
            region: self.region.clone(),
            reason,
        }
    }
}

/// Visibility change detected by a [`RegionNotifier`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionTransition {
    Shown,
    Hidden,
}

/// Watches one streaming region for show/hide transitions.
#[derive(Debug, Clone)]
pub struct RegionNotifier {
    region: String,
    visible: bool,
}

impl RegionNotifier {
    pub fn new(region: String, world: &dyn WorldContext) -> Self {
        let visible = world.is_region_visible(&region);
        Self { region, visible }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Compare with the world's current visibility, reporting any change
    pub fn poll(&mut self, world: &dyn WorldContext) -> Option<RegionTransition> {
        let visible = world.is_region_visible(&self.region);
        if visible == self.visible {
            return None;
        }
        self.visible = visible;
        Some(if visible {
            RegionTransition::Shown
        } else {
            RegionTransition::Hidden
        })
    }
}
