//! Message types for slot persistence.

use bevy::prelude::*;

use crate::slot::SlotInfo;
use crate::world::ScreenshotSize;

#[derive(Message)]
pub struct SaveSlotRequest {
    pub slot: i32,
    pub overwrite: bool,
    pub screenshot: Option<ScreenshotSize>,
}

#[derive(Message)]
pub struct LoadSlotRequest {
    pub slot: i32,
}

#[derive(Message)]
pub struct DeleteSlotRequest {
    pub slot: i32,
}

#[derive(Message)]
pub struct LoadSlotInfosRequest {
    pub sort_by_recent: bool,
}

/// Sent by the host when it starts travelling to a map
#[derive(Message)]
pub struct MapLoadStarted {
    pub map: String,
}

/// Sent by the host once the map it travelled to is fully loaded
#[derive(Message)]
pub struct MapLoadFinished;

#[derive(Message, Clone)]
pub struct GameSaved {
    pub info: SlotInfo,
}

#[derive(Message, Clone)]
pub struct GameLoaded {
    pub info: SlotInfo,
}

/// Result of a [`LoadSlotInfosRequest`]
#[derive(Message, Clone)]
pub struct SlotInfosLoaded {
    pub infos: Vec<SlotInfo>,
    pub sort_by_recent: bool,
}
