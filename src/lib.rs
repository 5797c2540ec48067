//! Slot based save/load orchestration for Bevy games.
//!
//! The host game implements [`world::WorldContext`], inserts a
//! [`persistence::SaveManager`] resource and adds [`SaveForgedPlugin`]. Saves,
//! loads, deletions and slot listings are then requested with messages.

pub mod config;
pub mod constants;
pub mod error;
pub mod paths;
pub mod persistence;
pub mod slot;
pub mod store;
pub mod world;

use bevy::prelude::*;

use persistence::{
    DeleteSlotRequest, GameLoaded, GameSaved, LoadSlotInfosRequest, LoadSlotRequest,
    MapLoadFinished, MapLoadStarted, SaveManager, SaveSlotRequest, SlotInfoInbox,
    SlotInfosLoaded,
};

pub struct SaveForgedPlugin;

impl Plugin for SaveForgedPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SlotInfoInbox>()
            .add_message::<SaveSlotRequest>()
            .add_message::<LoadSlotRequest>()
            .add_message::<DeleteSlotRequest>()
            .add_message::<LoadSlotInfosRequest>()
            .add_message::<MapLoadStarted>()
            .add_message::<MapLoadFinished>()
            .add_message::<GameSaved>()
            .add_message::<GameLoaded>()
            .add_message::<SlotInfosLoaded>()
            .add_systems(
                Startup,
                persistence::init_save_manager.run_if(resource_exists::<SaveManager>),
            )
            .add_systems(
                Update,
                (
                    persistence::handle_map_messages,
                    persistence::handle_save_requests.run_if(on_message::<SaveSlotRequest>),
                    persistence::handle_load_requests.run_if(on_message::<LoadSlotRequest>),
                    persistence::handle_delete_requests.run_if(on_message::<DeleteSlotRequest>),
                    persistence::handle_slot_info_requests
                        .run_if(on_message::<LoadSlotInfosRequest>),
                    persistence::tick_save_manager,
                    persistence::forward_persistence_events,
                    persistence::forward_slot_infos,
                )
                    .chain()
                    .run_if(resource_exists::<SaveManager>),
            )
            .add_systems(
                Last,
                persistence::shutdown_on_exit.run_if(resource_exists::<SaveManager>),
            );
    }
}
