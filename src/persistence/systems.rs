//! Bevy systems bridging messages to the [`SaveManager`] resource.

use bevy::prelude::*;
use std::sync::{Arc, Mutex, PoisonError};

use super::manager::{PersistenceEvent, SaveManager};
use super::messages::{
    DeleteSlotRequest, GameLoaded, GameSaved, LoadSlotInfosRequest, LoadSlotRequest,
    MapLoadFinished, MapLoadStarted, SaveSlotRequest, SlotInfosLoaded,
};

/// Slot listings finished by the enumerator, waiting to be sent as messages
#[derive(Resource, Default, Clone)]
pub struct SlotInfoInbox(Arc<Mutex<Vec<SlotInfosLoaded>>>);

impl SlotInfoInbox {
    fn push(&self, loaded: SlotInfosLoaded) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(loaded);
    }

    fn drain(&self) -> Vec<SlotInfosLoaded> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

pub fn init_save_manager(mut manager: ResMut<SaveManager>) {
    manager.init();
}

pub fn handle_save_requests(
    mut events: MessageReader<SaveSlotRequest>,
    mut manager: ResMut<SaveManager>,
) {
    for event in events.read() {
        if !manager.request_save(event.slot, event.overwrite, event.screenshot, |_| {}) {
            warn!("Save request for slot {} was not queued", event.slot);
        }
    }
}

pub fn handle_load_requests(
    mut events: MessageReader<LoadSlotRequest>,
    mut manager: ResMut<SaveManager>,
) {
    for event in events.read() {
        if !manager.request_load(event.slot, |_| {}) {
            warn!("Load request for slot {} was not queued", event.slot);
        }
    }
}

pub fn handle_delete_requests(
    mut events: MessageReader<DeleteSlotRequest>,
    mut manager: ResMut<SaveManager>,
) {
    for event in events.read() {
        if !manager.delete_slot(event.slot) {
            warn!("Slot {} had nothing to delete", event.slot);
        }
    }
}

pub fn handle_slot_info_requests(
    mut events: MessageReader<LoadSlotInfosRequest>,
    mut manager: ResMut<SaveManager>,
    inbox: Res<SlotInfoInbox>,
) {
    for event in events.read() {
        let inbox = inbox.clone();
        let sort_by_recent = event.sort_by_recent;
        manager.load_slot_infos(sort_by_recent, move |infos| {
            inbox.push(SlotInfosLoaded {
                infos,
                sort_by_recent,
            });
        });
    }
}

pub fn handle_map_messages(
    mut started: MessageReader<MapLoadStarted>,
    mut finished: MessageReader<MapLoadFinished>,
    mut manager: ResMut<SaveManager>,
) {
    for event in started.read() {
        manager.on_map_load_started(&event.map);
    }
    for _ in finished.read() {
        manager.on_map_load_finished();
    }
}

pub fn tick_save_manager(time: Res<Time>, mut manager: ResMut<SaveManager>) {
    manager.tick(time.delta_secs());
}

pub fn forward_persistence_events(
    mut manager: ResMut<SaveManager>,
    mut saved: MessageWriter<GameSaved>,
    mut loaded: MessageWriter<GameLoaded>,
) {
    write_persistence_events(&mut manager, &mut saved, &mut loaded);
}

fn write_persistence_events(
    manager: &mut SaveManager,
    saved: &mut MessageWriter<GameSaved>,
    loaded: &mut MessageWriter<GameLoaded>,
) {
    for event in manager.drain_events() {
        match event {
            PersistenceEvent::GameSaved(info) => {
                saved.write(GameSaved { info });
            }
            PersistenceEvent::GameLoaded(info) => {
                loaded.write(GameLoaded { info });
            }
        }
    }
}

pub fn forward_slot_infos(inbox: Res<SlotInfoInbox>, mut writer: MessageWriter<SlotInfosLoaded>) {
    for loaded in inbox.drain() {
        writer.write(loaded);
    }
}

/// Flush the queue (and save on exit, if configured) before the app closes.
/// Broadcasts produced by the flush are written here, since the `Update`
/// forwarding never runs again.
pub fn shutdown_on_exit(
    mut exits: MessageReader<AppExit>,
    mut manager: ResMut<SaveManager>,
    mut saved: MessageWriter<GameSaved>,
    mut loaded: MessageWriter<GameLoaded>,
) {
    if exits.read().next().is_some() {
        manager.shutdown();
        write_persistence_events(&mut manager, &mut saved, &mut loaded);
    }
}
