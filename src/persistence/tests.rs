//! Unit tests for the persistence module.

use bevy::app::{App, AppExit};
use bevy::ecs::message::Messages;
use bevy::tasks::{IoTaskPool, Task, TaskPool};
use bevy::time::Time;
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::SavePreset;
use crate::error::PersistError;
use crate::slot::{SlotData, SlotInfo, slot_data_name, slot_info_name};
use crate::store::{BlobStore, MemoryBlobStore};
use crate::world::{ScreenshotCapture, ScreenshotSize, WorldContext};
use crate::SaveForgedPlugin;

use super::task::{Drive, TaskContext};
use super::*;

// Fakes

struct WorldState {
    authority: bool,
    map: String,
    visible: BTreeMap<String, bool>,
    live_regions: BTreeMap<String, Vec<u8>>,
    state: serde_json::Value,
    opened: Vec<String>,
}

#[derive(Clone)]
struct FakeWorld(Arc<Mutex<WorldState>>);

impl FakeWorld {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(WorldState {
            authority: true,
            map: "harbor".to_string(),
            visible: BTreeMap::new(),
            live_regions: BTreeMap::new(),
            state: json!({ "gold": 0 }),
            opened: Vec::new(),
        })))
    }

    fn lock(&self) -> MutexGuard<'_, WorldState> {
        self.0.lock().unwrap()
    }

    fn with_region(self, region: &str, payload: &[u8]) -> Self {
        {
            let mut state = self.lock();
            state.visible.insert(region.to_string(), true);
            state.live_regions.insert(region.to_string(), payload.to_vec());
        }
        self
    }

    fn set_state(&self, value: serde_json::Value) {
        self.lock().state = value;
    }

    fn state(&self) -> serde_json::Value {
        self.lock().state.clone()
    }

    fn set_map(&self, map: &str) {
        self.lock().map = map.to_string();
    }

    fn set_visible(&self, region: &str, visible: bool) {
        self.lock().visible.insert(region.to_string(), visible);
    }

    fn set_live_region(&self, region: &str, payload: &[u8]) {
        self.lock()
            .live_regions
            .insert(region.to_string(), payload.to_vec());
    }

    fn live_region(&self, region: &str) -> Option<Vec<u8>> {
        self.lock().live_regions.get(region).cloned()
    }

    fn opened(&self) -> Vec<String> {
        self.lock().opened.clone()
    }
}

impl WorldContext for FakeWorld {
    fn has_authority(&self) -> bool {
        self.lock().authority
    }

    fn current_map(&self) -> String {
        self.lock().map.clone()
    }

    fn streaming_regions(&self) -> Vec<String> {
        self.lock().visible.keys().cloned().collect()
    }

    fn is_region_visible(&self, region: &str) -> bool {
        self.lock().visible.get(region).copied().unwrap_or(false)
    }

    fn capture_world(&self) -> serde_json::Value {
        self.state()
    }

    fn apply_world(&mut self, world: &serde_json::Value) {
        self.set_state(world.clone());
    }

    fn serialize_region(&mut self, region: &str) -> Result<Vec<u8>, String> {
        Ok(self.live_region(region).unwrap_or_default())
    }

    fn deserialize_region(&mut self, region: &str, bytes: &[u8]) -> Result<(), String> {
        self.set_live_region(region, bytes);
        Ok(())
    }

    fn open_map(&mut self, map: &str) -> Result<(), String> {
        self.lock().opened.push(map.to_string());
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum ScreenshotMode {
    Succeed,
    Fail,
    /// Never resolves, like a capture waiting on frames that no longer render
    Hang,
}

struct FakeScreenshots(ScreenshotMode);

impl ScreenshotCapture for FakeScreenshots {
    fn request(&self, slot: i32, size: ScreenshotSize) -> Task<Result<String, String>> {
        let pool = IoTaskPool::get_or_init(TaskPool::new);
        match self.0 {
            ScreenshotMode::Succeed => pool.spawn(async move {
                Ok(format!("shot_{}_{}x{}.png", slot, size.width, size.height))
            }),
            ScreenshotMode::Fail => pool.spawn(async move { Err("no renderer".to_string()) }),
            ScreenshotMode::Hang => pool.spawn(futures_lite::future::pending()),
        }
    }
}

type EventLog = Arc<Mutex<Vec<(&'static str, LifecycleEvent)>>>;

struct Recorder {
    name: &'static str,
    log: EventLog,
}

impl SaveObserver for Recorder {
    fn on_save_began(&self) {
        self.log
            .lock()
            .unwrap()
            .push((self.name, LifecycleEvent::SaveBegan));
    }

    fn on_save_finished(&self, error: bool) {
        self.log
            .lock()
            .unwrap()
            .push((self.name, LifecycleEvent::SaveFinished { error }));
    }

    fn on_load_finished(&self, error: bool) {
        self.log
            .lock()
            .unwrap()
            .push((self.name, LifecycleEvent::LoadFinished { error }));
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Ok(Option<i32>),
    Err(String),
}

type Outcomes = Arc<Mutex<Vec<Outcome>>>;

/// Callback appending the result (slot id or error debug text) to a list
fn record(outcomes: &Outcomes) -> impl FnOnce(&TaskResult) + Send + Sync + 'static {
    let outcomes = outcomes.clone();
    move |result: &TaskResult| {
        let outcome = match result {
            Ok(info) => Outcome::Ok(info.as_ref().map(|info| info.id)),
            Err(e) => Outcome::Err(format!("{:?}", e)),
        };
        outcomes.lock().unwrap().push(outcome);
    }
}

fn setup(preset: SavePreset) -> (SaveManager, FakeWorld, Arc<MemoryBlobStore>) {
    setup_with_world(preset, FakeWorld::new())
}

fn setup_with_world(
    preset: SavePreset,
    world: FakeWorld,
) -> (SaveManager, FakeWorld, Arc<MemoryBlobStore>) {
    let store = Arc::new(MemoryBlobStore::new());
    let mut manager = SaveManager::new(preset, store.clone(), world.clone());
    manager.init();
    (manager, world, store)
}

fn run_until_idle(manager: &mut SaveManager) {
    for _ in 0..1000 {
        if !manager.is_busy() && !manager.is_loading_infos() {
            return;
        }
        manager.tick(1.0 / 60.0);
        std::thread::sleep(Duration::from_millis(1));
    }
    panic!("save manager never became idle");
}

fn write_slot(store: &dyn BlobStore, info: &SlotInfo, data: &SlotData) {
    store
        .save(&slot_data_name(info.id), &data.to_bytes().unwrap())
        .unwrap();
    store
        .save(&slot_info_name(info.id), &info.to_bytes().unwrap())
        .unwrap();
}

// Admission

#[test]
fn test_save_rejects_out_of_range_slots() {
    let (mut manager, _world, store) = setup(SavePreset::default());
    let outcomes = Outcomes::default();
    let max = manager.preset().max_slots;

    assert!(!manager.request_save(-1, false, None, record(&outcomes)));
    assert!(!manager.request_save(max, false, None, record(&outcomes)));

    assert_eq!(manager.pending_tasks(), 0);
    assert!(outcomes.lock().unwrap().is_empty());
    assert!(store.is_empty());
}

#[test]
fn test_save_rejects_zero_screenshot_size() {
    let (mut manager, _world, _store) = setup(SavePreset::default());
    let size = ScreenshotSize {
        width: 0,
        height: 360,
    };
    assert!(!manager.request_save(1, false, Some(size), |_| {}));
    assert_eq!(manager.pending_tasks(), 0);
}

#[test]
fn test_requests_rejected_without_authority() {
    let world = FakeWorld::new();
    world.lock().authority = false;
    let (mut manager, _world, _store) = setup_with_world(SavePreset::default(), world);

    assert!(!manager.request_save(0, true, None, |_| {}));
    assert!(!manager.request_load(0, |_| {}));
    assert!(!manager.is_busy());
}

#[test]
fn test_save_without_overwrite_rejected_for_existing_slot() {
    let (mut manager, _world, _store) = setup(SavePreset::default());
    assert!(manager.request_save(2, false, None, |_| {}));
    run_until_idle(&mut manager);

    assert!(!manager.request_save(2, false, None, |_| {}));
    assert!(manager.request_save(2, true, None, |_| {}));
    run_until_idle(&mut manager);
}

#[test]
fn test_load_rejects_unsaved_slot() {
    let (mut manager, _world, _store) = setup(SavePreset::default());
    assert!(!manager.request_load(7, |_| {}));
    assert!(!manager.request_load(-3, |_| {}));
    assert_eq!(manager.pending_tasks(), 0);
}

// Slot existence

#[test]
fn test_is_slot_saved_tracks_save_and_delete() {
    let (mut manager, _world, store) = setup(SavePreset::default());
    assert!(!manager.is_slot_saved(4));

    assert!(manager.request_save(4, false, None, |_| {}));
    run_until_idle(&mut manager);
    assert!(manager.is_slot_saved(4));
    assert!(store.exists(&slot_info_name(4)));
    assert!(store.exists(&slot_data_name(4)));

    assert!(manager.delete_slot(4));
    assert!(!manager.is_slot_saved(4));
    assert!(!store.exists(&slot_data_name(4)));
}

#[test]
fn test_slot_with_single_blob_is_not_saved() {
    let (manager, _world, store) = setup(SavePreset::default());
    store.save(&slot_info_name(3), b"{}").unwrap();
    assert!(!manager.is_slot_saved(3));
}

#[test]
fn test_delete_outcomes() {
    let (mut manager, _world, store) = setup(SavePreset::default());
    for slot in [1, 2] {
        assert!(manager.request_save(slot, false, None, |_| {}));
    }
    run_until_idle(&mut manager);

    assert_eq!(manager.delete_slot_outcome(1), DeleteOutcome::Deleted);

    store.delete(&slot_data_name(2)).unwrap();
    assert_eq!(manager.delete_slot_outcome(2), DeleteOutcome::Partial);

    assert_eq!(manager.delete_slot_outcome(2), DeleteOutcome::NotFound);
    assert!(!manager.delete_slot(9));
    assert!(!manager.delete_slot(-1));
}

// Save/load

#[test]
fn test_save_then_load_round_trip() {
    let (mut manager, world, _store) = setup(SavePreset::default());
    let outcomes = Outcomes::default();

    world.set_state(json!({ "gold": 120, "quests": ["ferry"] }));
    assert!(manager.request_save(3, false, None, record(&outcomes)));
    run_until_idle(&mut manager);
    let saved = manager.current_data().clone();
    assert!(manager.is_in_slot());

    world.set_state(json!({ "gold": 0 }));
    assert!(manager.request_load(3, record(&outcomes)));
    run_until_idle(&mut manager);

    assert_eq!(
        *outcomes.lock().unwrap(),
        vec![Outcome::Ok(Some(3)), Outcome::Ok(Some(3))]
    );
    assert_eq!(world.state(), json!({ "gold": 120, "quests": ["ferry"] }));
    assert_eq!(manager.current_data(), &saved);
    assert_eq!(manager.current_info().id, 3);
    assert_eq!(manager.current_info().map, "harbor");
    assert!(manager.current_info().is_compatible());

    let events = manager.drain_events();
    assert!(matches!(&events[0], PersistenceEvent::GameSaved(info) if info.id == 3));
    assert!(matches!(&events[1], PersistenceEvent::GameLoaded(info) if info.id == 3));
    assert!(manager.drain_events().is_empty());
}

#[test]
fn test_saved_slot_includes_visible_regions() {
    let world = FakeWorld::new().with_region("dock", b"crates:3");
    let (mut manager, _world, _store) = setup_with_world(SavePreset::default(), world);

    assert!(manager.request_save(0, false, None, |_| {}));
    run_until_idle(&mut manager);

    let info = manager.load_info(0).unwrap();
    let data = manager.load_data(&info).unwrap();
    assert_eq!(data.region("dock"), Some(&b"crates:3"[..]));
    assert_eq!(data.map, "harbor");
}

#[test]
fn test_duplicate_save_denied_and_queue_continues() {
    let (mut manager, _world, _store) = setup(SavePreset::default());
    let outcomes = Outcomes::default();

    assert!(manager.request_save(5, false, None, record(&outcomes)));
    assert!(manager.request_save(5, false, None, record(&outcomes)));
    assert!(manager.request_load(5, record(&outcomes)));
    assert_eq!(manager.pending_tasks(), 3);

    run_until_idle(&mut manager);

    let outcomes = outcomes.lock().unwrap();
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0], Outcome::Ok(Some(5)));
    assert!(matches!(&outcomes[1], Outcome::Err(e) if e.starts_with("OverwriteDenied")));
    assert_eq!(outcomes[2], Outcome::Ok(Some(5)));
}

#[test]
fn test_single_flight_under_stress() {
    let world = FakeWorld::new()
        .with_region("north", b"n")
        .with_region("south", b"s");
    let (mut manager, world, _store) = setup_with_world(SavePreset::default(), world);

    for round in 0..6 {
        let slot = round % 3;
        manager.request_save(slot, true, None, |_| {});
        world.set_visible("north", round % 2 == 0);
        manager.tick(0.016);
        manager.request_load(slot, |_| {});
        world.set_visible("south", round % 2 == 1);
        manager.tick(0.016);
        manager.request_save(slot + 3, true, None, |_| {});
    }
    run_until_idle(&mut manager);

    assert_eq!(manager.max_concurrent_running(), 1);
    assert!(!manager.is_busy());
}

#[test]
fn test_incompatible_version_fails_load() {
    let (mut manager, _world, store) = setup(SavePreset::default());
    let info = SlotInfo {
        id: 6,
        version: "99.0.0".to_string(),
        ..SlotInfo::default()
    };
    write_slot(store.as_ref(), &info, &SlotData::default());

    let outcomes = Outcomes::default();
    assert!(manager.request_load(6, record(&outcomes)));
    run_until_idle(&mut manager);

    assert!(
        matches!(&outcomes.lock().unwrap()[0], Outcome::Err(e) if e.starts_with("IncompatibleVersion"))
    );
    assert!(!manager.is_in_slot());
}

#[test]
fn test_screenshot_reference_stored_in_info() {
    let store = Arc::new(MemoryBlobStore::new());
    let mut manager = SaveManager::new(SavePreset::default(), store, FakeWorld::new())
        .with_screenshots(FakeScreenshots(ScreenshotMode::Succeed));
    manager.init();

    assert!(manager.request_save(1, false, Some(ScreenshotSize::default()), |_| {}));
    run_until_idle(&mut manager);

    let info = manager.load_info(1).unwrap();
    assert_eq!(info.screenshot.as_deref(), Some("shot_1_640x360.png"));
}

#[test]
fn test_screenshot_failure_does_not_fail_save() {
    let store = Arc::new(MemoryBlobStore::new());
    let mut manager = SaveManager::new(SavePreset::default(), store, FakeWorld::new())
        .with_screenshots(FakeScreenshots(ScreenshotMode::Fail));
    manager.init();

    let outcomes = Outcomes::default();
    assert!(manager.request_save(1, false, Some(ScreenshotSize::default()), record(&outcomes)));
    run_until_idle(&mut manager);

    assert_eq!(*outcomes.lock().unwrap(), vec![Outcome::Ok(Some(1))]);
    assert_eq!(manager.load_info(1).unwrap().screenshot, None);
}

// Map transitions

#[test]
fn test_loader_waits_for_map_transition() {
    let (mut manager, world, _store) = setup(SavePreset::default());
    world.set_state(json!({ "gold": 7 }));
    assert!(manager.request_save(2, false, None, |_| {}));
    run_until_idle(&mut manager);

    world.set_map("caves");
    world.set_state(json!({ "gold": 0 }));
    let outcomes = Outcomes::default();
    assert!(manager.request_load(2, record(&outcomes)));

    for _ in 0..200 {
        manager.tick(0.016);
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(world.opened(), vec!["harbor".to_string()]);
    assert!(manager.is_busy());
    assert!(outcomes.lock().unwrap().is_empty());

    world.set_map("harbor");
    manager.on_map_load_started("harbor");
    manager.on_map_load_finished();
    run_until_idle(&mut manager);

    assert_eq!(*outcomes.lock().unwrap(), vec![Outcome::Ok(Some(2))]);
    assert_eq!(world.state(), json!({ "gold": 7 }));
}

#[test]
fn test_loader_fails_when_map_does_not_change() {
    let (mut manager, world, _store) = setup(SavePreset::default());
    assert!(manager.request_save(2, false, None, |_| {}));
    run_until_idle(&mut manager);

    world.set_map("caves");
    let outcomes = Outcomes::default();
    assert!(manager.request_load(2, record(&outcomes)));
    for _ in 0..200 {
        manager.tick(0.016);
        std::thread::sleep(Duration::from_millis(1));
    }

    // Host reports a finished load but never left the old map
    manager.on_map_load_finished();
    run_until_idle(&mut manager);

    assert!(
        matches!(&outcomes.lock().unwrap()[0], Outcome::Err(e) if e.starts_with("MapTransitionFailure"))
    );
}

// Regions

#[test]
fn test_region_hide_show_round_trip() {
    let world = FakeWorld::new().with_region("dock", b"crates:3");
    let (mut manager, world, _store) = setup_with_world(SavePreset::default(), world);

    world.set_visible("dock", false);
    manager.tick(0.016);
    run_until_idle(&mut manager);
    assert_eq!(manager.current_data().region("dock"), Some(&b"crates:3"[..]));

    world.set_live_region("dock", b"");
    world.set_visible("dock", true);
    manager.tick(0.016);
    run_until_idle(&mut manager);
    assert_eq!(world.live_region("dock"), Some(b"crates:3".to_vec()));
}

#[test]
fn test_region_task_requires_region_id() {
    assert!(matches!(
        SlotTask::serialize_region(""),
        Err(PersistError::InvalidParameters(_))
    ));
    assert!(SlotTask::deserialize_region("dock").is_ok());
}

#[test]
fn test_region_notifier_reports_transitions() {
    let world = FakeWorld::new().with_region("dock", b"");
    let mut notifier = RegionNotifier::new("dock".to_string(), &world);

    assert_eq!(notifier.poll(&world), None);
    world.set_visible("dock", false);
    assert_eq!(notifier.poll(&world), Some(RegionTransition::Hidden));
    assert_eq!(notifier.poll(&world), None);
    world.set_visible("dock", true);
    assert_eq!(notifier.poll(&world), Some(RegionTransition::Shown));
}

// Tasks

#[test]
fn test_rebinding_replaces_callback() {
    let preset = SavePreset::default();
    let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    let mut world = FakeWorld::new().with_region("dock", b"x");
    let mut info = SlotInfo::default();
    let mut data = SlotData::default();

    let first = Outcomes::default();
    let second = Outcomes::default();
    let mut task = SlotTask::serialize_region("dock")
        .unwrap()
        .bind(record(&first))
        .bind(record(&second));
    assert_eq!(task.state(), TaskState::NotStarted);

    task.schedule();
    assert_eq!(task.state(), TaskState::Scheduled);

    let mut ctx = TaskContext {
        preset: &preset,
        store: &store,
        world: &mut world,
        screenshots: None,
        info: &mut info,
        data: &mut data,
        drive: Drive::Poll,
    };
    task.begin(&mut ctx);

    assert_eq!(task.state(), TaskState::Succeeded);
    assert!(first.lock().unwrap().is_empty());
    assert_eq!(*second.lock().unwrap(), vec![Outcome::Ok(None)]);
    assert_eq!(data.region("dock"), Some(&b"x"[..]));
}

#[test]
fn test_interrupt_fires_callback_once() {
    let outcomes = Outcomes::default();
    let mut task = SlotTask::load(&SavePreset::default(), 1)
        .unwrap()
        .bind(record(&outcomes));
    task.schedule();

    task.interrupt();
    task.interrupt();

    assert_eq!(task.state(), TaskState::Failed);
    assert_eq!(task.kind(), TaskKind::Load);
    assert_eq!(outcomes.lock().unwrap().len(), 1);
    assert!(matches!(task.outcome(), Some(Err(PersistError::Interrupted))));
}

// Enumeration

#[test]
fn test_slot_infos_sorted_by_recent() {
    let (mut manager, _world, store) = setup(SavePreset::default());
    let at = |hour| Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap();
    for (id, hour) in [(0, 12), (1, 18), (2, 6)] {
        let info = SlotInfo {
            id,
            saved_at: at(hour),
            ..SlotInfo::default()
        };
        write_slot(store.as_ref(), &info, &SlotData::default());
    }

    let sorted = Arc::new(Mutex::new(None));
    let unsorted = Arc::new(Mutex::new(None));
    {
        let sorted = sorted.clone();
        manager.load_slot_infos(true, move |infos| {
            *sorted.lock().unwrap() = Some(infos.iter().map(|i| i.id).collect::<Vec<_>>());
        });
        let unsorted = unsorted.clone();
        manager.load_slot_infos(false, move |infos| {
            *unsorted.lock().unwrap() = Some(infos.iter().map(|i| i.id).collect::<Vec<_>>());
        });
    }
    assert!(manager.is_loading_infos());
    run_until_idle(&mut manager);

    assert_eq!(*sorted.lock().unwrap(), Some(vec![1, 0, 2]));
    assert_eq!(*unsorted.lock().unwrap(), Some(vec![0, 1, 2]));
}

#[test]
fn test_slot_infos_skip_corrupt_blobs() {
    let (mut manager, _world, store) = setup(SavePreset::default());
    write_slot(store.as_ref(), &SlotInfo::default(), &SlotData::default());
    store.save(&slot_info_name(1), b"not json").unwrap();
    store.save(&slot_data_name(1), b"{}").unwrap();

    let found = Arc::new(Mutex::new(Vec::new()));
    let sink = found.clone();
    manager.load_slot_infos(false, move |infos| {
        *sink.lock().unwrap() = infos.iter().map(|i| i.id).collect();
    });
    run_until_idle(&mut manager);

    assert_eq!(*found.lock().unwrap(), vec![0]);
}

// Observers

#[test]
fn test_observers_notified_in_subscription_order() {
    let (mut manager, _world, _store) = setup(SavePreset::default());
    let log = EventLog::default();
    let a = Arc::new(Recorder {
        name: "a",
        log: log.clone(),
    });
    let b = Arc::new(Recorder {
        name: "b",
        log: log.clone(),
    });

    assert!(manager.subscribe(&a));
    assert!(manager.subscribe(&b));
    assert!(!manager.subscribe(&a));

    assert!(manager.request_save(0, false, None, |_| {}));
    run_until_idle(&mut manager);

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            ("a", LifecycleEvent::SaveBegan),
            ("b", LifecycleEvent::SaveBegan),
            ("a", LifecycleEvent::SaveFinished { error: false }),
            ("b", LifecycleEvent::SaveFinished { error: false }),
        ]
    );
}

#[test]
fn test_dropped_and_unsubscribed_observers_skipped() {
    let (mut manager, _world, _store) = setup(SavePreset::default());
    let log = EventLog::default();
    let kept = Arc::new(Recorder {
        name: "kept",
        log: log.clone(),
    });
    let dropped = Arc::new(Recorder {
        name: "dropped",
        log: log.clone(),
    });
    let removed = Arc::new(Recorder {
        name: "removed",
        log: log.clone(),
    });

    manager.subscribe(&kept);
    manager.subscribe(&dropped);
    manager.subscribe(&removed);
    assert!(manager.unsubscribe(&removed));
    drop(dropped);

    assert!(!manager.request_load(0, |_| {}));
    assert!(manager.request_save(0, false, None, |_| {}));
    run_until_idle(&mut manager);

    assert!(log.lock().unwrap().iter().all(|(name, _)| *name == "kept"));
    assert_eq!(log.lock().unwrap().len(), 2);
}

#[test]
fn test_type_erased_observer_subscribes_once() {
    let (mut manager, _world, _store) = setup(SavePreset::default());
    let log = EventLog::default();
    let concrete = Arc::new(Recorder {
        name: "erased",
        log: log.clone(),
    });
    let erased: Arc<dyn SaveObserver> = concrete.clone();

    assert!(manager.subscribe_dyn(&erased));
    assert!(!manager.subscribe(&concrete));
    assert!(!manager.subscribe_dyn(&erased));

    assert!(manager.request_save(0, false, None, |_| {}));
    run_until_idle(&mut manager);
    assert_eq!(log.lock().unwrap().len(), 2);

    assert!(manager.unsubscribe(&erased));
    assert!(!manager.unsubscribe(&concrete));
}

// Lifecycle

#[test]
fn test_shutdown_saves_current_slot() {
    let preset = SavePreset {
        save_on_exit: true,
        ..SavePreset::default()
    };
    let (mut manager, world, store) = setup(preset);
    world.set_state(json!({ "gold": 33 }));

    manager.shutdown();

    assert!(store.exists(&slot_info_name(0)));
    assert!(store.exists(&slot_data_name(0)));
    assert!(!manager.is_busy());
    // Nothing is admitted once shut down
    assert!(!manager.request_save(1, false, None, |_| {}));
}

#[test]
fn test_shutdown_interrupts_loader_waiting_for_map() {
    let (mut manager, world, _store) = setup(SavePreset::default());
    assert!(manager.request_save(2, false, None, |_| {}));
    run_until_idle(&mut manager);

    world.set_map("caves");
    let outcomes = Outcomes::default();
    assert!(manager.request_load(2, record(&outcomes)));
    for _ in 0..200 {
        manager.tick(0.016);
        std::thread::sleep(Duration::from_millis(1));
    }

    manager.shutdown();
    assert!(!manager.is_busy());
    assert!(matches!(&outcomes.lock().unwrap()[0], Outcome::Err(e) if e == "Interrupted"));
}

#[test]
fn test_shutdown_discards_slot_info_callbacks() {
    let (mut manager, _world, _store) = setup(SavePreset::default());
    let fired = Arc::new(Mutex::new(false));
    let flag = fired.clone();
    manager.load_slot_infos(true, move |_| *flag.lock().unwrap() = true);

    manager.shutdown();

    assert!(!manager.is_loading_infos());
    assert!(!*fired.lock().unwrap());
}

#[test]
fn test_auto_load_restores_saved_slot() {
    let store = Arc::new(MemoryBlobStore::new());
    let info = SlotInfo {
        id: 0,
        map: "harbor".to_string(),
        ..SlotInfo::default()
    };
    let data = SlotData {
        map: "harbor".to_string(),
        world: json!({ "gold": 99 }),
        ..SlotData::default()
    };
    write_slot(store.as_ref(), &info, &data);

    let world = FakeWorld::new();
    let preset = SavePreset {
        auto_load: true,
        ..SavePreset::default()
    };
    let mut manager = SaveManager::new(preset, store, world.clone());
    manager.init();
    run_until_idle(&mut manager);

    assert!(manager.is_in_slot());
    assert_eq!(world.state(), json!({ "gold": 99 }));
}

#[test]
fn test_registry_creates_once_and_tears_down() {
    let mut registry = SaveManagerRegistry::new();
    let owner = InstanceId(1);
    let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());

    let manager = registry.get_or_create(owner, || {
        SaveManager::new(SavePreset::default(), store.clone(), FakeWorld::new())
    });
    manager.current_info_mut().name = "first".to_string();

    let again = registry.get_or_create(owner, || panic!("manager created twice"));
    assert_eq!(again.current_info().name, "first");
    assert_eq!(registry.len(), 1);
    assert!(registry.get(InstanceId(2)).is_none());

    assert!(registry.teardown(owner));
    assert!(!registry.teardown(owner));
    assert!(registry.is_empty());
}

#[test]
fn test_shutdown_drops_unfinished_screenshot() {
    let store = Arc::new(MemoryBlobStore::new());
    let mut manager = SaveManager::new(SavePreset::default(), store, FakeWorld::new())
        .with_screenshots(FakeScreenshots(ScreenshotMode::Hang));
    manager.init();

    let outcomes = Outcomes::default();
    assert!(manager.request_save(1, false, Some(ScreenshotSize::default()), record(&outcomes)));
    for _ in 0..10 {
        manager.tick(0.016);
    }
    assert!(manager.is_busy());

    manager.shutdown();

    assert!(!manager.is_busy());
    assert_eq!(*outcomes.lock().unwrap(), vec![Outcome::Ok(Some(1))]);
    assert_eq!(manager.load_info(1).unwrap().screenshot, None);
}

#[test]
fn test_exit_save_skipped_while_loader_travels() {
    let preset = SavePreset {
        save_on_exit: true,
        ..SavePreset::default()
    };
    let (mut manager, world, store) = setup(preset);
    world.set_state(json!({ "gold": 7 }));
    assert!(manager.request_save(2, false, None, |_| {}));
    run_until_idle(&mut manager);

    world.set_map("caves");
    world.set_state(json!({ "gold": 0 }));
    assert!(manager.request_load(2, |_| {}));
    for _ in 0..200 {
        manager.tick(0.016);
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(world.opened(), vec!["harbor".to_string()]);

    manager.shutdown();

    let data = SlotData::from_bytes(&store.load(&slot_data_name(2)).unwrap()).unwrap();
    assert_eq!(data.world, json!({ "gold": 7 }));
    assert_eq!(data.map, "harbor");
    assert!(!manager.is_busy());
}

#[test]
fn test_exit_save_broadcast_written_as_message() {
    let preset = SavePreset {
        save_on_exit: true,
        ..SavePreset::default()
    };
    let store = Arc::new(MemoryBlobStore::new());
    let manager = SaveManager::new(preset, store.clone(), FakeWorld::new());

    let mut app = App::new();
    app.init_resource::<Time>()
        .insert_resource(manager)
        .add_plugins(SaveForgedPlugin);
    app.world_mut().write_message(AppExit::Success);
    app.update();

    assert!(store.exists(&slot_info_name(0)));
    assert_eq!(app.world().resource::<Messages<GameSaved>>().len(), 1);
}
