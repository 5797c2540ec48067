use bevy::app::ScheduleRunnerPlugin;
use bevy::prelude::*;
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use saveforged::SaveForgedPlugin;
use saveforged::config::load_preset;
use saveforged::paths;
use saveforged::persistence::{
    GameLoaded, GameSaved, LoadSlotInfosRequest, LoadSlotRequest, MapLoadFinished,
    MapLoadStarted, SaveManager, SaveSlotRequest, SlotInfosLoaded,
};
use saveforged::store::FileBlobStore;
use saveforged::world::WorldContext;

const DEMO_SLOT: i32 = 1;
const DEMO_TIMEOUT_FRAMES: u32 = 600;

/// Set up file logging for debug builds
#[cfg(debug_assertions)]
fn setup_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use std::fs::OpenOptions;
    use std::io::Write;
    use tracing_subscriber::prelude::*;

    let logs_dir = paths::logs_dir();
    if std::fs::create_dir_all(&logs_dir).is_err() {
        eprintln!("Failed to create logs directory");
        return None;
    }

    let log_file_path = logs_dir.join("saveforged.log");

    // Append session separator to existing log file
    if let Ok(mut file) = OpenOptions::new().append(true).open(&log_file_path) {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let separator = "=".repeat(80);
        let _ = writeln!(
            file,
            "\n\n{}\n=== New Session Started at {} ===\n{}\n",
            separator, timestamp, separator
        );
    }

    let file_appender = tracing_appender::rolling::never(&logs_dir, "saveforged.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Configure file layer (no ANSI colors for file output)
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_level(true);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_target(true)
        .with_level(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,saveforged=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Some(guard)
}

#[cfg(not(debug_assertions))]
fn setup_logging() -> Option<()> {
    None
}

/// State shared between the demo world handed to the manager and the demo
/// systems that play the host game.
struct DemoState {
    map: String,
    gold: u32,
    pending_travel: Option<String>,
}

#[derive(Clone)]
struct DemoWorld(Arc<Mutex<DemoState>>);

impl DemoWorld {
    fn lock(&self) -> MutexGuard<'_, DemoState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WorldContext for DemoWorld {
    fn has_authority(&self) -> bool {
        true
    }

    fn current_map(&self) -> String {
        self.lock().map.clone()
    }

    fn streaming_regions(&self) -> Vec<String> {
        Vec::new()
    }

    fn is_region_visible(&self, _region: &str) -> bool {
        false
    }

    fn capture_world(&self) -> serde_json::Value {
        json!({ "gold": self.lock().gold })
    }

    fn apply_world(&mut self, world: &serde_json::Value) {
        let gold = world["gold"].as_u64().unwrap_or_default();
        self.lock().gold = u32::try_from(gold).unwrap_or(u32::MAX);
    }

    fn serialize_region(&mut self, region: &str) -> Result<Vec<u8>, String> {
        Err(format!("demo world has no region '{}'", region))
    }

    fn deserialize_region(&mut self, region: &str, _bytes: &[u8]) -> Result<(), String> {
        Err(format!("demo world has no region '{}'", region))
    }

    fn open_map(&mut self, map: &str) -> Result<(), String> {
        self.lock().pending_travel = Some(map.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DemoStep {
    Save,
    WaitSaved,
    WaitInfos,
    WaitLoaded,
    Finished,
}

#[derive(Resource)]
struct DemoScript {
    world: DemoWorld,
    step: DemoStep,
    frames: u32,
}

#[allow(clippy::too_many_arguments)]
fn run_demo_script(
    mut script: ResMut<DemoScript>,
    mut saved: MessageReader<GameSaved>,
    mut infos: MessageReader<SlotInfosLoaded>,
    mut loaded: MessageReader<GameLoaded>,
    mut save_requests: MessageWriter<SaveSlotRequest>,
    mut load_requests: MessageWriter<LoadSlotRequest>,
    mut info_requests: MessageWriter<LoadSlotInfosRequest>,
    mut map_started: MessageWriter<MapLoadStarted>,
    mut map_finished: MessageWriter<MapLoadFinished>,
    mut exit: MessageWriter<AppExit>,
) {
    script.frames += 1;
    if script.frames > DEMO_TIMEOUT_FRAMES && script.step != DemoStep::Finished {
        error!("Demo stalled at {:?}", script.step);
        script.step = DemoStep::Finished;
        exit.write(AppExit::error());
        return;
    }

    match script.step {
        DemoStep::Save => {
            script.world.lock().gold = 250;
            save_requests.write(SaveSlotRequest {
                slot: DEMO_SLOT,
                overwrite: true,
                screenshot: None,
            });
            script.step = DemoStep::WaitSaved;
        }
        DemoStep::WaitSaved => {
            if let Some(event) = saved.read().last() {
                info!("Saved '{}' on map '{}'", event.info.name, event.info.map);

                // Wander off to another map and spend the gold
                {
                    let mut state = script.world.lock();
                    state.map = "caves".to_string();
                    state.gold = 0;
                }
                map_started.write(MapLoadStarted {
                    map: "caves".to_string(),
                });
                map_finished.write(MapLoadFinished);

                info_requests.write(LoadSlotInfosRequest {
                    sort_by_recent: true,
                });
                script.step = DemoStep::WaitInfos;
            }
        }
        DemoStep::WaitInfos => {
            if let Some(event) = infos.read().last() {
                for info in &event.infos {
                    info!(
                        "Slot {}: '{}' saved {} ({:.1}s played)",
                        info.id, info.name, info.saved_at, info.played_time
                    );
                }
                load_requests.write(LoadSlotRequest { slot: DEMO_SLOT });
                script.step = DemoStep::WaitLoaded;
            }
        }
        DemoStep::WaitLoaded => {
            if let Some(event) = loaded.read().last() {
                let state = script.world.lock();
                info!(
                    "Loaded slot {} back on map '{}' with {} gold",
                    event.info.id, state.map, state.gold
                );
                drop(state);
                script.step = DemoStep::Finished;
                exit.write(AppExit::Success);
            }
        }
        DemoStep::Finished => {}
    }
}

/// Plays the host side of a map transition requested by the loader
fn complete_travel(
    script: Res<DemoScript>,
    mut map_started: MessageWriter<MapLoadStarted>,
    mut map_finished: MessageWriter<MapLoadFinished>,
) {
    let mut state = script.world.lock();
    if let Some(map) = state.pending_travel.take() {
        state.map = map.clone();
        map_started.write(MapLoadStarted { map });
        map_finished.write(MapLoadFinished);
    }
}

fn main() {
    // Keep the guard alive for the duration of the program
    let _log_guard = setup_logging();

    if let Err(e) = paths::ensure_directories() {
        error!("Failed to create data directories: {}", e);
    }
    let loaded = load_preset(&paths::preset_file());
    if let Some(reason) = &loaded.reset_reason {
        warn!("{}", reason);
    }

    let world = DemoWorld(Arc::new(Mutex::new(DemoState {
        map: "harbor".to_string(),
        gold: 0,
        pending_travel: None,
    })));
    let manager = SaveManager::new(
        loaded.preset,
        Arc::new(FileBlobStore::in_saves_dir()),
        world.clone(),
    );

    let mut app = App::new();
    app.add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(
        Duration::from_secs_f64(1.0 / 60.0),
    )))
    .insert_resource(manager)
    .insert_resource(DemoScript {
        world,
        step: DemoStep::Save,
        frames: 0,
    })
    .add_plugins(SaveForgedPlugin)
    .add_systems(Update, (run_demo_script, complete_travel));

    // Debug builds install their own subscriber in setup_logging
    #[cfg(not(debug_assertions))]
    app.add_plugins(bevy::log::LogPlugin::default());

    app.run();
}
