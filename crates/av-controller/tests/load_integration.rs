//! End-to-end load tests: a JSON system file on disk becomes live devices,
//! rooms, tie lines and bridges, and can be torn down and reloaded.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use av_controller::application::diagnostics;
use av_controller::application::load_system::{ControlSystem, LoadOutcome};
use av_controller::infrastructure::devices::{register_builtin_types, DeviceServices};
use av_controller::infrastructure::storage::config::load_system_config;
use av_core::domain::room::{LEFT_DISPLAY_ROLE, RIGHT_DISPLAY_ROLE};
use av_core::{DeviceFactory, SystemConfig, PROCESSOR_KEY};

// ── Fixtures ──────────────────────────────────────────────────────────────────

const SYSTEM_JSON: &str = r#"{
    "info": { "name": "Boardroom" },
    "devices": [
        { "key": "processor", "type": "CP4" },
        { "key": "laptop", "name": "Laptop", "type": "source" },
        { "key": "switcher", "type": "matrixSwitcher",
          "properties": { "inputCount": 2, "outputCount": 2 } },
        { "key": "display-1", "type": "display",
          "properties": { "warmupTimeMs": 0, "cooldownTimeMs": 0 } },
        { "key": "display-2", "type": "display",
          "properties": { "warmupTimeMs": 0, "cooldownTimeMs": 0 } },
        { "key": "bluray", "type": "genericIrController",
          "properties": { "commands": ["POWER", "PLAY"] } },
        { "key": "bridge-1", "type": "eiscApiAdvanced",
          "properties": { "devices": [
              { "deviceKey": "room-1", "joinStart": 100 },
              { "deviceKey": "bluray", "joinStart": 300 }
          ] } }
    ],
    "rooms": [
        { "key": "room-1", "name": "Boardroom", "type": "dualDisplay" }
    ],
    "sourceLists": {
        "default": {
            "laptop": { "sourceKey": "laptop", "name": "Laptop",
                        "volumeControlKey": "$defaultDisplay" },
            "off": { "sourceKey": "$off", "type": "off" }
        }
    },
    "destinationLists": {
        "default": {
            "left": { "sinkKey": "display-1",
                      "surfaceLocation": 0, "horizontalLocation": 0, "verticalLocation": 0 },
            "right": { "sinkKey": "display-2",
                       "surfaceLocation": 0, "horizontalLocation": 1, "verticalLocation": 0 }
        }
    },
    "tieLines": [
        { "sourceKey": "laptop", "sourcePort": "out",
          "destinationKey": "switcher", "destinationPort": "in1" },
        { "sourceKey": "switcher", "sourcePort": "out1",
          "destinationKey": "display-1", "destinationPort": "hdmiIn1" },
        { "sourceKey": "switcher", "sourcePort": "out2",
          "destinationKey": "display-2", "destinationPort": "hdmiIn1" }
    ]
}"#;

fn temp_file(contents: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .subsec_nanos();
    let dir = std::env::temp_dir().join(format!("av-load-{}-{nanos}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("system.json");
    std::fs::write(&path, contents).unwrap();
    path
}

fn system(model: &str) -> ControlSystem {
    let services = DeviceServices::new(std::env::temp_dir());
    let mut factory = DeviceFactory::new();
    register_builtin_types(&mut factory, &services);
    ControlSystem::new(factory, Arc::clone(&services.links), model)
}

fn config() -> SystemConfig {
    let path = temp_file(SYSTEM_JSON);
    let config = load_system_config(&path).unwrap();
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
    config
}

async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

// ── Load ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_full_system_file_loads_every_entity() {
    // Arrange
    let system = system("cp4");

    // Act
    let outcome = system.load(config());

    // Assert
    assert!(matches!(outcome, LoadOutcome::Completed(_)), "{outcome:?}");
    let summary = outcome.summary();
    assert_eq!(summary.devices, 6);
    assert_eq!(summary.rooms, 1);
    assert_eq!(summary.tie_lines, 3);
    assert!(system.registry().contains(PROCESSOR_KEY));
    assert!(system.registry().contains("bluray-irPort"));
    assert!(system.registry().all_registered());
    assert!(system.is_initialization_complete());
}

#[tokio::test]
async fn test_processor_type_mismatch_only_warns() {
    let system = system("rmc-4");

    let outcome = system.load(config());

    assert!(!outcome.has_errors());
    assert_eq!(system.registry().get(PROCESSOR_KEY).unwrap().name(), "rmc-4");
}

#[tokio::test]
async fn test_unknown_and_broken_entries_are_skipped() {
    let system = system("cp4");
    let mut config = config();
    config.devices.push(av_core::DeviceConfig::new(
        "mystery",
        "fluxCapacitor",
        serde_json::Value::Null,
    ));
    config.devices.push(av_core::DeviceConfig::new(
        "empty-ir",
        "genericIrController",
        serde_json::Value::Null,
    ));

    let outcome = system.load(config);

    assert!(outcome.has_errors());
    assert_eq!(outcome.summary().errors.len(), 2);
    assert_eq!(outcome.summary().devices, 6);
    assert!(!system.registry().contains("mystery"));
    assert!(system.registry().contains("room-1"));
}

// ── Rooms ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_dual_display_room_resolves_displays_by_position() {
    let system = system("cp4");
    system.load(config());

    let room = system.registry().get("room-1").unwrap();
    let room = room.as_room().unwrap();

    assert!(room.routing_enabled());
    assert_eq!(room.sink(LEFT_DISPLAY_ROLE).unwrap().key(), "display-1");
    assert_eq!(room.sink(RIGHT_DISPLAY_ROLE).unwrap().key(), "display-2");
}

#[tokio::test]
async fn test_selecting_a_source_routes_through_the_switcher() {
    // Arrange
    let system = system("cp4");
    system.load(config());
    let handle = system.registry().get("room-1").unwrap();
    let room = handle.as_room().unwrap();

    // Act
    room.select_source("laptop", None).unwrap();

    // Assert
    assert_eq!(system.router().active_source("display-1").as_deref(), Some("laptop"));
    assert_eq!(system.router().active_source("display-2").as_deref(), Some("laptop"));
    assert_eq!(room.volume_device_key().as_deref(), Some("display-1"));
    let display = system.registry().get("display-2").unwrap();
    assert!(display.as_power().unwrap().power_is_on().value());
}

#[tokio::test]
async fn test_room_bridge_joins_drive_the_room() {
    let system = system("cp4");
    system.load(config());
    let link = system.links().get("bridge-1").unwrap();
    let handle = system.registry().get("room-1").unwrap();
    let room = handle.as_room().unwrap();

    // selectSource is serial 1, roomOff digital 2, both offset by 100.
    assert!(link.press_string(101, "laptop"));
    assert_eq!(room.current_source_key().as_deref(), Some("laptop"));

    assert!(link.press_bool(102, true));
    assert!(room.current_source_key().is_none());
    assert_eq!(room.last_source_key().as_deref(), Some("laptop"));
}

// ── Deferred IR binding ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_ir_controller_binds_once_its_driver_loads() {
    let system = system("cp4");
    system.load(config());

    let bound = eventually(|| system.bridge_tables().get("bridge-1", "bluray").is_some()).await;

    assert!(bound);
    let map = system.bridge_tables().get("bridge-1", "bluray").unwrap();
    assert_eq!(map.join_number("POWER"), Some(300));
    assert_eq!(map.join_number("PLAY"), Some(301));
    assert!(diagnostics::press(&system, "bridge-1", 301, true).is_ok());
}

// ── Teardown and reload ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_tear_down_clears_everything() {
    let system = system("cp4");
    system.load(config());

    system.tear_down();

    assert!(system.registry().is_empty());
    assert!(system.tie_lines().is_empty());
    assert!(system.bridge_tables().bridges().is_empty());
    assert!(system.links().keys().is_empty());
    assert!(system.config().is_none());
}

#[tokio::test]
async fn test_reload_brings_the_system_back() {
    let system = system("cp4");
    system.load(config());

    let outcome = system.reload(config());

    assert!(!outcome.has_errors(), "{outcome:?}");
    assert_eq!(system.tie_lines().len(), 3);
    assert!(system.links().get("bridge-1").is_some());
    assert!(diagnostics::get_join_map(&system, "bridge-1", Some("room-1")).is_ok());
}
