//! Bridge tests through the full load path: offsets, join map overrides,
//! partial bridging, feedback publication and legacy bridges.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use av_controller::application::diagnostics;
use av_controller::application::load_system::ControlSystem;
use av_controller::infrastructure::devices::{register_builtin_types, DeviceServices};
use av_core::protocol::join_map::JoinKind;
use av_core::{DeviceFactory, JoinMap, SystemConfig};
use serde_json::json;

fn loaded_system() -> ControlSystem {
    let services = DeviceServices::new(std::env::temp_dir());
    let mut factory = DeviceFactory::new();
    register_builtin_types(&mut factory, &services);
    let system = ControlSystem::new(factory, Arc::clone(&services.links), "cp4");

    let display = |key: &str| {
        json!({ "key": key, "type": "display",
                "properties": { "warmupTimeMs": 0, "cooldownTimeMs": 0 } })
    };
    let config: SystemConfig = serde_json::from_value(json!({
        "devices": [
            display("display-1"),
            display("display-2"),
            display("display-3"),
            { "key": "dvd", "type": "genericIrController",
              "properties": { "commands": ["POWER", "PLAY", "EJECT_TRAY_2"], "useBridgeJoinMap": true } },
            { "key": "bridge-1", "type": "eiscApiAdvanced",
              "properties": { "devices": [
                  { "deviceKey": "display-1", "joinStart": 0 },
                  { "deviceKey": "display-2", "joinStart": 100 },
                  { "deviceKey": "display-3", "joinStart": 200, "joinMapKey": "powerOnly" }
              ] } },
            { "key": "bridge-2", "type": "eiscApiAdvanced",
              "properties": { "devices": [ { "deviceKey": "dvd", "joinStart": 100 } ] } },
            { "key": "legacy", "type": "eiscApi",
              "properties": { "devices": [ { "deviceKey": "display-1", "joinStart": 10 } ] } }
        ],
        "joinMaps": {
            "powerOnly": "{ \"powerOn\": { \"joinNumber\": 5, \"joinType\": \"digital\", \"joinCapabilities\": \"toFromRemote\" } }"
        }
    }))
    .unwrap();

    system.load(config);
    system
}

fn addresses(map: &JoinMap) -> HashSet<(JoinKind, u32)> {
    map.iter().map(|(_, join)| (join.kind, join.join_number)).collect()
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

// ── Offsets ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_offsets_0_and_100_never_collide() {
    // Arrange
    let system = loaded_system();
    let tables = system.bridge_tables();

    // Act
    let first = tables.get("bridge-1", "display-1").unwrap();
    let second = tables.get("bridge-1", "display-2").unwrap();

    // Assert
    assert!(addresses(&first).is_disjoint(&addresses(&second)));
    assert_eq!(first.join_number("powerOn"), Some(1));
    assert_eq!(second.join_number("powerOn"), Some(101));
    let dump = diagnostics::get_join_map(&system, "bridge-1", None).unwrap();
    assert!(dump.contains("display-1") && dump.contains("display-2"));
}

// ── Overrides ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_join_map_override_replaces_default_and_limits_bridging() {
    let system = loaded_system();
    let link = system.links().get("bridge-1").unwrap();

    let map = system.bridge_tables().get("bridge-1", "display-3").unwrap();

    assert_eq!(map.len(), 1);
    assert_eq!(map.join_number("powerOn"), Some(205));
    assert!(!link.press_bool(202, true), "powerOff is not in the override");
    assert!(link.press_bool(205, true));
    let display = system.registry().get("display-3").unwrap();
    assert!(display.as_power().unwrap().power_is_on().value());
}

#[tokio::test]
async fn test_explicit_ir_mode_binds_only_known_commands() {
    let system = loaded_system();

    let bound = eventually(|| system.bridge_tables().get("bridge-2", "dvd").is_some()).await;

    assert!(bound);
    let map = system.bridge_tables().get("bridge-2", "dvd").unwrap();
    assert_eq!(map.join_number("PLAY"), Some(101));
    assert_eq!(map.join_number("POWER"), Some(109));
    assert!(!map.contains("EJECT_TRAY_2"));
}

// ── Feedback ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_power_feedback_is_published_to_the_link() {
    let system = loaded_system();
    let link = system.links().get("bridge-1").unwrap();
    assert_eq!(link.bool_output(1), Some(false));

    diagnostics::press(&system, "bridge-1", 1, true).unwrap();

    assert!(eventually(|| link.bool_output(1) == Some(true)).await);
}

// ── Legacy bridges ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_legacy_bridge_binds_without_recording_join_maps() {
    let system = loaded_system();

    assert!(!system.bridge_tables().bridges().contains(&"legacy".to_string()));
    assert!(diagnostics::press(&system, "legacy", 11, true).is_ok());
}
