//! Integration tests for av-core.
//!
//! These tests drive the public API end to end: the registry, tie-line
//! loading, dual-display rooms built through the factory, and the bridge
//! binding path with deferred drivers and per-device offsets.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use av_core::domain::room::{register_room_types, LEFT_DISPLAY_ROLE, RIGHT_DISPLAY_ROLE};
use av_core::protocol::binding::{DeferredBinding, JoinBinder};
use av_core::protocol::bridge::{BridgeRegistration, JoinTableFormat};
use av_core::{
    BoolFeedback, BridgeError, BridgeJoinTables, Bridgeable, BuildContext, Device, DeviceConfig,
    DeviceError, DeviceFactory, DeviceHandle, DeviceRegistry, HasPowerFeedback, JoinMap,
    LinkRequest, MemoryLink, Port, PortKind, RegistryError, RoutingResolver, RoutingSwitcher,
    SignalType, SystemConfig, TieLineCollection, TieLineConfig,
};
use serde_json::json;

// ── Test doubles ──────────────────────────────────────────────────────────────

struct Display {
    key: String,
    ports: Vec<Port>,
    power: BoolFeedback,
    warming: BoolFeedback,
    cooling: BoolFeedback,
}

impl Device for Display {
    fn key(&self) -> &str {
        &self.key
    }
    fn type_name(&self) -> &str {
        "displayType"
    }
    fn ports(&self) -> &[Port] {
        &self.ports
    }
    fn as_power(&self) -> Option<&dyn HasPowerFeedback> {
        Some(self)
    }
    fn as_switcher(&self) -> Option<&dyn RoutingSwitcher> {
        Some(self)
    }
}

impl HasPowerFeedback for Display {
    fn power_is_on(&self) -> &BoolFeedback {
        &self.power
    }
    fn is_warming_up(&self) -> &BoolFeedback {
        &self.warming
    }
    fn is_cooling_down(&self) -> &BoolFeedback {
        &self.cooling
    }
    fn power_on(&self) {
        self.power.set(true);
    }
    fn power_off(&self) {
        self.power.set(false);
    }
}

impl RoutingSwitcher for Display {
    fn execute_switch(&self, _: &str, _: Option<&str>, _: SignalType) -> Result<(), DeviceError> {
        Ok(())
    }
}

fn display_factory() -> DeviceFactory {
    let mut factory = DeviceFactory::new();
    factory.register("displayType", "test display", |entry, _| {
        Ok(Arc::new(Display {
            key: entry.key.clone(),
            ports: vec![Port::input("in1", PortKind::AudioVideo)],
            power: BoolFeedback::new(false),
            warming: BoolFeedback::new(false),
            cooling: BoolFeedback::new(false),
        }) as DeviceHandle)
    });
    register_room_types(&mut factory);
    factory
}

/// A bridgeable device whose command list arrives later, like an IR port.
struct LateDriverDevice {
    key: String,
    self_ref: Weak<LateDriverDevice>,
    commands: Vec<&'static str>,
    binding: DeferredBinding,
    registrations: AtomicUsize,
    presses: AtomicUsize,
}

impl LateDriverDevice {
    fn new(key: &str) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            key: key.to_string(),
            self_ref: self_ref.clone(),
            commands: vec!["POWER", "PLAY", "STOP"],
            binding: DeferredBinding::new(),
            registrations: AtomicUsize::new(0),
            presses: AtomicUsize::new(0),
        })
    }

    fn driver_loaded(&self) {
        if let Some(request) = self.binding.driver_loaded() {
            self.bind(request).unwrap();
        }
    }

    fn bind(&self, request: LinkRequest) -> Result<(), BridgeError> {
        let default = JoinMap::synthesize_digital(self.commands.iter().copied());
        let mut map = request.load_join_map(&self.key, default);
        map.apply_offset(request.join_start)?;
        let mut binder = JoinBinder::new(&self.key, Arc::clone(&request.link), &map);
        for cmd in &self.commands {
            let me = self.self_ref.clone();
            binder.on_bool(cmd, move |pressed| {
                if let (true, Some(me)) = (pressed, me.upgrade()) {
                    me.presses.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
        binder.finish();
        self.registrations.fetch_add(1, Ordering::SeqCst);
        request.register(&self.key, map);
        Ok(())
    }
}

impl Device for LateDriverDevice {
    fn key(&self) -> &str {
        &self.key
    }
    fn type_name(&self) -> &str {
        "lateDriver"
    }
    fn as_bridgeable(&self) -> Option<&dyn Bridgeable> {
        Some(self)
    }
}

impl Bridgeable for LateDriverDevice {
    fn link_to_api(&self, request: LinkRequest) -> Result<(), BridgeError> {
        match self.binding.request(request) {
            Some(request) => self.bind(request),
            None => Ok(()),
        }
    }
}

fn context(config: SystemConfig) -> BuildContext {
    let registry = Arc::new(DeviceRegistry::new());
    let router = Arc::new(RoutingResolver::new(registry, Arc::new(TieLineCollection::new())));
    BuildContext::new(router, Arc::new(config), Arc::new(BridgeJoinTables::new()))
}

// ── Registry ──────────────────────────────────────────────────────────────────

#[test]
fn test_registry_get_returns_added_instance_until_removed() {
    let registry = DeviceRegistry::new();
    let device: DeviceHandle = LateDriverDevice::new("K");

    registry.add(Arc::clone(&device)).unwrap();
    assert!(Arc::ptr_eq(&registry.get("K").unwrap(), &device));
    assert_eq!(
        registry.add(LateDriverDevice::new("K")),
        Err(RegistryError::DuplicateKey("K".into()))
    );

    registry.remove("K");
    assert!(registry.get("K").is_none());
}

// ── Tie lines ─────────────────────────────────────────────────────────────────

#[test]
fn test_tie_line_to_absent_destination_is_dropped() {
    let ctx = context(SystemConfig::default());
    let factory = display_factory();
    let display = factory
        .build(&DeviceConfig::new("A", "displayType", json!({})), &ctx)
        .unwrap();
    ctx.registry.add(display).unwrap();

    let report = ctx.router.load_tie_lines(&[TieLineConfig {
        source_key: "A".into(),
        source_port: "out".into(),
        destination_key: "missing".into(),
        destination_port: "in1".into(),
        signal: SignalType::Video,
    }]);

    assert_eq!(report.added, 0);
    assert!(ctx.router.tie_lines().is_empty());
}

// ── Dual-display rooms ────────────────────────────────────────────────────────

fn dual_display_config() -> SystemConfig {
    serde_json::from_value(json!({
        "devices": [
            { "key": "A", "type": "displayType" },
            { "key": "B", "type": "displayType" }
        ],
        "rooms": [ { "key": "room", "type": "dualDisplay" } ],
        "sourceLists": {
            "default": {
                "A": { "sourceKey": "A" },
                "off": { "sourceKey": "$off" }
            }
        },
        "destinationLists": {
            "default": {
                "left": { "sinkKey": "A", "surfaceLocation": 0, "horizontalLocation": 0, "verticalLocation": 0 },
                "right": { "sinkKey": "B", "surfaceLocation": 0, "horizontalLocation": 1, "verticalLocation": 0 }
            }
        }
    }))
    .unwrap()
}

fn load(ctx: &BuildContext, factory: &DeviceFactory) {
    for entry in ctx.config.devices.iter().chain(ctx.config.rooms.iter()) {
        let device = factory.build(entry, ctx).unwrap();
        ctx.registry.add(device).unwrap();
    }
}

#[test]
fn test_dual_display_room_resolves_displays_by_position() {
    // Arrange
    let ctx = context(dual_display_config());
    let factory = display_factory();

    // Act
    load(&ctx, &factory);

    // Assert
    let device = ctx.registry.get("room").unwrap();
    let room = device.as_room().unwrap();
    assert_eq!(room.sink(LEFT_DISPLAY_ROLE).unwrap().key(), "A");
    assert_eq!(room.sink(RIGHT_DISPLAY_ROLE).unwrap().key(), "B");
}

#[test]
fn test_dual_display_room_clears_source_only_when_both_displays_are_off() {
    // Arrange
    let ctx = context(dual_display_config());
    load(&ctx, &display_factory());
    let device = ctx.registry.get("room").unwrap();
    let room = device.as_room().unwrap();
    room.select_source("A", None).unwrap();
    let a = ctx.registry.get("A").unwrap();
    let b = ctx.registry.get("B").unwrap();

    // Act / Assert – exactly one display on: unchanged
    a.as_power().unwrap().power_off();
    room.on_sink_power_changed();
    assert_eq!(room.current_source_key().as_deref(), Some("A"));

    // Both off: cleared
    b.as_power().unwrap().power_off();
    room.on_sink_power_changed();
    assert!(room.current_source().is_none());
}

#[test]
fn test_off_sentinel_clears_current_and_keeps_last() {
    let ctx = context(dual_display_config());
    load(&ctx, &display_factory());
    let device = ctx.registry.get("room").unwrap();
    let room = device.as_room().unwrap();
    room.select_source("A", None).unwrap();

    room.select_source("off", None).unwrap();

    assert!(room.current_source().is_none());
    assert_eq!(room.last_source_key().as_deref(), Some("A"));
}

// ── Bridge binding ────────────────────────────────────────────────────────────

#[test]
fn test_deferred_binding_registers_join_map_exactly_once() {
    // Arrange
    let tables = Arc::new(BridgeJoinTables::new());
    let link = Arc::new(MemoryLink::new("bridge"));
    let device = LateDriverDevice::new("ir-1");
    let request = LinkRequest::new(link.clone(), 0)
        .with_registration(BridgeRegistration::new("bridge", Arc::clone(&tables)));

    // Act – bind before the driver is loaded
    device.link_to_api(request).unwrap();

    // Assert – nothing bound yet
    assert!(tables.get("bridge", "ir-1").is_none());
    assert!(link.bool_action_joins().is_empty());

    // Act – driver loads, then fires again
    device.driver_loaded();
    device.driver_loaded();

    // Assert – bound exactly once
    assert_eq!(device.registrations.load(Ordering::SeqCst), 1);
    assert!(tables.get("bridge", "ir-1").is_some());
    link.press_bool(1, true);
    assert_eq!(device.presses.load(Ordering::SeqCst), 1);
}

#[test]
fn test_two_devices_at_offsets_0_and_100_do_not_collide() {
    // Arrange
    let tables = Arc::new(BridgeJoinTables::new());
    let link = Arc::new(MemoryLink::new("bridge"));
    let first = LateDriverDevice::new("ir-1");
    let second = LateDriverDevice::new("ir-2");
    first.driver_loaded();
    second.driver_loaded();
    let registration = BridgeRegistration::new("bridge", Arc::clone(&tables));

    // Act
    for (device, offset) in [(&first, 0), (&second, 100)] {
        device
            .link_to_api(LinkRequest::new(link.clone(), offset).with_registration(registration.clone()))
            .unwrap();
    }

    // Assert
    let a = tables.get("bridge", "ir-1").unwrap();
    let b = tables.get("bridge", "ir-2").unwrap();
    let joins_a: HashSet<u32> = a.iter().map(|(_, j)| j.join_number).collect();
    let joins_b: HashSet<u32> = b.iter().map(|(_, j)| j.join_number).collect();
    assert!(joins_a.is_disjoint(&joins_b));
    assert_eq!(b.join_number("POWER"), Some(100));

    let dump = tables.print("bridge", None, JoinTableFormat::Text).unwrap();
    assert!(dump.contains("ir-1 (offset 0)"));
    assert!(dump.contains("ir-2 (offset 100)"));
    assert_eq!(link.bool_action_joins(), vec![0, 1, 2, 100, 101, 102]);
}
