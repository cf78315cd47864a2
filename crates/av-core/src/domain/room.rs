//! The room state machine.
//!
//! A room ties a source list to one or more sinks (displays).  It is driven by
//! two independent inputs:
//!
//! 1. explicit [`Room::select_source`] calls (touch panel, bridge, console);
//! 2. power / warming / cooling feedback changes from its sinks, delivered by
//!    a background task started in [`Device::activate`].
//!
//! # States (for beginners)
//!
//! ```text
//!            select_source(x)                 sinks finish warming
//!   Off ───────────────────────▶ Warming ─────────────────────────▶ On
//!    ▲                                                              │
//!    │        sinks finish cooling            select "$off" / sinks │
//!    └──────────────────────────── Cooling ◀────────────────────────┘
//! ```
//!
//! The room is *on* whenever a routed source is selected.  Warming and cooling
//! are the OR of the sinks' warming and cooling feedback.
//!
//! # Single vs. dual display
//!
//! Both are the same [`Room`] composed with a different [`PowerOffPolicy`]:
//! a huddle room with one display clears its source as soon as that display
//! turns off, while a dual-display room clears it only when *both* displays are
//! off, so one display going dark keeps the other showing content.
//!
//! # Room tie lines
//!
//! A room may declare its own `tieLines` (e.g. a podium input wired only to
//! that room's display).  They are added to the shared collection when the
//! room activates, tagged with the room key, and removed again when it
//! deactivates.  Lines from the system configuration are never touched.
//!
//! # Locking
//!
//! The selection state sits behind a short-lived mutex.  The lock is never
//! held while calling into another device, the router, or a feedback.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Deserialize;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{DeviceConfig, SystemConfig, TieLineConfig};
use crate::domain::device::{Device, DeviceError, SignalType, VolumeControl};
use crate::domain::factory::{BuildContext, BuildResult, DeviceFactory};
use crate::domain::feedback::{BoolFeedback, StringFeedback};
use crate::domain::lists::{find_at_position, SourceItemType, SourceListItem};
use crate::domain::registry::{DeviceHandle, DeviceRegistry};
use crate::domain::routing::RoutingResolver;
use crate::domain::tie_line::{PortRef, TieLine};
use crate::protocol::binding::JoinBinder;
use crate::protocol::bridge::{BridgeError, Bridgeable, LinkRequest};
use crate::protocol::join_map::{JoinCapabilities, JoinData, JoinKind, JoinMap};

/// Selects the room's default audio device for volume control.
pub const DEFAULT_AUDIO_KEY: &str = "$defaultAudio";
/// Selects the room's first display for volume control.
pub const DEFAULT_DISPLAY_KEY: &str = "$defaultDisplay";
/// Source and destination list key used when a room names none.
pub const DEFAULT_LIST_KEY: &str = "default";

pub const LEFT_DISPLAY_ROLE: &str = "leftDisplay";
pub const RIGHT_DISPLAY_ROLE: &str = "rightDisplay";
pub const DISPLAY_ROLE: &str = "display";

/// Errors raised by room operations and room builders.
#[derive(Debug, Error, PartialEq)]
pub enum RoomError {
    #[error("room '{room}': unknown source list '{list}'")]
    UnknownSourceList { room: String, list: String },

    #[error("room '{room}': source '{source_key}' is not in list '{list}'")]
    UnknownSource {
        room: String,
        list: String,
        source_key: String,
    },

    #[error("room '{room}': no source to resume")]
    NothingToResume { room: String },

    #[error("room '{0}': invalid properties: {1}")]
    InvalidProperties(String, String),
}

/// When sink power-off clears the room's current source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerOffPolicy {
    /// Any sink turning off clears the room (single display).
    AnySinkOff,
    /// Only every sink being off clears the room (dual display).
    AllSinksOff,
}

/// Aggregate room state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    Off,
    Warming,
    On,
    Cooling,
}

/// One sink the room routes to and watches.
pub struct SinkBinding {
    pub role: String,
    /// Destination-list key the sink was resolved from, if any.
    pub destination_key: Option<String>,
    pub device: DeviceHandle,
    warming: BoolFeedback,
    cooling: BoolFeedback,
}

impl SinkBinding {
    pub fn new(
        role: impl Into<String>,
        destination_key: Option<String>,
        device: DeviceHandle,
    ) -> Self {
        Self {
            role: role.into(),
            destination_key,
            device,
            warming: BoolFeedback::new(false),
            cooling: BoolFeedback::new(false),
        }
    }

    pub fn is_warming(&self) -> &BoolFeedback {
        &self.warming
    }

    pub fn is_cooling(&self) -> &BoolFeedback {
        &self.cooling
    }

    fn power_is_on(&self) -> bool {
        self.device
            .as_power()
            .map(|p| p.power_is_on().value())
            .unwrap_or(false)
    }
}

/// Everything needed to construct a [`Room`].
pub struct RoomSetup {
    pub key: String,
    pub name: String,
    pub type_name: String,
    pub source_list_key: String,
    pub default_audio_key: Option<String>,
    pub sinks: Vec<SinkBinding>,
    pub routing_enabled: bool,
    pub policy: PowerOffPolicy,
    /// Room-scoped tie lines, added on activation and removed on deactivation.
    pub tie_lines: Vec<TieLineConfig>,
}

#[derive(Default)]
struct Selection {
    /// Selection key and item of the active source; `None` means off.
    current: Option<(String, SourceListItem)>,
    /// Most recent non-off selection key.
    last_source_key: Option<String>,
    volume_device_key: Option<String>,
}

/// A meeting room: source selection plus N-sink power aggregation.
pub struct Room {
    key: String,
    name: String,
    type_name: String,
    self_ref: Weak<Room>,
    router: Arc<RoutingResolver>,
    config: Arc<SystemConfig>,
    source_list_key: String,
    default_audio_key: Option<String>,
    sinks: Vec<SinkBinding>,
    routing_enabled: bool,
    policy: PowerOffPolicy,
    tie_lines: Vec<TieLineConfig>,
    selection: Mutex<Selection>,
    on: BoolFeedback,
    warming: BoolFeedback,
    cooling: BoolFeedback,
    current_source_name: StringFeedback,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Room {
    pub fn new(
        setup: RoomSetup,
        router: Arc<RoutingResolver>,
        config: Arc<SystemConfig>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Room {
            key: setup.key,
            name: setup.name,
            type_name: setup.type_name,
            self_ref: self_ref.clone(),
            router,
            config,
            source_list_key: setup.source_list_key,
            default_audio_key: setup.default_audio_key,
            sinks: setup.sinks,
            routing_enabled: setup.routing_enabled,
            policy: setup.policy,
            tie_lines: setup.tie_lines,
            selection: Mutex::new(Selection::default()),
            on: BoolFeedback::new(false),
            warming: BoolFeedback::new(false),
            cooling: BoolFeedback::new(false),
            current_source_name: StringFeedback::default(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    fn selection(&self) -> MutexGuard<'_, Selection> {
        self.selection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry(&self) -> &Arc<DeviceRegistry> {
        self.router.registry()
    }

    /// Adds this room's own tie lines to the shared collection, tagged with
    /// the room key.  Lines whose endpoints do not resolve are skipped.
    fn add_room_tie_lines(&self) {
        for entry in &self.tie_lines {
            let line = TieLine::new(
                PortRef::new(&entry.source_key, &entry.source_port),
                PortRef::new(&entry.destination_key, &entry.destination_port),
                entry.signal,
            )
            .owned_by(&self.key);
            let text = line.to_string();
            if let Err(e) = self.router.add_tie_line(line) {
                warn!("[{}] skipping room tie line {text}: {e}", self.key);
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn current_source(&self) -> Option<SourceListItem> {
        self.selection().current.as_ref().map(|(_, item)| item.clone())
    }

    /// Selection key of the active source.
    pub fn current_source_key(&self) -> Option<String> {
        self.selection().current.as_ref().map(|(key, _)| key.clone())
    }

    pub fn last_source_key(&self) -> Option<String> {
        self.selection().last_source_key.clone()
    }

    pub fn volume_device_key(&self) -> Option<String> {
        self.selection().volume_device_key.clone()
    }

    /// `true` while a routed source is selected.
    pub fn is_on(&self) -> bool {
        self.selection()
            .current
            .as_ref()
            .map_or(false, |(_, item)| item.item_type == SourceItemType::Route)
    }

    pub fn state(&self) -> RoomState {
        if self.cooling.value() {
            RoomState::Cooling
        } else if self.warming.value() {
            RoomState::Warming
        } else if self.is_on() {
            RoomState::On
        } else {
            RoomState::Off
        }
    }

    pub fn sinks(&self) -> &[SinkBinding] {
        &self.sinks
    }

    /// The sink with the given role, e.g. [`LEFT_DISPLAY_ROLE`].
    pub fn sink(&self, role: &str) -> Option<&DeviceHandle> {
        self.sinks.iter().find(|s| s.role == role).map(|s| &s.device)
    }

    pub fn routing_enabled(&self) -> bool {
        self.routing_enabled
    }

    pub fn source_list_key(&self) -> &str {
        &self.source_list_key
    }

    pub fn on_feedback(&self) -> &BoolFeedback {
        &self.on
    }

    pub fn warming_feedback(&self) -> &BoolFeedback {
        &self.warming
    }

    pub fn cooling_feedback(&self) -> &BoolFeedback {
        &self.cooling
    }

    pub fn current_source_name_feedback(&self) -> &StringFeedback {
        &self.current_source_name
    }

    // ── Source selection ──────────────────────────────────────────────────────

    /// Selects `source_key` from `list_key` (or the room's default list).
    ///
    /// Selecting the off sentinel clears the current source, releases routes
    /// and powers the sinks off, leaving the last source key untouched.  Any
    /// other key becomes both the current and the last source; it is routed as
    /// audio+video to every sink, which are then powered on.
    pub fn select_source(&self, source_key: &str, list_key: Option<&str>) -> Result<(), RoomError> {
        let list_key = list_key.unwrap_or(&self.source_list_key);
        let list = self
            .config
            .source_list(list_key)
            .ok_or_else(|| RoomError::UnknownSourceList {
                room: self.key.clone(),
                list: list_key.to_string(),
            })?;
        let item = list
            .get(source_key)
            .cloned()
            .ok_or_else(|| RoomError::UnknownSource {
                room: self.key.clone(),
                list: list_key.to_string(),
                source_key: source_key.to_string(),
            })?;

        if item.is_off() {
            self.shut_down();
            return Ok(());
        }

        let volume_device_key = self.volume_device_for(&item);
        {
            let mut selection = self.selection();
            selection.current = Some((source_key.to_string(), item.clone()));
            selection.last_source_key = Some(source_key.to_string());
            selection.volume_device_key = volume_device_key;
        }
        info!("[{}] selected source '{}'", self.key, item.display_name());

        if item.item_type == SourceItemType::Route {
            self.route_to_sinks(&item.source_key);
        }
        self.publish();
        Ok(())
    }

    /// Powers the room off: same as selecting the off sentinel.
    pub fn shut_down(&self) {
        {
            let mut selection = self.selection();
            selection.current = None;
        }
        info!("[{}] shutting down", self.key);
        for sink in &self.sinks {
            self.router.release_route(sink.device.key());
            if let Some(power) = sink.device.as_power() {
                power.power_off();
            }
        }
        self.publish();
    }

    /// Re-selects the last non-off source.
    pub fn resume(&self) -> Result<(), RoomError> {
        let last = self
            .last_source_key()
            .ok_or_else(|| RoomError::NothingToResume {
                room: self.key.clone(),
            })?;
        self.select_source(&last, None)
    }

    fn route_to_sinks(&self, source_device_key: &str) {
        if !self.routing_enabled {
            warn!("[{}] routing disabled; '{source_device_key}' not routed", self.key);
            return;
        }
        for sink in &self.sinks {
            let sink_key = sink.device.key();
            if let Err(e) = self.router.route(source_device_key, sink_key, SignalType::AudioVideo) {
                warn!("[{}] cannot route '{source_device_key}' to '{sink_key}': {e}", self.key);
            }
            if let Some(power) = sink.device.as_power() {
                power.power_on();
            }
        }
    }

    /// Resolves which device receives volume commands for `item`.
    fn volume_device_for(&self, item: &SourceListItem) -> Option<String> {
        let first_sink = || self.sinks.first().map(|s| s.device.key().to_string());
        let key = match item.volume_control_key.as_deref() {
            None | Some(DEFAULT_AUDIO_KEY) => self.default_audio_key.clone().or_else(first_sink),
            Some(DEFAULT_DISPLAY_KEY) => first_sink(),
            Some(other) => Some(other.to_string()),
        }?;

        let supports_volume = self
            .registry()
            .get(&key)
            .map_or(false, |d| d.as_volume().is_some());
        if supports_volume {
            Some(key)
        } else {
            warn!("[{}] '{key}' cannot take volume commands", self.key);
            None
        }
    }

    fn with_volume_device<F>(&self, action: F)
    where
        F: FnOnce(&dyn VolumeControl),
    {
        let Some(key) = self.volume_device_key() else {
            debug!("[{}] no volume device selected", self.key);
            return;
        };
        if let Some(device) = self.registry().get(&key) {
            if let Some(volume) = device.as_volume() {
                action(volume);
            }
        }
    }

    // ── Sink feedback ─────────────────────────────────────────────────────────

    /// Applies a sink power change.
    ///
    /// - room on and the policy still sees a sink on: nothing to recompute;
    /// - the policy sees the room as off: the current source is cleared.
    ///
    /// The aggregate feedback is re-published in every case.
    pub fn on_sink_power_changed(&self) {
        let powers: Vec<bool> = self.sinks.iter().map(SinkBinding::power_is_on).collect();
        let clear = match self.policy {
            PowerOffPolicy::AnySinkOff => powers.iter().any(|on| !on),
            PowerOffPolicy::AllSinksOff => powers.iter().all(|on| !on),
        };

        if clear {
            let cleared = self.selection().current.take();
            if let Some((key, _)) = cleared {
                info!("[{}] sinks powered off; cleared source '{key}'", self.key);
            }
        } else {
            debug!("[{}] a sink is still on; keeping current source", self.key);
        }
        self.publish();
    }

    /// Re-reads every sink's warming and cooling feedback.
    pub fn refresh_transitions(&self) {
        for sink in &self.sinks {
            if let Some(power) = sink.device.as_power() {
                sink.warming.set(power.is_warming_up().value());
                sink.cooling.set(power.is_cooling_down().value());
            }
        }
        self.warming.set(self.sinks.iter().any(|s| s.warming.value()));
        self.cooling.set(self.sinks.iter().any(|s| s.cooling.value()));
    }

    /// Recomputes and publishes room feedback.
    fn publish(&self) {
        let name = self
            .selection()
            .current
            .as_ref()
            .map(|(_, item)| item.display_name().to_string())
            .unwrap_or_default();
        self.current_source_name.set(name);
        self.on.set(self.is_on());
        self.on.fire_update();
    }

    fn spawn_feedback_pumps(&self, runtime: &Handle) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();
        for sink in &self.sinks {
            let Some(power) = sink.device.as_power() else {
                warn!("[{}] sink '{}' reports no power state", self.key, sink.device.key());
                continue;
            };
            let mut power_rx = power.power_is_on().subscribe();
            let mut warming_rx = power.is_warming_up().subscribe();
            let mut cooling_rx = power.is_cooling_down().subscribe();
            let room = self.self_ref.clone();

            tasks.push(runtime.spawn(async move {
                loop {
                    let power_changed = tokio::select! {
                        r = power_rx.changed() => r.map(|_| true),
                        r = warming_rx.changed() => r.map(|_| false),
                        r = cooling_rx.changed() => r.map(|_| false),
                    };
                    let Ok(power_changed) = power_changed else { break };
                    let Some(room) = room.upgrade() else { break };
                    power_rx.borrow_and_update();
                    warming_rx.borrow_and_update();
                    cooling_rx.borrow_and_update();
                    room.refresh_transitions();
                    if power_changed {
                        room.on_sink_power_changed();
                    }
                }
            }));
        }
        tasks
    }

    // ── Bridge ────────────────────────────────────────────────────────────────

    /// The room's named join map before any offset.
    pub fn default_join_map(&self) -> JoinMap {
        let digital = |n, caps| JoinData::new(n, JoinKind::Digital, caps);
        let mut map = JoinMap::from_joins([
            ("roomOn", digital(1, JoinCapabilities::ToFromRemote).with_description("Room on / resume")),
            ("roomOff", digital(2, JoinCapabilities::FromRemote).with_description("Room off")),
            ("isWarming", digital(3, JoinCapabilities::ToRemote).with_description("Room warming")),
            ("isCooling", digital(4, JoinCapabilities::ToRemote).with_description("Room cooling")),
            ("volumeUp", digital(5, JoinCapabilities::FromRemote).with_description("Volume up")),
            ("volumeDown", digital(6, JoinCapabilities::FromRemote).with_description("Volume down")),
            ("volumeMuteToggle", digital(7, JoinCapabilities::FromRemote).with_description("Mute toggle")),
            (
                "selectSource",
                JoinData::new(1, JoinKind::Serial, JoinCapabilities::FromRemote)
                    .with_description("Select source by key"),
            ),
            (
                "currentSourceName",
                JoinData::new(2, JoinKind::Serial, JoinCapabilities::ToRemote)
                    .with_description("Current source name"),
            ),
        ]);
        for (i, sink) in self.sinks.iter().enumerate() {
            let base = 11 + 2 * i as u32;
            map.insert(
                format!("{}IsWarming", sink.role),
                digital(base, JoinCapabilities::ToRemote).with_description(format!("{} warming", sink.role)),
            );
            map.insert(
                format!("{}IsCooling", sink.role),
                digital(base + 1, JoinCapabilities::ToRemote).with_description(format!("{} cooling", sink.role)),
            );
        }
        map
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Device for Room {
    fn key(&self) -> &str {
        &self.key
    }

    fn name(&self) -> &str {
        if self.name.is_empty() {
            &self.key
        } else {
            &self.name
        }
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn activate(&self) -> Result<(), DeviceError> {
        self.add_room_tie_lines();
        self.refresh_transitions();
        match Handle::try_current() {
            Ok(runtime) => {
                let pumps = self.spawn_feedback_pumps(&runtime);
                self.tasks().extend(pumps);
            }
            Err(_) => warn!("[{}] no async runtime; sink feedback is not watched", self.key),
        }
        Ok(())
    }

    fn deactivate(&self) -> Result<(), DeviceError> {
        for task in self.tasks().drain(..) {
            task.abort();
        }
        let removed = self.router.tie_lines().remove_for_owner(&self.key);
        if removed > 0 {
            debug!("[{}] removed {removed} room tie line(s)", self.key);
        }
        Ok(())
    }

    fn as_volume(&self) -> Option<&dyn VolumeControl> {
        Some(self)
    }

    fn as_bridgeable(&self) -> Option<&dyn Bridgeable> {
        Some(self)
    }

    fn as_room(&self) -> Option<&Room> {
        Some(self)
    }
}

impl VolumeControl for Room {
    fn volume_up(&self, pressed: bool) {
        self.with_volume_device(|v| v.volume_up(pressed));
    }

    fn volume_down(&self, pressed: bool) {
        self.with_volume_device(|v| v.volume_down(pressed));
    }

    fn mute_toggle(&self) {
        self.with_volume_device(|v| v.mute_toggle());
    }
}

impl Bridgeable for Room {
    fn link_to_api(&self, request: LinkRequest) -> Result<(), BridgeError> {
        let mut map = request.load_join_map(&self.key, self.default_join_map());
        map.apply_offset(request.join_start)?;

        let mut binder = JoinBinder::new(&self.key, Arc::clone(&request.link), &map);

        let room = self.self_ref.clone();
        binder.on_bool("roomOn", move |pressed| {
            if let (true, Some(room)) = (pressed, room.upgrade()) {
                if let Err(e) = room.resume() {
                    warn!("{e}");
                }
            }
        });
        let room = self.self_ref.clone();
        binder.on_bool("roomOff", move |pressed| {
            if let (true, Some(room)) = (pressed, room.upgrade()) {
                room.shut_down();
            }
        });
        let room = self.self_ref.clone();
        binder.on_bool("volumeUp", move |pressed| {
            if let Some(room) = room.upgrade() {
                room.volume_up(pressed);
            }
        });
        let room = self.self_ref.clone();
        binder.on_bool("volumeDown", move |pressed| {
            if let Some(room) = room.upgrade() {
                room.volume_down(pressed);
            }
        });
        let room = self.self_ref.clone();
        binder.on_bool("volumeMuteToggle", move |pressed| {
            if let (true, Some(room)) = (pressed, room.upgrade()) {
                room.mute_toggle();
            }
        });
        let room = self.self_ref.clone();
        binder.on_string("selectSource", move |key| {
            if let Some(room) = room.upgrade() {
                if let Err(e) = room.select_source(&key, None) {
                    warn!("{e}");
                }
            }
        });

        binder.publish_bool("roomOn", &self.on);
        binder.publish_bool("isWarming", &self.warming);
        binder.publish_bool("isCooling", &self.cooling);
        binder.publish_string("currentSourceName", &self.current_source_name);
        for sink in &self.sinks {
            binder.publish_bool(&format!("{}IsWarming", sink.role), &sink.warming);
            binder.publish_bool(&format!("{}IsCooling", sink.role), &sink.cooling);
        }

        self.tasks().extend(binder.finish());
        request.register(&self.key, map);
        Ok(())
    }
}

// ── Room builders ─────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HuddleProperties {
    #[serde(default)]
    default_display_key: Option<String>,
    #[serde(default)]
    default_audio_key: Option<String>,
    #[serde(default)]
    source_list_key: Option<String>,
    #[serde(default)]
    tie_lines: Vec<TieLineConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DualDisplayProperties {
    #[serde(default)]
    destination_list_key: Option<String>,
    #[serde(default)]
    left_display_key: Option<String>,
    #[serde(default)]
    right_display_key: Option<String>,
    #[serde(default)]
    default_audio_key: Option<String>,
    #[serde(default)]
    source_list_key: Option<String>,
    #[serde(default)]
    tie_lines: Vec<TieLineConfig>,
}

/// Registers the `huddle` and `dualDisplay` room types.
pub fn register_room_types(factory: &mut DeviceFactory) {
    factory.register("huddle", "Single-display room", build_huddle_room);
    factory.register("dualDisplay", "Room with left and right displays", build_dual_display_room);
}

fn build_huddle_room(entry: &DeviceConfig, ctx: &BuildContext) -> BuildResult {
    let props: HuddleProperties = entry
        .properties()
        .map_err(|e| RoomError::InvalidProperties(entry.key.clone(), e.to_string()))?;

    let sink = props
        .default_display_key
        .as_deref()
        .and_then(|key| ctx.registry.get(key));
    let routing_enabled = sink.is_some();
    if !routing_enabled {
        error!(
            "[{}] default display '{}' not found; routing disabled",
            entry.key,
            props.default_display_key.as_deref().unwrap_or("<none>")
        );
    }

    let setup = RoomSetup {
        key: entry.key.clone(),
        name: entry.name.clone(),
        type_name: entry.type_name.clone(),
        source_list_key: props.source_list_key.unwrap_or_else(|| DEFAULT_LIST_KEY.to_string()),
        default_audio_key: props.default_audio_key,
        sinks: sink
            .map(|device| vec![SinkBinding::new(DISPLAY_ROLE, None, device)])
            .unwrap_or_default(),
        routing_enabled,
        policy: PowerOffPolicy::AnySinkOff,
        tie_lines: props.tie_lines,
    };
    Ok(Room::new(setup, Arc::clone(&ctx.router), Arc::clone(&ctx.config)))
}

fn build_dual_display_room(entry: &DeviceConfig, ctx: &BuildContext) -> BuildResult {
    let props: DualDisplayProperties = entry
        .properties()
        .map_err(|e| RoomError::InvalidProperties(entry.key.clone(), e.to_string()))?;
    let list_key = props
        .destination_list_key
        .clone()
        .unwrap_or_else(|| DEFAULT_LIST_KEY.to_string());

    let left = resolve_display(
        &entry.key,
        ctx,
        &list_key,
        props.left_display_key.as_deref().unwrap_or(LEFT_DISPLAY_ROLE),
        0,
        LEFT_DISPLAY_ROLE,
    );
    let right = resolve_display(
        &entry.key,
        ctx,
        &list_key,
        props.right_display_key.as_deref().unwrap_or(RIGHT_DISPLAY_ROLE),
        1,
        RIGHT_DISPLAY_ROLE,
    );

    let routing_enabled = left.is_some() && right.is_some();
    if !routing_enabled {
        error!("[{}] display resolution failed; routing disabled for this room", entry.key);
    }

    let setup = RoomSetup {
        key: entry.key.clone(),
        name: entry.name.clone(),
        type_name: entry.type_name.clone(),
        source_list_key: props.source_list_key.unwrap_or_else(|| DEFAULT_LIST_KEY.to_string()),
        default_audio_key: props.default_audio_key,
        sinks: [left, right].into_iter().flatten().collect(),
        routing_enabled,
        policy: PowerOffPolicy::AllSinksOff,
        tie_lines: props.tie_lines,
    };
    Ok(Room::new(setup, Arc::clone(&ctx.router), Arc::clone(&ctx.config)))
}

/// Finds a display by destination key, then by position (surface 0, row 0,
/// column `column`).
fn resolve_display(
    room_key: &str,
    ctx: &BuildContext,
    list_key: &str,
    destination_key: &str,
    column: u32,
    role: &str,
) -> Option<SinkBinding> {
    let Some(list) = ctx.config.destination_list(list_key) else {
        error!("[{room_key}] destination list '{list_key}' not found");
        return None;
    };

    let found = list
        .get_key_value(destination_key)
        .or_else(|| {
            debug!("[{room_key}] no destination '{destination_key}'; trying position (0, {column}, 0)");
            find_at_position(list, 0, column, 0)
        });
    let Some((found_key, item)) = found else {
        error!("[{room_key}] no {role} at '{destination_key}' or position (0, {column}, 0)");
        return None;
    };

    match ctx.registry.get(&item.sink_key) {
        Some(device) => Some(SinkBinding::new(role, Some(found_key.clone()), device)),
        None => {
            error!("[{room_key}] {role} device '{}' is not registered", item.sink_key);
            None
        }
    }
}
