//! A generic display: power with warm-up and cool-down, input selection and
//! volume.
//!
//! Power transitions run on a timer.  Turning the display on raises the power
//! feedback at once and holds `is_warming_up` for the configured warm-up time;
//! turning it off drops power and holds `is_cooling_down` for the cool-down
//! time.  A zero duration skips that phase entirely.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use av_core::domain::device::PortDirection;
use av_core::domain::factory::BuildResult;
use av_core::protocol::binding::JoinBinder;
use av_core::protocol::join_map::{JoinCapabilities, JoinData, JoinKind};
use av_core::{
    BoolFeedback, BridgeError, Bridgeable, BuildContext, Device, DeviceConfig, DeviceError,
    DeviceFactory, HasPowerFeedback, IntFeedback, JoinMap, LinkRequest, Port, PortKind,
    RoutingSwitcher, SignalType, StringFeedback, VolumeControl,
};
use serde::Deserialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const DEFAULT_VOLUME_STEP: u16 = 1310;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayProperties {
    #[serde(default = "default_inputs")]
    pub inputs: Vec<String>,
    #[serde(default = "default_warmup_ms")]
    pub warmup_time_ms: u64,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_time_ms: u64,
    #[serde(default = "default_volume_step")]
    pub volume_step: u16,
}

fn default_inputs() -> Vec<String> {
    vec!["hdmiIn1".to_string()]
}
fn default_warmup_ms() -> u64 {
    10_000
}
fn default_cooldown_ms() -> u64 {
    8_000
}
fn default_volume_step() -> u16 {
    DEFAULT_VOLUME_STEP
}

impl Default for DisplayProperties {
    fn default() -> Self {
        Self {
            inputs: default_inputs(),
            warmup_time_ms: default_warmup_ms(),
            cooldown_time_ms: default_cooldown_ms(),
            volume_step: default_volume_step(),
        }
    }
}

pub struct Display {
    key: String,
    name: String,
    self_ref: Weak<Display>,
    ports: Vec<Port>,
    warmup: Duration,
    cooldown: Duration,
    volume_step: u16,

    power: BoolFeedback,
    warming: BoolFeedback,
    cooling: BoolFeedback,
    current_input: StringFeedback,
    volume: IntFeedback,
    muted: BoolFeedback,

    transition: Mutex<Option<JoinHandle<()>>>,
    bridge_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Display {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        props: DisplayProperties,
    ) -> Arc<Self> {
        let ports = props
            .inputs
            .iter()
            .map(|input| Port::input(input.as_str(), PortKind::AudioVideo))
            .collect();
        Arc::new_cyclic(|self_ref| Self {
            key: key.into(),
            name: name.into(),
            self_ref: self_ref.clone(),
            ports,
            warmup: Duration::from_millis(props.warmup_time_ms),
            cooldown: Duration::from_millis(props.cooldown_time_ms),
            volume_step: props.volume_step,
            power: BoolFeedback::new(false),
            warming: BoolFeedback::new(false),
            cooling: BoolFeedback::new(false),
            current_input: StringFeedback::default(),
            volume: IntFeedback::new(0),
            muted: BoolFeedback::new(false),
            transition: Mutex::new(None),
            bridge_tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn current_input(&self) -> &StringFeedback {
        &self.current_input
    }

    pub fn volume(&self) -> &IntFeedback {
        &self.volume
    }

    pub fn is_muted(&self) -> &BoolFeedback {
        &self.muted
    }

    fn transition(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.transition.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Raises `phase` for `duration`, cancelling any transition in flight.
    fn start_transition(&self, duration: Duration, phase: fn(&Display) -> &BoolFeedback) {
        let mut slot = self.transition();
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        self.warming.set(false);
        self.cooling.set(false);

        if duration.is_zero() {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            debug!("[{}] no async runtime; skipping {duration:?} transition", self.key);
            return;
        };

        phase(self).set(true);
        let me = self.self_ref.clone();
        *slot = Some(runtime.spawn(async move {
            tokio::time::sleep(duration).await;
            if let Some(display) = me.upgrade() {
                phase(&display).set(false);
            }
        }));
    }

    pub fn default_join_map() -> JoinMap {
        let digital = |n, caps| JoinData::new(n, JoinKind::Digital, caps);
        JoinMap::from_joins([
            ("powerOn", digital(1, JoinCapabilities::ToFromRemote).with_description("Power on")),
            ("powerOff", digital(2, JoinCapabilities::ToFromRemote).with_description("Power off")),
            ("isWarming", digital(3, JoinCapabilities::ToRemote).with_description("Warming up")),
            ("isCooling", digital(4, JoinCapabilities::ToRemote).with_description("Cooling down")),
            ("volumeUp", digital(5, JoinCapabilities::FromRemote).with_description("Volume up")),
            ("volumeDown", digital(6, JoinCapabilities::FromRemote).with_description("Volume down")),
            ("volumeMuteToggle", digital(7, JoinCapabilities::FromRemote).with_description("Mute toggle")),
            ("volumeMuteOn", digital(8, JoinCapabilities::ToRemote).with_description("Muted")),
            (
                "volumeLevel",
                JoinData::new(1, JoinKind::Analog, JoinCapabilities::ToRemote).with_description("Volume level"),
            ),
            (
                "name",
                JoinData::new(1, JoinKind::Serial, JoinCapabilities::ToRemote).with_description("Display name"),
            ),
            (
                "selectInput",
                JoinData::new(2, JoinKind::Serial, JoinCapabilities::ToFromRemote)
                    .with_description("Select input by port key"),
            ),
        ])
    }
}

fn warming_phase(display: &Display) -> &BoolFeedback {
    &display.warming
}

fn cooling_phase(display: &Display) -> &BoolFeedback {
    &display.cooling
}

impl Device for Display {
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
        "display"
    }

    fn ports(&self) -> &[Port] {
        &self.ports
    }

    fn deactivate(&self) -> Result<(), DeviceError> {
        if let Some(task) = self.transition().take() {
            task.abort();
        }
        for task in self
            .bridge_tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }
        Ok(())
    }

    fn as_power(&self) -> Option<&dyn HasPowerFeedback> {
        Some(self)
    }

    fn as_switcher(&self) -> Option<&dyn RoutingSwitcher> {
        Some(self)
    }

    fn as_volume(&self) -> Option<&dyn VolumeControl> {
        Some(self)
    }

    fn as_bridgeable(&self) -> Option<&dyn Bridgeable> {
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
        if self.power.value() && !self.cooling.value() {
            return;
        }
        info!("[{}] power on", self.key);
        self.power.set(true);
        self.start_transition(self.warmup, warming_phase);
    }

    fn power_off(&self) {
        if !self.power.value() {
            return;
        }
        info!("[{}] power off", self.key);
        self.power.set(false);
        self.start_transition(self.cooldown, cooling_phase);
    }
}

impl RoutingSwitcher for Display {
    fn execute_switch(
        &self,
        input_port: &str,
        _output_port: Option<&str>,
        _signal: SignalType,
    ) -> Result<(), DeviceError> {
        if self.port(input_port, PortDirection::Input).is_none() {
            return Err(DeviceError::UnknownPort(input_port.to_string()));
        }
        self.power_on();
        if self.current_input.set(input_port.to_string()) {
            info!("[{}] input -> {input_port}", self.key);
        }
        Ok(())
    }
}

impl VolumeControl for Display {
    fn volume_up(&self, pressed: bool) {
        if pressed {
            self.volume.set(self.volume.value().saturating_add(self.volume_step));
        }
    }

    fn volume_down(&self, pressed: bool) {
        if pressed {
            self.volume.set(self.volume.value().saturating_sub(self.volume_step));
        }
    }

    fn mute_toggle(&self) {
        self.muted.set(!self.muted.value());
    }
}

impl Bridgeable for Display {
    fn link_to_api(&self, request: LinkRequest) -> Result<(), BridgeError> {
        let mut map = request.load_join_map(&self.key, Self::default_join_map());
        map.apply_offset(request.join_start)?;
        let mut binder = JoinBinder::new(&self.key, Arc::clone(&request.link), &map);

        let me = self.self_ref.clone();
        binder.on_bool("powerOn", move |pressed| {
            if let (true, Some(display)) = (pressed, me.upgrade()) {
                display.power_on();
            }
        });
        let me = self.self_ref.clone();
        binder.on_bool("powerOff", move |pressed| {
            if let (true, Some(display)) = (pressed, me.upgrade()) {
                display.power_off();
            }
        });
        let me = self.self_ref.clone();
        binder.on_bool("volumeUp", move |pressed| {
            if let Some(display) = me.upgrade() {
                display.volume_up(pressed);
            }
        });
        let me = self.self_ref.clone();
        binder.on_bool("volumeDown", move |pressed| {
            if let Some(display) = me.upgrade() {
                display.volume_down(pressed);
            }
        });
        let me = self.self_ref.clone();
        binder.on_bool("volumeMuteToggle", move |pressed| {
            if let (true, Some(display)) = (pressed, me.upgrade()) {
                display.mute_toggle();
            }
        });
        let me = self.self_ref.clone();
        binder.on_string("selectInput", move |input| {
            if let Some(this) = me.upgrade() {
                if let Err(e) = this.execute_switch(&input, None, SignalType::AudioVideo) {
                    warn!("[{}] {e}", this.key);
                }
            }
        });

        binder.publish_bool("powerOn", &self.power);
        binder.publish_bool("isWarming", &self.warming);
        binder.publish_bool("isCooling", &self.cooling);
        binder.publish_bool("volumeMuteOn", &self.muted);
        binder.publish_ushort("volumeLevel", &self.volume);
        binder.publish_string("selectInput", &self.current_input);
        if let Some(join) = map.join_number("powerOff") {
            request.link.set_bool(join, !self.power.value());
        }
        if let Some(join) = map.join_number("name") {
            request.link.set_string(join, self.name());
        }

        self.bridge_tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(binder.finish());
        request.register(&self.key, map);
        Ok(())
    }
}

pub fn register(factory: &mut DeviceFactory) {
    factory.register("display", "Generic display with power, inputs and volume", build_display);
}

fn build_display(entry: &DeviceConfig, _ctx: &BuildContext) -> BuildResult {
    let props: DisplayProperties = entry.properties()?;
    if props.inputs.is_empty() {
        return Err(format!("display '{}' declares no inputs", entry.key).into());
    }
    Ok(Display::new(entry.key.clone(), entry.name.clone(), props))
}
