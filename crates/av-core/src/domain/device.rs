//! The device abstraction and its capability traits.
//!
//! Every live object in the controller (displays, switchers, IR controllers,
//! bridges, even rooms) is a [`Device`]: something with a unique, immutable,
//! case-sensitive key that the [`DeviceRegistry`](super::registry::DeviceRegistry)
//! can own.
//!
//! # Capabilities instead of a class hierarchy (for beginners)
//!
//! Rather than a deep inheritance chain ("a display is a routing sink is a
//! device …"), a device advertises what it can do through accessor methods
//! such as [`Device::as_power`] or [`Device::as_switcher`].  Each accessor
//! returns `Some(&dyn Trait)` when the device supports that capability and
//! `None` otherwise.  Callers ask for exactly the capability they need:
//!
//! ```text
//! registry.get("display-1")?.as_power()?.power_on();
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::feedback::BoolFeedback;
use crate::domain::room::Room;
use crate::protocol::bridge::Bridgeable;

/// The reserved device key of the controlling processor itself.
///
/// A config entry with this key is never built through the generic factory.
pub const PROCESSOR_KEY: &str = "processor";

/// The kind of signal carried by a tie line or requested by a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SignalType {
    Audio,
    Video,
    #[serde(alias = "audiovideo", alias = "AudioVideo")]
    AudioVideo,
}

impl SignalType {
    /// Returns `true` if a connection of this type can carry `requested`.
    ///
    /// An audio+video connection carries either component; a single-component
    /// connection only carries its own kind.
    pub fn carries(self, requested: SignalType) -> bool {
        match self {
            SignalType::AudioVideo => true,
            SignalType::Audio => requested == SignalType::Audio,
            SignalType::Video => requested == SignalType::Video,
        }
    }
}

impl Default for SignalType {
    fn default() -> Self {
        SignalType::AudioVideo
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalType::Audio => "audio",
            SignalType::Video => "video",
            SignalType::AudioVideo => "audioVideo",
        };
        f.write_str(name)
    }
}

/// Whether a port receives or emits a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PortDirection {
    Input,
    Output,
}

/// The physical type of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PortKind {
    Video,
    Audio,
    AudioVideo,
    Ir,
    Serial,
}

impl PortKind {
    /// The routable signal carried by this port, if any.  IR and serial ports
    /// are control ports and never take part in signal routing.
    pub fn signal(self) -> Option<SignalType> {
        match self {
            PortKind::Video => Some(SignalType::Video),
            PortKind::Audio => Some(SignalType::Audio),
            PortKind::AudioVideo => Some(SignalType::AudioVideo),
            PortKind::Ir | PortKind::Serial => None,
        }
    }
}

/// A named, typed endpoint on a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub key: String,
    pub kind: PortKind,
    pub direction: PortDirection,
}

impl Port {
    pub fn input(key: impl Into<String>, kind: PortKind) -> Self {
        Self {
            key: key.into(),
            kind,
            direction: PortDirection::Input,
        }
    }

    pub fn output(key: impl Into<String>, kind: PortKind) -> Self {
        Self {
            key: key.into(),
            kind,
            direction: PortDirection::Output,
        }
    }
}

/// Capability tags reported by [`Device::capabilities`] for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Routable,
    HasPowerFeedback,
    VolumeControl,
    Bridgeable,
    Room,
}

/// Errors raised by device operations and lifecycle hooks.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeviceError {
    #[error("activation failed: {0}")]
    Activation(String),

    #[error("device has no port '{0}'")]
    UnknownPort(String),

    #[error("command rejected: {0}")]
    Command(String),
}

/// A live, registered entity.
///
/// Only `key` and `type_name` are required; every capability defaults to
/// "not supported".
pub trait Device: Send + Sync {
    /// Unique, immutable, case-sensitive identifier.
    fn key(&self) -> &str;

    /// Human-readable name; defaults to the key.
    fn name(&self) -> &str {
        self.key()
    }

    /// The config `type` this device was built from (for diagnostics).
    fn type_name(&self) -> &str;

    /// Routing and control ports owned by this device.
    fn ports(&self) -> &[Port] {
        &[]
    }

    /// Post-construction hook, run once every configured device exists.
    fn activate(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    /// Teardown hook, symmetric to [`Device::activate`].
    fn deactivate(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn as_power(&self) -> Option<&dyn HasPowerFeedback> {
        None
    }

    fn as_switcher(&self) -> Option<&dyn RoutingSwitcher> {
        None
    }

    fn as_volume(&self) -> Option<&dyn VolumeControl> {
        None
    }

    fn as_bridgeable(&self) -> Option<&dyn Bridgeable> {
        None
    }

    fn as_room(&self) -> Option<&Room> {
        None
    }

    /// Finds a port by key and direction.
    fn port(&self, key: &str, direction: PortDirection) -> Option<&Port> {
        self.ports()
            .iter()
            .find(|p| p.key == key && p.direction == direction)
    }

    /// Lists the capabilities this device exposes.
    fn capabilities(&self) -> Vec<Capability> {
        let mut caps = Vec::new();
        if self.as_switcher().is_some() {
            caps.push(Capability::Routable);
        }
        if self.as_power().is_some() {
            caps.push(Capability::HasPowerFeedback);
        }
        if self.as_volume().is_some() {
            caps.push(Capability::VolumeControl);
        }
        if self.as_bridgeable().is_some() {
            caps.push(Capability::Bridgeable);
        }
        if self.as_room().is_some() {
            caps.push(Capability::Room);
        }
        caps
    }
}

/// A sink that reports power, warm-up and cool-down state.
pub trait HasPowerFeedback: Send + Sync {
    fn power_is_on(&self) -> &BoolFeedback;
    fn is_warming_up(&self) -> &BoolFeedback;
    fn is_cooling_down(&self) -> &BoolFeedback;
    fn power_on(&self);
    fn power_off(&self);
}

/// A device that can connect one of its inputs to one of its outputs.
///
/// Sinks (displays) implement this with `output_port == None`: selecting an
/// input is their only switching action.
pub trait RoutingSwitcher: Send + Sync {
    fn execute_switch(
        &self,
        input_port: &str,
        output_port: Option<&str>,
        signal: SignalType,
    ) -> Result<(), DeviceError>;
}

/// A device that accepts volume commands.
pub trait VolumeControl: Send + Sync {
    fn volume_up(&self, pressed: bool);
    fn volume_down(&self, pressed: bool);
    fn mute_toggle(&self);
}
