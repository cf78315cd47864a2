//! # av-core
//!
//! Shared library for the AV room controller: the device registry, the
//! config-driven factory, tie-line routing, the room state machine and the
//! join-map bridge protocol.
//!
//! It has no file-system access and no CLI; the `av-controller` application
//! loads configuration and hands this crate an already-parsed object.
//!
//! # Architecture overview (for beginners)
//!
//! An AV controller runs a meeting room: it turns displays on, switches the
//! laptop on the table through a matrix switcher to the right screen, and
//! shows all of that on a touch panel.  Everything is described in a config
//! file; nothing is hard-coded.
//!
//! Data flows one way at startup:
//!
//! ```text
//! config ──▶ factory ──▶ registry ──▶ routing / rooms ──▶ bridges
//! ```
//!
//! and both ways at runtime: touch-panel presses flow through a bridge into a
//! room or device, and state changes flow back out as feedback.
//!
//! - **`domain`** – devices, the registry, tie lines, routing, rooms and the
//!   factory that builds them.
//! - **`protocol`** – join maps and the link/bridge contract used to expose
//!   devices on a control surface.
//! - **`config`** – the in-memory system configuration object.

pub mod config;
pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `av_core::DeviceRegistry` instead of `av_core::domain::registry::DeviceRegistry`.
pub use config::{DeviceConfig, SystemConfig, TieLineConfig};
pub use domain::device::{
    Capability, Device, DeviceError, HasPowerFeedback, Port, PortDirection, PortKind,
    RoutingSwitcher, SignalType, VolumeControl, PROCESSOR_KEY,
};
pub use domain::factory::{BuildContext, BuildResult, DeviceFactory, FactoryError};
pub use domain::feedback::{BoolFeedback, Feedback, IntFeedback, StringFeedback};
pub use domain::registry::{DeviceHandle, DeviceRegistry, RegistryError};
pub use domain::room::{Room, RoomError, RoomState};
pub use domain::routing::{Route, RouteStep, RoutingError, RoutingResolver};
pub use domain::tie_line::{TieLine, TieLineCollection};
pub use protocol::bridge::{BridgeError, BridgeJoinTables, Bridgeable, LinkRequest};
pub use protocol::join_map::{JoinMap, JoinMapError};
pub use protocol::link::{ControlLink, MemoryLink};
