//! The bridge contract: exposing devices and rooms on a control-surface link.
//!
//! A bridge owns a [`ControlLink`] and, for every device it is configured to
//! expose, calls [`Bridgeable::link_to_api`] with a [`LinkRequest`].  The device
//! builds (or loads) its join map, offsets it, binds its actions and feedback
//! to the link, and finally records the map with the bridge's
//! [`BridgeRegistration`] so diagnostics can print the live join table.
//!
//! A request without a registration point comes from a legacy bridge.  The
//! device still binds, but its join map is not recorded anywhere.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::protocol::join_map::{JoinMap, JoinMapError};
use crate::protocol::link::ControlLink;

/// Errors raised by bridging.
#[derive(Debug, Error, PartialEq)]
pub enum BridgeError {
    #[error(transparent)]
    JoinMap(#[from] JoinMapError),

    #[error("bridge '{0}' has no recorded join maps")]
    UnknownBridge(String),

    #[error("device '{device}' is not on bridge '{bridge}'")]
    UnknownDevice { bridge: String, device: String },
}

/// A device or room whose signals can be exposed on a control-surface link.
pub trait Bridgeable: Send + Sync {
    /// Binds this device's signals to `request.link`.
    fn link_to_api(&self, request: LinkRequest) -> Result<(), BridgeError>;
}

/// Join-map overrides from the system configuration, keyed by join-map key.
pub type JoinMapOverrides = BTreeMap<String, Value>;

/// Arguments of one [`Bridgeable::link_to_api`] call.
#[derive(Clone)]
pub struct LinkRequest {
    pub link: Arc<dyn ControlLink>,
    /// Base offset added to every join address.
    pub join_start: u32,
    /// Identifier of an optional external join-map override.
    pub join_map_key: Option<String>,
    pub overrides: Arc<JoinMapOverrides>,
    /// Where to record the resulting join map; `None` for legacy bridges.
    pub registration: Option<BridgeRegistration>,
}

impl LinkRequest {
    pub fn new(link: Arc<dyn ControlLink>, join_start: u32) -> Self {
        Self {
            link,
            join_start,
            join_map_key: None,
            overrides: Arc::new(JoinMapOverrides::new()),
            registration: None,
        }
    }

    pub fn with_join_map_key(mut self, key: impl Into<String>) -> Self {
        self.join_map_key = Some(key.into());
        self
    }

    pub fn with_overrides(mut self, overrides: Arc<JoinMapOverrides>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_registration(mut self, registration: BridgeRegistration) -> Self {
        self.registration = Some(registration);
        self
    }

    /// The external override named by `join_map_key`, if one is configured.
    ///
    /// Overrides whose joins overlap within one kind are rejected.
    pub fn override_map(&self) -> Option<Result<JoinMap, JoinMapError>> {
        let key = self.join_map_key.as_deref()?;
        let value = self.overrides.get(key)?;
        Some(JoinMap::from_override(value).and_then(|map| {
            map.validate()?;
            Ok(map)
        }))
    }

    /// Returns the override map if one exists, parses and validates,
    /// otherwise `default`.
    ///
    /// A malformed or colliding override is logged and ignored.
    pub fn load_join_map(&self, device_key: &str, default: JoinMap) -> JoinMap {
        match self.override_map() {
            Some(Ok(map)) => {
                debug!("[{device_key}] using join map override '{:?}'", self.join_map_key);
                map
            }
            Some(Err(e)) => {
                warn!("[{device_key}] ignoring join map override: {e}");
                default
            }
            None => default,
        }
    }

    /// Records `map` with the registration point, or warns that the bridge is
    /// a legacy one.
    pub fn register(&self, device_key: &str, map: JoinMap) {
        match &self.registration {
            Some(registration) => registration.add_join_map(device_key, map),
            None => warn!(
                "[{device_key}] bridge features unavailable, upgrade configuration to 'eiscApiAdvanced'"
            ),
        }
    }
}

/// The registration point handed out by an advanced bridge.
#[derive(Clone)]
pub struct BridgeRegistration {
    bridge_key: String,
    tables: Arc<BridgeJoinTables>,
}

impl BridgeRegistration {
    pub fn new(bridge_key: impl Into<String>, tables: Arc<BridgeJoinTables>) -> Self {
        Self {
            bridge_key: bridge_key.into(),
            tables,
        }
    }

    pub fn bridge_key(&self) -> &str {
        &self.bridge_key
    }

    pub fn add_join_map(&self, device_key: &str, map: JoinMap) {
        self.tables.record(&self.bridge_key, device_key, map);
    }
}

/// Output format for join-table dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinTableFormat {
    Text,
    Markdown,
}

/// bridge key → device key → live join map.
#[derive(Default)]
pub struct BridgeJoinTables {
    tables: Mutex<BTreeMap<String, BTreeMap<String, JoinMap>>>,
}

impl BridgeJoinTables {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, BTreeMap<String, JoinMap>>> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records (or replaces) the map of `device_key` on `bridge_key`.
    pub fn record(&self, bridge_key: &str, device_key: &str, map: JoinMap) {
        self.lock()
            .entry(bridge_key.to_string())
            .or_default()
            .insert(device_key.to_string(), map);
    }

    pub fn get(&self, bridge_key: &str, device_key: &str) -> Option<JoinMap> {
        self.lock().get(bridge_key)?.get(device_key).cloned()
    }

    pub fn bridges(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn devices(&self, bridge_key: &str) -> Vec<String> {
        self.lock()
            .get(bridge_key)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn remove_bridge(&self, bridge_key: &str) {
        self.lock().remove(bridge_key);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Renders the join table of `bridge_key`, optionally for one device.
    pub fn print(
        &self,
        bridge_key: &str,
        device_key: Option<&str>,
        format: JoinTableFormat,
    ) -> Result<String, BridgeError> {
        let tables = self.lock();
        let table = tables
            .get(bridge_key)
            .ok_or_else(|| BridgeError::UnknownBridge(bridge_key.to_string()))?;

        let render = |key: &str, map: &JoinMap| match format {
            JoinTableFormat::Text => map.to_text(key),
            JoinTableFormat::Markdown => map.to_markdown(key),
        };

        match device_key {
            Some(device) => table
                .get(device)
                .map(|map| render(device, map))
                .ok_or_else(|| BridgeError::UnknownDevice {
                    bridge: bridge_key.to_string(),
                    device: device.to_string(),
                }),
            None => Ok(table
                .iter()
                .map(|(key, map)| render(key, map))
                .collect::<Vec<_>>()
                .join("\n")),
        }
    }
}
