//! EISC bridges: expose configured devices on a control-surface link.
//!
//! A bridge owns one [`MemoryLink`] and a list of `{deviceKey, joinStart,
//! joinMapKey}` entries.  On activation it calls `link_to_api` on every
//! listed device.
//!
//! - `eiscApiAdvanced` passes itself as the registration point, so each
//!   device's join map lands in the [`BridgeJoinTables`] for diagnostics.
//! - `eiscApi` is the legacy form: devices still bind, but record nothing and
//!   log an upgrade warning.
//!
//! Live links are also published in [`BridgeLinks`] so the console can
//! simulate inbound writes.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use av_core::domain::factory::BuildResult;
use av_core::protocol::bridge::{BridgeRegistration, JoinMapOverrides};
use av_core::{
    BridgeJoinTables, BuildContext, ControlLink, Device, DeviceConfig, DeviceError, DeviceFactory,
    DeviceRegistry, LinkRequest, MemoryLink,
};
use serde::Deserialize;
use tracing::{error, info, warn};

use super::DeviceServices;

/// Live bridge links keyed by bridge key.
#[derive(Default)]
pub struct BridgeLinks {
    links: Mutex<BTreeMap<String, Arc<MemoryLink>>>,
}

impl BridgeLinks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Arc<MemoryLink>>> {
        self.links.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, bridge_key: &str, link: Arc<MemoryLink>) {
        self.lock().insert(bridge_key.to_string(), link);
    }

    pub fn get(&self, bridge_key: &str) -> Option<Arc<MemoryLink>> {
        self.lock().get(bridge_key).cloned()
    }

    pub fn remove(&self, bridge_key: &str) {
        self.lock().remove(bridge_key);
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BridgedDevice {
    pub device_key: String,
    #[serde(default)]
    pub join_start: u32,
    #[serde(default)]
    pub join_map_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BridgeProperties {
    #[serde(default)]
    devices: Vec<BridgedDevice>,
}

pub struct EiscBridge {
    key: String,
    name: String,
    type_name: String,
    advanced: bool,
    link: Arc<MemoryLink>,
    devices: Vec<BridgedDevice>,
    registry: Arc<DeviceRegistry>,
    tables: Arc<BridgeJoinTables>,
    overrides: Arc<JoinMapOverrides>,
    links: Arc<BridgeLinks>,
}

impl EiscBridge {
    pub fn link(&self) -> &Arc<MemoryLink> {
        &self.link
    }

    pub fn devices(&self) -> &[BridgedDevice] {
        &self.devices
    }

    fn link_device(&self, entry: &BridgedDevice) {
        let Some(device) = self.registry.get(&entry.device_key) else {
            warn!("[{}] device '{}' not found; not bridged", self.key, entry.device_key);
            return;
        };
        let Some(bridgeable) = device.as_bridgeable() else {
            warn!("[{}] device '{}' is not bridgeable", self.key, entry.device_key);
            return;
        };

        let link: Arc<dyn ControlLink> = Arc::clone(&self.link) as Arc<dyn ControlLink>;
        let mut request = LinkRequest::new(link, entry.join_start)
            .with_overrides(Arc::clone(&self.overrides));
        if let Some(map_key) = &entry.join_map_key {
            request = request.with_join_map_key(map_key.clone());
        }
        if self.advanced {
            let registration = BridgeRegistration::new(&self.key, Arc::clone(&self.tables));
            request = request.with_registration(registration);
        }

        match bridgeable.link_to_api(request) {
            Ok(()) => info!(
                "[{}] linked '{}' at join {}",
                self.key, entry.device_key, entry.join_start
            ),
            Err(e) => error!("[{}] linking '{}' failed: {e}", self.key, entry.device_key),
        }
    }
}

impl Device for EiscBridge {
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
        self.tables.remove_bridge(&self.key);
        self.links.insert(&self.key, Arc::clone(&self.link));
        for entry in &self.devices {
            self.link_device(entry);
        }
        Ok(())
    }

    fn deactivate(&self) -> Result<(), DeviceError> {
        self.links.remove(&self.key);
        self.tables.remove_bridge(&self.key);
        self.link.clear();
        Ok(())
    }
}

pub fn register(factory: &mut DeviceFactory, services: &DeviceServices) {
    let links = Arc::clone(&services.links);
    factory.register(
        "eiscApiAdvanced",
        "Bridge that records join maps for diagnostics",
        move |entry, ctx| build_bridge(entry, ctx, true, &links),
    );
    let links = Arc::clone(&services.links);
    factory.register(
        "eiscApi",
        "Legacy bridge without join map registration",
        move |entry, ctx| build_bridge(entry, ctx, false, &links),
    );
}

fn build_bridge(
    entry: &DeviceConfig,
    ctx: &BuildContext,
    advanced: bool,
    links: &Arc<BridgeLinks>,
) -> BuildResult {
    let props: BridgeProperties = entry.properties()?;
    Ok(Arc::new(EiscBridge {
        key: entry.key.clone(),
        name: entry.name.clone(),
        type_name: entry.type_name.clone(),
        advanced,
        link: Arc::new(MemoryLink::new(entry.key.clone())),
        devices: props.devices,
        registry: Arc::clone(&ctx.registry),
        tables: Arc::clone(&ctx.bridge_tables),
        overrides: Arc::clone(&ctx.join_map_overrides),
        links: Arc::clone(links),
    }))
}
