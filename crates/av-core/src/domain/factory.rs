//! The config-driven device factory.
//!
//! Every device type the controller knows about is contributed by some module
//! calling [`DeviceFactory::register`] with a type name and a builder
//! function.  [`DeviceFactory::build`] looks an entry's `type` up
//! case-insensitively and runs the builder.
//!
//! Built devices are returned, never registered: the caller decides whether a
//! device becomes live.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{DeviceConfig, SystemConfig};
use crate::domain::registry::{DeviceHandle, DeviceRegistry};
use crate::domain::routing::RoutingResolver;
use crate::protocol::bridge::{BridgeJoinTables, JoinMapOverrides};

/// What a builder returns.
pub type BuildResult = Result<DeviceHandle, Box<dyn StdError + Send + Sync>>;

/// A builder function for one device type.
pub type BuildFn = Arc<dyn Fn(&DeviceConfig, &BuildContext) -> BuildResult + Send + Sync>;

/// Errors returned by [`DeviceFactory::build`].
#[derive(Debug, Error, PartialEq)]
pub enum FactoryError {
    #[error("device '{key}': unknown type '{type_name}'")]
    UnknownType { key: String, type_name: String },

    #[error("device '{key}': construction failed: {reason}")]
    ConstructionFailed { key: String, reason: String },
}

/// Shared state handed to every builder.
#[derive(Clone)]
pub struct BuildContext {
    pub registry: Arc<DeviceRegistry>,
    pub router: Arc<RoutingResolver>,
    pub config: Arc<SystemConfig>,
    pub bridge_tables: Arc<BridgeJoinTables>,
    pub join_map_overrides: Arc<JoinMapOverrides>,
}

impl BuildContext {
    pub fn new(
        router: Arc<RoutingResolver>,
        config: Arc<SystemConfig>,
        bridge_tables: Arc<BridgeJoinTables>,
    ) -> Self {
        let join_map_overrides = Arc::new(config.join_maps.clone());
        Self {
            registry: Arc::clone(router.registry()),
            router,
            config,
            bridge_tables,
            join_map_overrides,
        }
    }
}

struct Registration {
    type_name: String,
    description: String,
    build: BuildFn,
}

/// Table of device builders keyed by lower-cased type name.
#[derive(Default)]
pub struct DeviceFactory {
    builders: HashMap<String, Registration>,
}

impl DeviceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a builder for `type_name`.
    ///
    /// The first registration of a type wins; later ones are logged and
    /// ignored.  Returns `false` when the type was already registered.
    pub fn register<F>(&mut self, type_name: &str, description: &str, build: F) -> bool
    where
        F: Fn(&DeviceConfig, &BuildContext) -> BuildResult + Send + Sync + 'static,
    {
        let lookup = type_name.to_lowercase();
        if let Some(existing) = self.builders.get(&lookup) {
            warn!(
                "device type '{type_name}' is already provided as '{}'; ignoring duplicate",
                existing.type_name
            );
            return false;
        }
        self.builders.insert(
            lookup,
            Registration {
                type_name: type_name.to_string(),
                description: description.to_string(),
                build: Arc::new(build),
            },
        );
        true
    }

    pub fn supports(&self, type_name: &str) -> bool {
        self.builders.contains_key(&type_name.to_lowercase())
    }

    /// Builds the device described by `entry`.
    ///
    /// # Errors
    ///
    /// - [`FactoryError::UnknownType`] if no builder handles `entry.type_name`.
    /// - [`FactoryError::ConstructionFailed`] if the builder returns an error
    ///   or panics.
    pub fn build(
        &self,
        entry: &DeviceConfig,
        ctx: &BuildContext,
    ) -> Result<DeviceHandle, FactoryError> {
        let registration = self
            .builders
            .get(&entry.type_name.to_lowercase())
            .ok_or_else(|| FactoryError::UnknownType {
                key: entry.key.clone(),
                type_name: entry.type_name.clone(),
            })?;

        debug!("building '{}' as {}", entry.key, registration.type_name);
        let build = Arc::clone(&registration.build);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| build(entry, ctx)));

        match outcome {
            Ok(Ok(device)) => Ok(device),
            Ok(Err(e)) => Err(FactoryError::ConstructionFailed {
                key: entry.key.clone(),
                reason: e.to_string(),
            }),
            Err(payload) => Err(FactoryError::ConstructionFailed {
                key: entry.key.clone(),
                reason: panic_message(payload.as_ref()),
            }),
        }
    }

    /// `(type name, description)` pairs sorted by type name, optionally
    /// filtered by a case-insensitive substring.
    pub fn type_names(&self, filter: Option<&str>) -> Vec<(String, String)> {
        let filter = filter.map(str::to_lowercase);
        let mut types: Vec<_> = self
            .builders
            .iter()
            .filter(|(lookup, _)| filter.as_deref().map_or(true, |f| lookup.contains(f)))
            .map(|(_, r)| (r.type_name.clone(), r.description.clone()))
            .collect();
        types.sort();
        types
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("builder panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("builder panicked: {s}")
    } else {
        "builder panicked".to_string()
    }
}
