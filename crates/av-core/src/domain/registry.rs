//! The Device Registry: the process-scoped catalog of live devices.
//!
//! The registry is the controller's in-memory database of every device built
//! from configuration.  It owns devices exclusively: nothing else may destroy
//! one, and every other component looks devices up here by key.
//!
//! # Concurrency (for beginners)
//!
//! Device activation hooks run while the registry is being iterated, and a
//! hook is allowed to look up (or even add) other devices.  If iteration held
//! the registry lock, such a hook would deadlock.  The registry therefore
//! keeps its device list as a copy-on-write snapshot:
//!
//! - Mutations (`add`, `remove`) take a short-lived mutex and, if any reader
//!   still holds the previous snapshot, copy the list before changing it.
//! - Readers ([`DeviceRegistry::all_devices`]) clone an `Arc` to the current
//!   snapshot and iterate it without any lock.  A snapshot taken before a
//!   concurrent mutation is never affected by it.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::domain::device::{Device, DeviceError};

/// Shared handle to a registered device.
pub type DeviceHandle = Arc<dyn Device>;

/// Errors returned by registry mutations.
#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    /// A device with the same key is already registered.
    #[error("a device with key '{0}' is already registered")]
    DuplicateKey(String),
}

/// An immutable, restartable view of the registry at one point in time.
#[derive(Clone)]
pub struct DeviceSnapshot {
    devices: Arc<Vec<DeviceHandle>>,
}

impl DeviceSnapshot {
    /// Iterates devices in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &DeviceHandle> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl<'a> IntoIterator for &'a DeviceSnapshot {
    type Item = &'a DeviceHandle;
    type IntoIter = std::slice::Iter<'a, DeviceHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.devices.iter()
    }
}

/// Outcome of [`DeviceRegistry::activate_all`] / [`DeviceRegistry::deactivate_all`].
#[derive(Debug, Default)]
pub struct LifecycleReport {
    /// Number of devices whose hook succeeded.
    pub succeeded: usize,
    /// Keys and errors of devices whose hook failed.
    pub failed: Vec<(String, DeviceError)>,
}

#[derive(Default)]
struct Inner {
    /// Registration order; replaced copy-on-write.
    devices: Arc<Vec<DeviceHandle>>,
    by_key: HashMap<String, DeviceHandle>,
}

/// Catalog of live devices keyed by unique string identifiers.
pub struct DeviceRegistry {
    inner: Mutex<Inner>,
    all_registered: watch::Sender<bool>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        let (all_registered, _rx) = watch::channel(false);
        Self {
            inner: Mutex::new(Inner::default()),
            all_registered,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a device.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateKey`] if the key is already taken.
    pub fn add(&self, device: DeviceHandle) -> Result<(), RegistryError> {
        let key = device.key().to_string();
        let mut inner = self.lock();
        if inner.by_key.contains_key(&key) {
            return Err(RegistryError::DuplicateKey(key));
        }
        Arc::make_mut(&mut inner.devices).push(Arc::clone(&device));
        inner.by_key.insert(key.clone(), device);
        debug!("registered device '{key}'");
        Ok(())
    }

    /// Returns the device registered under `key`.
    pub fn get(&self, key: &str) -> Option<DeviceHandle> {
        self.lock().by_key.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().by_key.contains_key(key)
    }

    /// Unregisters a device.  Removing an unknown key is a no-op.
    pub fn remove(&self, key: &str) -> Option<DeviceHandle> {
        let mut inner = self.lock();
        let removed = inner.by_key.remove(key)?;
        Arc::make_mut(&mut inner.devices).retain(|d| d.key() != key);
        debug!("removed device '{key}'");
        Some(removed)
    }

    /// Returns a snapshot of every registered device, in registration order.
    pub fn all_devices(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            devices: Arc::clone(&self.lock().devices),
        }
    }

    /// Keys of every registered device, in registration order.
    pub fn keys(&self) -> Vec<String> {
        self.all_devices()
            .iter()
            .map(|d| d.key().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().by_key.is_empty()
    }

    /// Runs every device's activation hook in registration order.
    ///
    /// A failing (or panicking) hook is logged and does not stop the devices
    /// after it.  Once every hook has run, the "all devices registered" signal
    /// is raised.
    pub fn activate_all(&self) -> LifecycleReport {
        let report = self.run_hooks("activate", |d| d.activate());
        info!(
            "activated {} device(s), {} failure(s)",
            report.succeeded,
            report.failed.len()
        );
        self.all_registered.send_replace(true);
        report
    }

    /// Runs every device's deactivation hook, isolating failures per device.
    pub fn deactivate_all(&self) -> LifecycleReport {
        self.all_registered.send_replace(false);
        self.run_hooks("deactivate", |d| d.deactivate())
    }

    fn run_hooks<F>(&self, phase: &str, hook: F) -> LifecycleReport
    where
        F: Fn(&DeviceHandle) -> Result<(), DeviceError>,
    {
        let snapshot = self.all_devices();
        let mut report = LifecycleReport::default();
        for device in &snapshot {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| hook(device)))
                .unwrap_or_else(|_| Err(DeviceError::Activation("hook panicked".to_string())));
            match outcome {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    error!("failed to {phase} device '{}': {e}", device.key());
                    report.failed.push((device.key().to_string(), e));
                }
            }
        }
        report
    }

    /// Returns `true` once [`DeviceRegistry::activate_all`] has completed.
    pub fn all_registered(&self) -> bool {
        *self.all_registered.borrow()
    }

    /// Waits until every device has registered, or `timeout` elapses.
    ///
    /// Returns `false` on timeout.
    pub async fn wait_all_registered(&self, timeout: Duration) -> bool {
        let mut rx = self.all_registered.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|done| *done))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }
}
