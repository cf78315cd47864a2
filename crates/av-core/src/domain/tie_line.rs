//! Tie lines: declared point-to-point signal connections between device ports.
//!
//! The [`TieLineCollection`] is shared by the routing resolver and by any device
//! or room that creates internal connections at runtime.  It uses the same
//! copy-on-write snapshot scheme as the device registry, so routing can walk the
//! graph without holding the lock.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::device::SignalType;

/// One end of a tie line: a port on a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub device_key: String,
    pub port_key: String,
}

impl PortRef {
    pub fn new(device_key: impl Into<String>, port_key: impl Into<String>) -> Self {
        Self {
            device_key: device_key.into(),
            port_key: port_key.into(),
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.device_key, self.port_key)
    }
}

/// Who created a tie line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TieLineOrigin {
    /// Declared in the system configuration.
    Config,
    /// Created at runtime by the device (or room) with this key.
    Device(String),
}

/// A directed edge from a source output port to a destination input port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TieLine {
    pub source: PortRef,
    pub destination: PortRef,
    pub signal: SignalType,
    pub origin: TieLineOrigin,
}

impl TieLine {
    pub fn new(source: PortRef, destination: PortRef, signal: SignalType) -> Self {
        Self {
            source,
            destination,
            signal,
            origin: TieLineOrigin::Config,
        }
    }

    /// Marks the tie line as created by the device `owner_key`.
    pub fn owned_by(mut self, owner_key: impl Into<String>) -> Self {
        self.origin = TieLineOrigin::Device(owner_key.into());
        self
    }
}

impl fmt::Display for TieLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} --> {} ({})", self.source, self.destination, self.signal)
    }
}

/// Process-scoped ordered set of tie lines.
#[derive(Default)]
pub struct TieLineCollection {
    lines: Mutex<Arc<Vec<TieLine>>>,
}

impl TieLineCollection {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Arc<Vec<TieLine>>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a tie line.  Returns `false` if an identical line already exists.
    pub fn add(&self, line: TieLine) -> bool {
        let mut lines = self.lock();
        let duplicate = lines.iter().any(|l| {
            l.source == line.source && l.destination == line.destination && l.signal == line.signal
        });
        if duplicate {
            return false;
        }
        Arc::make_mut(&mut lines).push(line);
        true
    }

    /// Removes every tie line created at runtime by `owner_key`.
    pub fn remove_for_owner(&self, owner_key: &str) -> usize {
        let mut lines = self.lock();
        let before = lines.len();
        Arc::make_mut(&mut lines)
            .retain(|l| !matches!(&l.origin, TieLineOrigin::Device(k) if k == owner_key));
        before - lines.len()
    }

    pub fn clear(&self) {
        *self.lock() = Arc::new(Vec::new());
    }

    /// Current tie lines, in insertion order.
    pub fn snapshot(&self) -> Arc<Vec<TieLine>> {
        Arc::clone(&self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
