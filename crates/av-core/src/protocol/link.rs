//! The control-surface link contract.
//!
//! A [`ControlLink`] is one connection to a remote control surface (touch
//! panel, mobile app gateway).  It carries three flat join spaces.  Devices
//! register *actions* for joins the surface writes to, and *set* join values
//! to publish feedback.  The on-wire encoding of the transport behind a link
//! is not part of this crate.
//!
//! [`MemoryLink`] keeps every join in memory.  Bridges use it as their join
//! state, and tests use it to simulate presses and read published feedback.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

/// Handler for an inbound digital write.
pub type BoolAction = Arc<dyn Fn(bool) + Send + Sync>;
/// Handler for an inbound analog write.
pub type UShortAction = Arc<dyn Fn(u16) + Send + Sync>;
/// Handler for an inbound serial write.
pub type StringAction = Arc<dyn Fn(String) + Send + Sync>;

/// One link to a remote control surface.
pub trait ControlLink: Send + Sync {
    /// Identifier of the link (normally the owning bridge's key).
    fn key(&self) -> &str;

    fn set_bool_action(&self, join: u32, action: BoolAction);
    fn set_ushort_action(&self, join: u32, action: UShortAction);
    fn set_string_action(&self, join: u32, action: StringAction);

    fn set_bool(&self, join: u32, value: bool);
    fn set_ushort(&self, join: u32, value: u16);
    fn set_string(&self, join: u32, value: &str);
}

#[derive(Default)]
struct Joins {
    bool_actions: HashMap<u32, BoolAction>,
    ushort_actions: HashMap<u32, UShortAction>,
    string_actions: HashMap<u32, StringAction>,
    bools: HashMap<u32, bool>,
    ushorts: HashMap<u32, u16>,
    strings: HashMap<u32, String>,
}

/// An in-memory link.
pub struct MemoryLink {
    key: String,
    joins: Mutex<Joins>,
}

impl MemoryLink {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            joins: Mutex::new(Joins::default()),
        }
    }

    fn joins(&self) -> MutexGuard<'_, Joins> {
        self.joins.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulates the surface writing a digital join.
    ///
    /// Returns `false` if no action is registered at `join`.
    pub fn press_bool(&self, join: u32, value: bool) -> bool {
        let action = self.joins().bool_actions.get(&join).cloned();
        match action {
            Some(action) => {
                action(value);
                true
            }
            None => {
                debug!("[{}] no digital action at join {join}", self.key);
                false
            }
        }
    }

    /// Simulates the surface writing an analog join.
    pub fn press_ushort(&self, join: u32, value: u16) -> bool {
        let action = self.joins().ushort_actions.get(&join).cloned();
        action.map(|a| a(value)).is_some()
    }

    /// Simulates the surface writing a serial join.
    pub fn press_string(&self, join: u32, value: &str) -> bool {
        let action = self.joins().string_actions.get(&join).cloned();
        action.map(|a| a(value.to_string())).is_some()
    }

    /// Last digital value published at `join`.
    pub fn bool_output(&self, join: u32) -> Option<bool> {
        self.joins().bools.get(&join).copied()
    }

    pub fn ushort_output(&self, join: u32) -> Option<u16> {
        self.joins().ushorts.get(&join).copied()
    }

    pub fn string_output(&self, join: u32) -> Option<String> {
        self.joins().strings.get(&join).cloned()
    }

    /// Digital joins with a registered action, ascending.
    pub fn bool_action_joins(&self) -> Vec<u32> {
        let mut joins: Vec<_> = self.joins().bool_actions.keys().copied().collect();
        joins.sort_unstable();
        joins
    }

    /// Drops every action and stored value.
    pub fn clear(&self) {
        *self.joins() = Joins::default();
    }
}

impl ControlLink for MemoryLink {
    fn key(&self) -> &str {
        &self.key
    }

    fn set_bool_action(&self, join: u32, action: BoolAction) {
        self.joins().bool_actions.insert(join, action);
    }

    fn set_ushort_action(&self, join: u32, action: UShortAction) {
        self.joins().ushort_actions.insert(join, action);
    }

    fn set_string_action(&self, join: u32, action: StringAction) {
        self.joins().string_actions.insert(join, action);
    }

    fn set_bool(&self, join: u32, value: bool) {
        self.joins().bools.insert(join, value);
    }

    fn set_ushort(&self, join: u32, value: u16) {
        self.joins().ushorts.insert(join, value);
    }

    fn set_string(&self, join: u32, value: &str) {
        self.joins().strings.insert(join, value.to_string());
    }
}
