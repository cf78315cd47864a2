//! The tie-line routing resolver.
//!
//! The resolver keeps the [`TieLineCollection`] in sync with configuration and
//! answers one question: "how does a signal get from source S to destination
//! D?"  It walks backwards from the destination over tie lines that can carry
//! the requested signal, passing only through devices that can switch.  Each
//! device on the path becomes a [`RouteStep`]; executing the route asks every
//! step's device to connect its input to its output.
//!
//! Crosspoint selection inside a switcher is the switcher's own business: the
//! resolver only says "connect input X to output Y on device Z".

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::TieLineConfig;
use crate::domain::device::{DeviceError, PortDirection, SignalType};
use crate::domain::registry::DeviceRegistry;
use crate::domain::tie_line::{PortRef, TieLine, TieLineCollection};

/// Errors raised while resolving or executing routes.
#[derive(Debug, Error, PartialEq)]
pub enum RoutingError {
    #[error("device '{0}' is not registered")]
    UnknownDevice(String),

    #[error("device '{device}' has no {direction:?} port '{port}'")]
    UnknownPort {
        device: String,
        port: String,
        direction: PortDirection,
    },

    #[error("no {signal} path from '{source_key}' to '{destination}'")]
    Unreachable {
        source_key: String,
        destination: String,
        signal: SignalType,
    },

    #[error("switch on '{device}' failed: {error}")]
    SwitchFailed { device: String, error: DeviceError },
}

/// One switching action: on `device_key`, connect `input_port` to `output_port`.
///
/// `output_port` is `None` for the final sink, which only selects an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteStep {
    pub device_key: String,
    pub input_port: String,
    pub output_port: Option<String>,
    pub signal: SignalType,
}

/// A resolved path, ordered from the source side to the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub source_key: String,
    pub destination_key: String,
    pub steps: Vec<RouteStep>,
}

/// Result of [`RoutingResolver::load_tie_lines`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TieLineLoadReport {
    pub added: usize,
    pub skipped: usize,
}

/// Resolves and executes signal routes over the shared tie-line graph.
pub struct RoutingResolver {
    registry: Arc<DeviceRegistry>,
    tie_lines: Arc<TieLineCollection>,
    /// destination key → source key of the last executed route.
    active: Mutex<HashMap<String, String>>,
}

impl RoutingResolver {
    pub fn new(registry: Arc<DeviceRegistry>, tie_lines: Arc<TieLineCollection>) -> Self {
        Self {
            registry,
            tie_lines,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn tie_lines(&self) -> &Arc<TieLineCollection> {
        &self.tie_lines
    }

    fn active(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Tie-line bookkeeping ──────────────────────────────────────────────────

    /// Adds every configured tie line whose endpoints resolve.
    ///
    /// Unresolvable entries are logged and skipped.  Loading is additive:
    /// existing tie lines, including those created by running devices, are
    /// kept.
    pub fn load_tie_lines(&self, entries: &[TieLineConfig]) -> TieLineLoadReport {
        let mut report = TieLineLoadReport::default();
        for entry in entries {
            let line = TieLine::new(
                PortRef::new(&entry.source_key, &entry.source_port),
                PortRef::new(&entry.destination_key, &entry.destination_port),
                entry.signal,
            );
            match self.add_tie_line(line) {
                Ok(()) => report.added += 1,
                Err(e) => {
                    warn!(
                        "skipping tie line {}.{} --> {}.{}: {e}",
                        entry.source_key,
                        entry.source_port,
                        entry.destination_key,
                        entry.destination_port
                    );
                    report.skipped += 1;
                }
            }
        }
        info!("loaded {} tie line(s), skipped {}", report.added, report.skipped);
        report
    }

    /// Validates both endpoints of `line` and appends it to the collection.
    pub fn add_tie_line(&self, line: TieLine) -> Result<(), RoutingError> {
        self.check_port(&line.source, PortDirection::Output)?;
        self.check_port(&line.destination, PortDirection::Input)?;
        if !self.tie_lines.add(line) {
            debug!("tie line already present; ignoring duplicate");
        }
        Ok(())
    }

    fn check_port(&self, port: &PortRef, direction: PortDirection) -> Result<(), RoutingError> {
        let device = self
            .registry
            .get(&port.device_key)
            .ok_or_else(|| RoutingError::UnknownDevice(port.device_key.clone()))?;
        if device.port(&port.port_key, direction).is_none() {
            return Err(RoutingError::UnknownPort {
                device: port.device_key.clone(),
                port: port.port_key.clone(),
                direction,
            });
        }
        Ok(())
    }

    // ── Resolution ────────────────────────────────────────────────────────────

    /// Finds a path carrying `signal` from `source_key` to `destination_key`.
    ///
    /// An audio+video request that has no single path is split into separate
    /// audio and video searches; if only one of them succeeds the partial
    /// route is returned with a warning.
    pub fn resolve_route(
        &self,
        source_key: &str,
        destination_key: &str,
        signal: SignalType,
    ) -> Result<Route, RoutingError> {
        for key in [source_key, destination_key] {
            if !self.registry.contains(key) {
                return Err(RoutingError::UnknownDevice(key.to_string()));
            }
        }

        let ties = self.tie_lines.snapshot();
        let mut steps = self.search(&ties, source_key, destination_key, signal);

        if steps.is_none() && signal == SignalType::AudioVideo {
            let video = self.search(&ties, source_key, destination_key, SignalType::Video);
            let audio = self.search(&ties, source_key, destination_key, SignalType::Audio);
            steps = match (video, audio) {
                (Some(mut v), Some(a)) => {
                    v.extend(a);
                    Some(v)
                }
                (Some(only), None) | (None, Some(only)) => {
                    warn!(
                        "only a partial route exists from '{source_key}' to '{destination_key}'"
                    );
                    Some(only)
                }
                (None, None) => None,
            };
        }

        steps
            .map(|steps| Route {
                source_key: source_key.to_string(),
                destination_key: destination_key.to_string(),
                steps,
            })
            .ok_or_else(|| RoutingError::Unreachable {
                source_key: source_key.to_string(),
                destination: destination_key.to_string(),
                signal,
            })
    }

    fn search(
        &self,
        ties: &[TieLine],
        source_key: &str,
        destination_key: &str,
        signal: SignalType,
    ) -> Option<Vec<RouteStep>> {
        let mut visited = vec![destination_key.to_string()];
        self.walk_back(ties, destination_key, None, source_key, signal, &mut visited)
    }

    /// Depth-first search from `device_key` towards the source.  `visited`
    /// holds the devices on the current path only.
    fn walk_back(
        &self,
        ties: &[TieLine],
        device_key: &str,
        output_port: Option<&str>,
        source_key: &str,
        signal: SignalType,
        visited: &mut Vec<String>,
    ) -> Option<Vec<RouteStep>> {
        let incoming = ties
            .iter()
            .filter(|t| t.destination.device_key == device_key && t.signal.carries(signal));

        for tie in incoming {
            let step = RouteStep {
                device_key: device_key.to_string(),
                input_port: tie.destination.port_key.clone(),
                output_port: output_port.map(str::to_string),
                signal,
            };

            let upstream = tie.source.device_key.as_str();
            if upstream == source_key {
                return Some(vec![step]);
            }
            if visited.iter().any(|k| k == upstream) {
                continue;
            }
            let can_switch = self
                .registry
                .get(upstream)
                .map(|d| d.as_switcher().is_some())
                .unwrap_or(false);
            if !can_switch {
                continue;
            }

            visited.push(upstream.to_string());
            let found = self.walk_back(
                ties,
                upstream,
                Some(&tie.source.port_key),
                source_key,
                signal,
                visited,
            );
            visited.pop();

            if let Some(mut steps) = found {
                steps.push(step);
                return Some(steps);
            }
        }
        None
    }

    // ── Execution ─────────────────────────────────────────────────────────────

    /// Issues every switch in `route`, source side first.
    ///
    /// Devices on the path that cannot switch (passive sinks) are skipped.
    pub fn execute_route(&self, route: &Route) -> Result<(), RoutingError> {
        for step in &route.steps {
            let device = self
                .registry
                .get(&step.device_key)
                .ok_or_else(|| RoutingError::UnknownDevice(step.device_key.clone()))?;
            let Some(switcher) = device.as_switcher() else {
                debug!("'{}' cannot switch; skipping step", step.device_key);
                continue;
            };
            switcher
                .execute_switch(&step.input_port, step.output_port.as_deref(), step.signal)
                .map_err(|error| RoutingError::SwitchFailed {
                    device: step.device_key.clone(),
                    error,
                })?;
        }
        self.active()
            .insert(route.destination_key.clone(), route.source_key.clone());
        debug!(
            "routed '{}' to '{}' in {} step(s)",
            route.source_key,
            route.destination_key,
            route.steps.len()
        );
        Ok(())
    }

    /// Resolves and executes a route in one call.
    pub fn route(
        &self,
        source_key: &str,
        destination_key: &str,
        signal: SignalType,
    ) -> Result<Route, RoutingError> {
        let route = self.resolve_route(source_key, destination_key, signal)?;
        self.execute_route(&route)?;
        Ok(route)
    }

    /// Forgets the active route to `destination_key`, returning its source.
    pub fn release_route(&self, destination_key: &str) -> Option<String> {
        self.active().remove(destination_key)
    }

    /// The source currently routed to `destination_key`, if any.
    pub fn active_source(&self, destination_key: &str) -> Option<String> {
        self.active().get(destination_key).cloned()
    }

    /// Forgets every active route (used at teardown).
    pub fn clear_active_routes(&self) {
        self.active().clear();
    }
}
