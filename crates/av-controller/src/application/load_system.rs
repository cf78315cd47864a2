//! ControlSystem: turns a system configuration into live devices and rooms.
//!
//! The load sequence is strictly ordered:
//!
//! ```text
//! processor ─▶ devices ─▶ rooms ─▶ activate all ─▶ tie lines
//! ```
//!
//! Rooms are built after every device so they can look their displays up in
//! the registry.  Tie lines come last so that devices created during
//! activation (IR ports, room-internal sources) are present when endpoints
//! are resolved.
//!
//! # Fail-open loading (for beginners)
//!
//! Every failure while building one entry is logged and that entry is
//! skipped; its siblings still load.  Only [`ControlSystem::load`] has a
//! catch-all: even a panic inside the sequence is caught, reported as
//! [`LoadOutcome::CompletedWithErrors`], and the system is still marked
//! "initialization complete" so the host never sees a hung program.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use av_core::{
    BridgeJoinTables, BuildContext, DeviceConfig, DeviceFactory, DeviceRegistry, RoutingResolver,
    SystemConfig, TieLineCollection, PROCESSOR_KEY,
};
use tracing::{error, info, warn};

use crate::application::startup::processor_type_matches;
use crate::infrastructure::devices::bridge::BridgeLinks;
use crate::infrastructure::devices::processor::Processor;

/// Counts gathered during one load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub devices: usize,
    pub rooms: usize,
    pub tie_lines: usize,
    pub tie_lines_skipped: usize,
    /// One line per entity that failed to build or activate.
    pub errors: Vec<String>,
}

/// Result of the top-level load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Completed(LoadSummary),
    CompletedWithErrors(LoadSummary),
}

impl LoadOutcome {
    pub fn summary(&self) -> &LoadSummary {
        match self {
            LoadOutcome::Completed(s) | LoadOutcome::CompletedWithErrors(s) => s,
        }
    }

    pub fn has_errors(&self) -> bool {
        matches!(self, LoadOutcome::CompletedWithErrors(_))
    }
}

/// Process-scoped owner of the registry, tie lines, router and bridge tables.
pub struct ControlSystem {
    registry: Arc<DeviceRegistry>,
    tie_lines: Arc<TieLineCollection>,
    router: Arc<RoutingResolver>,
    bridge_tables: Arc<BridgeJoinTables>,
    links: Arc<BridgeLinks>,
    factory: DeviceFactory,
    processor_model: String,
    config: Mutex<Option<Arc<SystemConfig>>>,
    initialization_complete: AtomicBool,
}

impl ControlSystem {
    pub fn new(
        factory: DeviceFactory,
        links: Arc<BridgeLinks>,
        processor_model: impl Into<String>,
    ) -> Self {
        let registry = Arc::new(DeviceRegistry::new());
        let tie_lines = Arc::new(TieLineCollection::new());
        let router = Arc::new(RoutingResolver::new(Arc::clone(&registry), Arc::clone(&tie_lines)));
        Self {
            registry,
            tie_lines,
            router,
            bridge_tables: Arc::new(BridgeJoinTables::new()),
            links,
            factory,
            processor_model: processor_model.into(),
            config: Mutex::new(None),
            initialization_complete: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn tie_lines(&self) -> &Arc<TieLineCollection> {
        &self.tie_lines
    }

    pub fn router(&self) -> &Arc<RoutingResolver> {
        &self.router
    }

    pub fn bridge_tables(&self) -> &Arc<BridgeJoinTables> {
        &self.bridge_tables
    }

    pub fn links(&self) -> &Arc<BridgeLinks> {
        &self.links
    }

    pub fn factory(&self) -> &DeviceFactory {
        &self.factory
    }

    pub fn processor_model(&self) -> &str {
        &self.processor_model
    }

    fn config_slot(&self) -> MutexGuard<'_, Option<Arc<SystemConfig>>> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The configuration of the current load, if any.
    pub fn config(&self) -> Option<Arc<SystemConfig>> {
        self.config_slot().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.config_slot().is_some()
    }

    pub fn is_initialization_complete(&self) -> bool {
        self.initialization_complete.load(Ordering::SeqCst)
    }

    pub fn mark_initialization_complete(&self) {
        self.initialization_complete.store(true, Ordering::SeqCst);
    }

    /// Records a load that could not start, e.g. an unreadable config file.
    pub fn mark_load_failed(&self, reason: impl Into<String>) -> LoadOutcome {
        let reason = reason.into();
        error!("load failed: {reason}");
        self.mark_initialization_complete();
        LoadOutcome::CompletedWithErrors(LoadSummary {
            errors: vec![reason],
            ..LoadSummary::default()
        })
    }

    // ── Load ──────────────────────────────────────────────────────────────────

    /// Loads `config`, never panicking and always marking initialization
    /// complete.
    pub fn load(&self, config: SystemConfig) -> LoadOutcome {
        info!("starting load from configuration '{}'", config.info.name);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_load(config)));
        self.mark_initialization_complete();

        match outcome {
            Ok(summary) if summary.errors.is_empty() => {
                info!(
                    "load complete: {} device(s), {} room(s), {} tie line(s)",
                    summary.devices, summary.rooms, summary.tie_lines
                );
                LoadOutcome::Completed(summary)
            }
            Ok(summary) => {
                error!("load complete with {} error(s)", summary.errors.len());
                LoadOutcome::CompletedWithErrors(summary)
            }
            Err(_) => self.mark_load_failed("fatal error during load; system is in an inconsistent state"),
        }
    }

    fn run_load(&self, config: SystemConfig) -> LoadSummary {
        let config = Arc::new(config);
        *self.config_slot() = Some(Arc::clone(&config));
        let ctx = BuildContext::new(
            Arc::clone(&self.router),
            Arc::clone(&config),
            Arc::clone(&self.bridge_tables),
        );
        let mut summary = LoadSummary::default();

        self.add_processor(&config, &mut summary);
        summary.devices = self.build_entries(&config.devices, &ctx, &mut summary.errors);
        summary.rooms = self.build_entries(&config.rooms, &ctx, &mut summary.errors);

        let activation = self.registry.activate_all();
        summary
            .errors
            .extend(activation.failed.iter().map(|(key, e)| format!("device '{key}': {e}")));

        let ties = self.router.load_tie_lines(&config.tie_lines);
        summary.tie_lines = ties.added;
        summary.tie_lines_skipped = ties.skipped;
        summary
    }

    /// Registers the processor device and validates any `processor` entry.
    fn add_processor(&self, config: &SystemConfig, summary: &mut LoadSummary) {
        if !self.registry.contains(PROCESSOR_KEY) {
            if let Err(e) = self.registry.add(Arc::new(Processor::new(self.processor_model.clone()))) {
                summary.errors.push(format!("processor: {e}"));
            }
        }

        for entry in config.devices.iter().filter(|e| is_processor_entry(e)) {
            if !processor_type_matches(&entry.type_name, &self.processor_model) {
                warn!(
                    "config defines processor type '{}' but this processor is '{}'; some ports may not be available",
                    entry.type_name, self.processor_model
                );
            }
        }
    }

    /// Builds and registers each entry; returns how many became live.
    fn build_entries(
        &self,
        entries: &[DeviceConfig],
        ctx: &BuildContext,
        errors: &mut Vec<String>,
    ) -> usize {
        let mut loaded = 0;
        for entry in entries {
            if is_processor_entry(entry) {
                continue;
            }
            let device = match self.factory.build(entry, ctx) {
                Ok(device) => device,
                Err(e) => {
                    error!("{e}");
                    errors.push(e.to_string());
                    continue;
                }
            };
            match self.registry.add(device) {
                Ok(()) => {
                    info!("loaded '{}' ({})", entry.key, entry.type_name);
                    loaded += 1;
                }
                Err(e) => {
                    error!("device '{}': {e}", entry.key);
                    errors.push(format!("device '{}': {e}", entry.key));
                }
            }
        }
        loaded
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    /// Deactivates and removes every device and clears all tie lines.
    pub fn tear_down(&self) {
        info!("tearing down {} device(s)", self.registry.len());
        self.registry.deactivate_all();
        for key in self.registry.keys() {
            self.registry.remove(&key);
        }
        self.tie_lines.clear();
        self.router.clear_active_routes();
        self.bridge_tables.clear();
        self.links.clear();
        *self.config_slot() = None;
    }

    /// Tears down, then loads `config`.
    pub fn reload(&self, config: SystemConfig) -> LoadOutcome {
        self.tear_down();
        self.load(config)
    }
}

fn is_processor_entry(entry: &DeviceConfig) -> bool {
    entry.key.eq_ignore_ascii_case(PROCESSOR_KEY)
}
