//! Boot sequencing: deferred start, processor checks and the registration wait.
//!
//! The load runs on the blocking pool, after a short fixed delay that lets
//! the hardware layer settle:
//!
//! ```text
//! boot()
//!  └─ sleep(startup_delay)
//!  └─ spawn_blocking(load)
//!  └─ [dmps only] wait for "all devices registered" (bounded)
//!  └─ mark initialization complete
//! ```
//!
//! A timeout on the registration wait is logged and the boot carries on.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::application::load_system::{ControlSystem, LoadOutcome};
use crate::infrastructure::storage::config::ControllerSettings;

/// Returns `true` if a configured processor type names `model`.
///
/// The match is case-insensitive and also accepts the model with its dashes
/// removed, so `"rmc-4"` matches a configured `"RMC4"`.
pub fn processor_type_matches(configured: &str, model: &str) -> bool {
    if configured.eq_ignore_ascii_case(model) {
        return true;
    }
    let compact: String = model.chars().filter(|c| *c != '-').collect();
    configured.eq_ignore_ascii_case(&compact)
}

/// Processors whose ports appear only after device activation has begun.
pub fn enumerates_ports_asynchronously(model: &str) -> bool {
    model.to_ascii_lowercase().contains("dmps")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupOptions {
    pub delay: Duration,
    pub registration_timeout: Duration,
    pub load_on_boot: bool,
}

impl From<&ControllerSettings> for StartupOptions {
    fn from(settings: &ControllerSettings) -> Self {
        Self {
            delay: Duration::from_millis(settings.startup_delay_ms),
            registration_timeout: Duration::from_millis(settings.registration_timeout_ms),
            load_on_boot: settings.load_on_boot,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootOutcome {
    Loaded(LoadOutcome),
    /// Loading is left to the console `go` command.
    Deferred,
}

/// Runs the boot sequence.
///
/// `load` performs the actual load, typically reading the system
/// configuration file and calling [`ControlSystem::load`].
pub async fn boot<F>(system: Arc<ControlSystem>, options: StartupOptions, load: F) -> BootOutcome
where
    F: FnOnce(&ControlSystem) -> LoadOutcome + Send + 'static,
{
    if !options.load_on_boot {
        info!("load on boot disabled; waiting for 'go'");
        system.mark_initialization_complete();
        return BootOutcome::Deferred;
    }

    let task_system = Arc::clone(&system);
    let handle = tokio::spawn(async move {
        tokio::time::sleep(options.delay).await;

        let load_system = Arc::clone(&task_system);
        let outcome = match tokio::task::spawn_blocking(move || load(&load_system)).await {
            Ok(outcome) => outcome,
            Err(e) => return task_system.mark_load_failed(format!("load task failed: {e}")),
        };

        if enumerates_ports_asynchronously(task_system.processor_model()) {
            info!("waiting for all devices to register");
            if !task_system
                .registry()
                .wait_all_registered(options.registration_timeout)
                .await
            {
                warn!(
                    "devices did not finish registering within {:?}; continuing",
                    options.registration_timeout
                );
            }
        }
        task_system.mark_initialization_complete();
        outcome
    });

    match handle.await {
        Ok(outcome) => BootOutcome::Loaded(outcome),
        Err(e) => BootOutcome::Loaded(system.mark_load_failed(format!("boot task failed: {e}"))),
    }
}
