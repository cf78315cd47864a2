//! AV room controller entry point.
//!
//! Reads the settings file, builds the device factory and the
//! [`ControlSystem`], runs the deferred boot, then serves the console until
//! `quit` or Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_settings()            -- settings.toml (defaults if absent)
//!  └─ register_builtin_types()   -- device, bridge and room builders
//!  └─ ControlSystem::new()       -- registry, tie lines, router, bridge tables
//!  └─ boot()                     -- delay, load system.json, registration wait
//!  └─ console loop               -- stdin commands (or wait for Ctrl-C)
//!  └─ tear_down()
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use av_controller::application::load_system::ControlSystem;
use av_controller::application::startup::{boot, BootOutcome, StartupOptions};
use av_controller::infrastructure::console::{describe, Console, ConsoleCommand};
use av_controller::infrastructure::devices::{register_builtin_types, DeviceServices};
use av_controller::infrastructure::storage::config::{
    load_settings, load_system_config, save_settings, settings_file_path, system_config_path,
};
use av_core::DeviceFactory;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Configuration-driven AV room controller.
#[derive(Debug, Parser)]
#[command(
    name = "av-controller",
    about = "Configuration-driven AV meeting-room controller",
    version
)]
struct Cli {
    /// Path of the TOML settings file.
    ///
    /// Defaults to `settings.toml` in the platform config directory.
    #[arg(long, env = "AV_CONTROLLER_SETTINGS")]
    settings: Option<PathBuf>,

    /// Path of the JSON system configuration, overriding the settings file.
    #[arg(long, env = "AV_CONTROLLER_CONFIG")]
    config: Option<PathBuf>,

    /// Run headless: no stdin console, exit on Ctrl-C.
    #[arg(long, env = "AV_CONTROLLER_NO_CONSOLE")]
    no_console: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings_path = match cli.settings {
        Some(path) => path,
        None => settings_file_path().context("cannot locate the settings file")?,
    };
    let settings_exist = settings_path.exists();
    let settings = load_settings(&settings_path)
        .with_context(|| format!("failed to read settings from {}", settings_path.display()))?;

    // `RUST_LOG` wins over the settings file.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.controller.log_level)),
        )
        .init();

    info!("AV controller starting ({})", settings.controller.processor_model);

    if !settings_exist {
        match save_settings(&settings_path, &settings) {
            Ok(()) => info!("wrote default settings to {}", settings_path.display()),
            Err(e) => warn!("could not write default settings: {e}"),
        }
    }

    let config_path = cli
        .config
        .unwrap_or_else(|| system_config_path(&settings, &settings_path));
    let ir_dir = config_path
        .parent()
        .map(|dir| dir.join("ir"))
        .unwrap_or_else(|| PathBuf::from("ir"));
    info!("system configuration: {}", config_path.display());

    // ── Factory and control system ────────────────────────────────────────────
    let services = DeviceServices::new(ir_dir);
    let mut factory = DeviceFactory::new();
    register_builtin_types(&mut factory, &services);
    let system = Arc::new(ControlSystem::new(
        factory,
        Arc::clone(&services.links),
        settings.controller.processor_model.clone(),
    ));

    // ── Boot ──────────────────────────────────────────────────────────────────
    let boot_path = config_path.clone();
    let outcome = boot(
        Arc::clone(&system),
        StartupOptions::from(&settings.controller),
        move |system| match load_system_config(&boot_path) {
            Ok(config) => system.load(config),
            Err(e) => system.mark_load_failed(e.to_string()),
        },
    )
    .await;
    match outcome {
        BootOutcome::Loaded(outcome) => info!("{}", describe(&outcome)),
        BootOutcome::Deferred => info!("type 'go' to load the system"),
    }

    // ── Console or headless wait ──────────────────────────────────────────────
    if cli.no_console {
        info!("AV controller ready.  Press Ctrl-C to exit.");
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?;
        info!("shutdown signal received");
    } else {
        run_console(Arc::new(Console::new(Arc::clone(&system), config_path))).await?;
    }

    let teardown_system = Arc::clone(&system);
    tokio::task::spawn_blocking(move || teardown_system.tear_down())
        .await
        .context("teardown task failed")?;
    info!("AV controller stopped");
    Ok(())
}

/// Reads commands from stdin until `quit`, end of input, or Ctrl-C.
async fn run_console(console: Arc<Console>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("AV controller console.  Type 'help' for commands.");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read console input")?,
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                return Ok(());
            }
        };
        let Some(line) = line else {
            return Ok(());
        };

        let command = match ConsoleCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        if command == ConsoleCommand::Quit {
            return Ok(());
        }

        let worker = Arc::clone(&console);
        match tokio::task::spawn_blocking(move || worker.execute(&command)).await {
            Ok(result) if result.success => println!("{}", result.data.unwrap_or_default()),
            Ok(result) => println!("error: {}", result.error.unwrap_or_default()),
            Err(e) => error!("console command failed: {e}"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
