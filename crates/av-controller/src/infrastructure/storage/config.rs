//! Settings and system configuration files for the controller.
//!
//! Two files are involved:
//!
//! - **App settings** (`settings.toml`): how the controller process behaves
//!   (log level, startup delay, processor model).  Read from the
//!   platform-appropriate directory unless `--settings` names another file:
//!   - Windows:  `%APPDATA%\AvController\settings.toml`
//!   - Linux:    `~/.config/av-controller/settings.toml`
//!   - macOS:    `~/Library/Application Support/AvController/settings.toml`
//! - **System configuration** (`system.json`): the devices, rooms, tie lines
//!   and lists of the installed system, deserialized into
//!   [`av_core::SystemConfig`].
//!
//! # What is TOML? (for beginners)
//!
//! TOML is a configuration file format designed to be easy to read and write.
//! Example settings file:
//!
//! ```toml
//! [controller]
//! log_level = "debug"
//! startup_delay_ms = 500
//! processor_model = "cp4"
//!
//! [paths]
//! system_config = "/etc/av-controller/system.json"
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent.  A missing settings file therefore
//! behaves exactly like an empty one.

use std::path::{Path, PathBuf};

use av_core::SystemConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML settings could not be parsed.
    #[error("failed to parse settings TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The settings could not be serialized to TOML.
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The JSON system configuration could not be parsed.
    #[error("failed to parse system configuration {path}: {source}")]
    SystemConfig {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// ── Settings schema ───────────────────────────────────────────────────────────

/// Top-level application settings stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppSettings {
    #[serde(default)]
    pub controller: ControllerSettings,
    #[serde(default)]
    pub paths: PathSettings,
}

/// Controller process behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControllerSettings {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Delay before the load sequence starts, letting hardware discovery settle.
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,
    /// Upper bound on the wait for "all devices registered" on processors
    /// that enumerate ports asynchronously.
    #[serde(default = "default_registration_timeout_ms")]
    pub registration_timeout_ms: u64,
    /// Model of the processor this controller runs on.
    #[serde(default = "default_processor_model")]
    pub processor_model: String,
    /// When `false`, loading waits for the console `go` command.
    #[serde(default = "default_true")]
    pub load_on_boot: bool,
}

/// File locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PathSettings {
    /// JSON system configuration; defaults to `system.json` next to the
    /// settings file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_config: Option<PathBuf>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_startup_delay_ms() -> u64 {
    500
}
fn default_registration_timeout_ms() -> u64 {
    30_000
}
fn default_processor_model() -> String {
    "cp4".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            startup_delay_ms: default_startup_delay_ms(),
            registration_timeout_ms: default_registration_timeout_ms(),
            processor_model: default_processor_model(),
            load_on_boot: default_true(),
        }
    }
}

// ── Settings repository ───────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for controller files.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the default settings file path.
pub fn settings_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("settings.toml"))
}

/// Loads settings from `path`, returning defaults if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_settings(path: &Path) -> Result<AppSettings, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppSettings::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `settings` to `path`, creating the directory if needed.
pub fn save_settings(path: &Path, settings: &AppSettings) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(settings)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// The system configuration path: the explicit setting, or `system.json` in
/// the settings file's directory.
pub fn system_config_path(settings: &AppSettings, settings_path: &Path) -> PathBuf {
    settings.paths.system_config.clone().unwrap_or_else(|| {
        settings_path
            .parent()
            .map(|dir| dir.join("system.json"))
            .unwrap_or_else(|| PathBuf::from("system.json"))
    })
}

/// Reads and deserializes the JSON system configuration.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read (including when it
/// does not exist) and [`ConfigError::SystemConfig`] if it is not valid.
pub fn load_system_config(path: &Path) -> Result<SystemConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::SystemConfig {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the app subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("AvController"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("av-controller"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("AvController")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
