//! Storage infrastructure: settings and system configuration files.
//!
//! This module is the only place the controller touches configuration files.
//! The `config` sub-module handles:
//!
//! - Reading the TOML app settings from the platform-appropriate directory.
//! - Reading the JSON system configuration into an in-memory object.
//! - Providing sensible defaults when the settings file does not exist yet.

pub mod config;
