//! Infrastructure layer for the controller application.
//!
//! Contains the adapters around the domain: concrete device types, file-system
//! storage for settings and system configuration, and the console.
//!
//! **Dependency rule**: this layer may depend on `application` and `av_core`,
//! but MUST NOT be imported by `av_core`.  `application` reaches in only for
//! the device services and the settings types it is built from.

pub mod console;
pub mod devices;
pub mod storage;
