//! Application layer use cases for the controller.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (the `av-core` crate) and the infrastructure (files, console, devices).
//!
//! Use cases in this layer:
//!
//! - **Orchestrate** domain objects to fulfil a goal (e.g., "bring the whole
//!   system up from a configuration").
//! - **Depend on abstractions** (the factory, the `Device` trait) rather than
//!   on concrete device types.
//! - **Contain no file system access**: configuration arrives already parsed.
//!
//! # Sub-modules
//!
//! - **`load_system`** – The [`ControlSystem`](load_system::ControlSystem)
//!   that owns the registry, tie lines and bridge tables, and the ordered,
//!   fail-open load / teardown / reload sequence.
//!
//! - **`startup`** – The deferred boot: startup delay, processor model checks
//!   and the bounded wait for "all devices registered".
//!
//! - **`diagnostics`** – Read-only inspection used by the console: join maps,
//!   tie lines, the merged configuration, factory types and device ports.

pub mod diagnostics;
pub mod load_system;
pub mod startup;
