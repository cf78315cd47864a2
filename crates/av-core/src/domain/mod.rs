//! Domain entities for the AV room controller.
//!
//! This module contains the business rules: what a device is, how devices are
//! registered and built, how signals are routed, and how a room behaves.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! Clean Architecture organises code into concentric layers.  The innermost
//! layer is called the **domain**.  Domain code has no imports from file
//! systems, network transports, or UI frameworks, so it can be tested on any
//! machine without hardware.  Concrete device drivers live in the application
//! crate and plug into the traits declared here.

/// The device abstraction and its capability traits.
pub mod device;

/// The config-driven device factory.
pub mod factory;

/// Observable values with last-value-wins delivery.
pub mod feedback;

/// Source and destination lists.
pub mod lists;

/// The process-scoped device catalog.
pub mod registry;

/// Rooms: source selection and sink power aggregation.
pub mod room;

/// The tie-line routing resolver.
pub mod routing;

/// Tie lines and the shared tie-line collection.
pub mod tie_line;
