//! Built-in device types.
//!
//! Each sub-module contributes one or more types to the [`DeviceFactory`]
//! through a `register` function.  [`register_builtin_types`] calls all of
//! them, plus the room types from `av-core`, in a fixed order.
//!
//! | Type name              | Module          |
//! |------------------------|-----------------|
//! | `display`              | `display`       |
//! | `source`               | `source`        |
//! | `matrixSwitcher`       | `switcher`      |
//! | `genericIrController`  | `ir_controller` |
//! | `eiscApiAdvanced`      | `bridge`        |
//! | `eiscApi`              | `bridge`        |
//! | `huddle`, `dualDisplay`| `av_core::domain::room` |
//!
//! The processor is not in this table: the load sequence creates it directly
//! (see [`processor`]).

use std::path::PathBuf;
use std::sync::Arc;

use av_core::domain::room::register_room_types;
use av_core::DeviceFactory;

pub mod bridge;
pub mod display;
pub mod ir_controller;
pub mod ir_port;
pub mod processor;
pub mod source;
pub mod switcher;

use bridge::BridgeLinks;
use ir_port::{FileDriverLoader, IrDriverLoader, IrTransmitter, LoggingIrTransmitter};

/// Collaborators injected into device builders.
#[derive(Clone)]
pub struct DeviceServices {
    pub ir_transmitter: Arc<dyn IrTransmitter>,
    pub ir_loader: Arc<dyn IrDriverLoader>,
    pub links: Arc<BridgeLinks>,
}

impl DeviceServices {
    /// Production services: IR files are read from `ir_dir` and IR output is
    /// logged.
    pub fn new(ir_dir: impl Into<PathBuf>) -> Self {
        Self {
            ir_transmitter: Arc::new(LoggingIrTransmitter),
            ir_loader: Arc::new(FileDriverLoader::new(ir_dir)),
            links: Arc::new(BridgeLinks::new()),
        }
    }
}

/// Registers every built-in device and room type.
pub fn register_builtin_types(factory: &mut DeviceFactory, services: &DeviceServices) {
    display::register(factory);
    source::register(factory);
    switcher::register(factory);
    ir_controller::register(factory, services);
    bridge::register(factory, services);
    register_room_types(factory);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_types_are_all_registered() {
        let mut factory = DeviceFactory::new();

        register_builtin_types(&mut factory, &DeviceServices::new(std::env::temp_dir()));

        for type_name in [
            "display",
            "source",
            "matrixSwitcher",
            "genericIrController",
            "eiscApiAdvanced",
            "eiscApi",
            "huddle",
            "dualDisplay",
        ] {
            assert!(factory.supports(type_name), "missing {type_name}");
        }
        assert!(factory.supports("EISCAPIADVANCED"));
    }
}
