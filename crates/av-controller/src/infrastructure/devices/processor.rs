//! The controlling processor, registered under the reserved `processor` key.
//!
//! It is never built from a config entry: the load sequence creates it from
//! the configured processor model before any other device.

use av_core::{Device, PROCESSOR_KEY};

pub struct Processor {
    model: String,
}

impl Processor {
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into() }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Device for Processor {
    fn key(&self) -> &str {
        PROCESSOR_KEY
    }

    fn name(&self) -> &str {
        &self.model
    }

    fn type_name(&self) -> &str {
        "processor"
    }
}
