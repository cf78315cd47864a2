//! A routable source with fixed output ports (laptop input, media player).

use std::sync::Arc;

use av_core::domain::factory::BuildResult;
use av_core::{BuildContext, Device, DeviceConfig, DeviceFactory, Port, PortKind, SignalType};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceProperties {
    #[serde(default = "default_outputs")]
    outputs: Vec<String>,
    #[serde(default)]
    signal: SignalType,
}

fn default_outputs() -> Vec<String> {
    vec!["out".to_string()]
}

pub struct Source {
    key: String,
    name: String,
    ports: Vec<Port>,
}

impl Source {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        outputs: &[String],
        signal: SignalType,
    ) -> Self {
        let kind = port_kind(signal);
        Self {
            key: key.into(),
            name: name.into(),
            ports: outputs.iter().map(|o| Port::output(o.as_str(), kind)).collect(),
        }
    }
}

pub(crate) fn port_kind(signal: SignalType) -> PortKind {
    match signal {
        SignalType::Audio => PortKind::Audio,
        SignalType::Video => PortKind::Video,
        SignalType::AudioVideo => PortKind::AudioVideo,
    }
}

impl Device for Source {
    fn key(&self) -> &str {
        &self.key
    }

    fn name(&self) -> &str {
        if self.name.is_empty() {
            &self.key
        } else {
            &self.name
        }
    }

    fn type_name(&self) -> &str {
        "source"
    }

    fn ports(&self) -> &[Port] {
        &self.ports
    }
}

pub fn register(factory: &mut DeviceFactory) {
    factory.register("source", "Routable source with output ports", build_source);
}

fn build_source(entry: &DeviceConfig, _ctx: &BuildContext) -> BuildResult {
    let props: SourceProperties = entry.properties()?;
    Ok(Arc::new(Source::new(
        entry.key.clone(),
        entry.name.clone(),
        &props.outputs,
        props.signal,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use av_core::PortDirection;

    #[test]
    fn test_source_exposes_outputs_of_configured_signal() {
        let source = Source::new("laptop", "Laptop", &["hdmi".into(), "usbc".into()], SignalType::Video);

        let port = source.port("usbc", PortDirection::Output).unwrap();

        assert_eq!(port.kind, PortKind::Video);
        assert_eq!(source.ports().len(), 2);
        assert!(source.as_switcher().is_none());
    }
}
