//! A matrix switcher with numbered inputs and outputs.
//!
//! Ports are named `in1..inN` and `out1..outM`.  The switcher keeps one
//! crosspoint per (output, signal) pair; an audio-video switch sets both the
//! audio and the video crosspoint of that output.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use av_core::domain::factory::BuildResult;
use av_core::{
    BuildContext, Device, DeviceConfig, DeviceError, DeviceFactory, Port, PortDirection,
    RoutingSwitcher, SignalType,
};
use serde::Deserialize;
use tracing::info;

use super::source::port_kind;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwitcherProperties {
    #[serde(default = "default_port_count")]
    input_count: u32,
    #[serde(default = "default_port_count")]
    output_count: u32,
    #[serde(default)]
    signal: SignalType,
}

fn default_port_count() -> u32 {
    4
}

pub struct MatrixSwitcher {
    key: String,
    name: String,
    ports: Vec<Port>,
    crosspoints: Mutex<HashMap<(String, SignalType), String>>,
}

impl MatrixSwitcher {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        inputs: u32,
        outputs: u32,
        signal: SignalType,
    ) -> Self {
        let kind = port_kind(signal);
        let ports = (1..=inputs)
            .map(|i| Port::input(format!("in{i}"), kind))
            .chain((1..=outputs).map(|o| Port::output(format!("out{o}"), kind)))
            .collect();
        Self {
            key: key.into(),
            name: name.into(),
            ports,
            crosspoints: Mutex::new(HashMap::new()),
        }
    }

    fn crosspoints(&self) -> MutexGuard<'_, HashMap<(String, SignalType), String>> {
        self.crosspoints.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The input currently switched to `output` for `signal`.
    pub fn routed_input(&self, output: &str, signal: SignalType) -> Option<String> {
        self.crosspoints().get(&(output.to_string(), signal)).cloned()
    }
}

impl Device for MatrixSwitcher {
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
        "matrixSwitcher"
    }

    fn ports(&self) -> &[Port] {
        &self.ports
    }

    fn as_switcher(&self) -> Option<&dyn RoutingSwitcher> {
        Some(self)
    }
}

impl RoutingSwitcher for MatrixSwitcher {
    fn execute_switch(
        &self,
        input_port: &str,
        output_port: Option<&str>,
        signal: SignalType,
    ) -> Result<(), DeviceError> {
        if self.port(input_port, PortDirection::Input).is_none() {
            return Err(DeviceError::UnknownPort(input_port.to_string()));
        }
        let output = output_port
            .ok_or_else(|| DeviceError::Command(format!("switch to '{input_port}' names no output")))?;
        if self.port(output, PortDirection::Output).is_none() {
            return Err(DeviceError::UnknownPort(output.to_string()));
        }

        let signals: &[SignalType] = match signal {
            SignalType::AudioVideo => &[SignalType::Audio, SignalType::Video],
            SignalType::Audio => &[SignalType::Audio],
            SignalType::Video => &[SignalType::Video],
        };
        let mut crosspoints = self.crosspoints();
        for s in signals {
            crosspoints.insert((output.to_string(), *s), input_port.to_string());
        }
        info!("[{}] {input_port} -> {output} ({signal})", self.key);
        Ok(())
    }
}

pub fn register(factory: &mut DeviceFactory) {
    factory.register("matrixSwitcher", "Matrix switcher with numbered inputs and outputs", build_switcher);
}

fn build_switcher(entry: &DeviceConfig, _ctx: &BuildContext) -> BuildResult {
    let props: SwitcherProperties = entry.properties()?;
    Ok(Arc::new(MatrixSwitcher::new(
        entry.key.clone(),
        entry.name.clone(),
        props.input_count,
        props.output_count,
        props.signal,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn switcher() -> MatrixSwitcher {
        MatrixSwitcher::new("dm", "", 2, 2, SignalType::AudioVideo)
    }

    #[test]
    fn test_audio_video_switch_sets_both_crosspoints() {
        let sw = switcher();

        sw.execute_switch("in2", Some("out1"), SignalType::AudioVideo).unwrap();

        assert_eq!(sw.routed_input("out1", SignalType::Audio).as_deref(), Some("in2"));
        assert_eq!(sw.routed_input("out1", SignalType::Video).as_deref(), Some("in2"));
        assert!(sw.routed_input("out2", SignalType::Video).is_none());
    }

    #[test]
    fn test_breakaway_audio_leaves_video_crosspoint() {
        let sw = switcher();
        sw.execute_switch("in1", Some("out1"), SignalType::AudioVideo).unwrap();

        sw.execute_switch("in2", Some("out1"), SignalType::Audio).unwrap();

        assert_eq!(sw.routed_input("out1", SignalType::Audio).as_deref(), Some("in2"));
        assert_eq!(sw.routed_input("out1", SignalType::Video).as_deref(), Some("in1"));
    }

    #[test]
    fn test_switch_rejects_unknown_ports_and_missing_output() {
        let sw = switcher();

        assert_eq!(
            sw.execute_switch("in9", Some("out1"), SignalType::Video),
            Err(DeviceError::UnknownPort("in9".into()))
        );
        assert_eq!(
            sw.execute_switch("in1", Some("out9"), SignalType::Video),
            Err(DeviceError::UnknownPort("out9".into()))
        );
        assert!(matches!(
            sw.execute_switch("in1", None, SignalType::Video),
            Err(DeviceError::Command(_))
        ));
    }
}
