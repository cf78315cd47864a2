//! Read-only diagnostics over a running [`ControlSystem`].
//!
//! Each function backs one console command and returns the text to print.
//! Nothing here changes system state except [`press`], which simulates an
//! inbound digital write on a bridge link.

use av_core::protocol::bridge::JoinTableFormat;
use av_core::{BridgeError, PortDirection};
use thiserror::Error;

use crate::application::load_system::ControlSystem;

#[derive(Debug, Error)]
pub enum DiagnosticsError {
    #[error("no configuration is loaded")]
    NotLoaded,

    #[error("device '{0}' not found")]
    UnknownDevice(String),

    #[error("bridge '{0}' is not active")]
    UnknownBridge(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("bridge '{bridge}' has no action on digital join {join}")]
    NoAction { bridge: String, join: u32 },
}

/// `getjoinmap <bridge> [device]`
pub fn get_join_map(
    system: &ControlSystem,
    bridge: &str,
    device: Option<&str>,
) -> Result<String, DiagnosticsError> {
    Ok(system.bridge_tables().print(bridge, device, JoinTableFormat::Text)?)
}

/// `getjoinmapmarkdown <bridge> [device]`
pub fn get_join_map_markdown(
    system: &ControlSystem,
    bridge: &str,
    device: Option<&str>,
) -> Result<String, DiagnosticsError> {
    Ok(system.bridge_tables().print(bridge, device, JoinTableFormat::Markdown)?)
}

/// `listtielines`
pub fn list_tie_lines(system: &ControlSystem) -> String {
    let lines = system.tie_lines().snapshot();
    let mut out = format!("{} tie line(s)\n", lines.len());
    for line in lines.iter() {
        out.push_str(&format!("  {line}\n"));
    }
    out
}

/// `showconfig`: the merged configuration as pretty-printed JSON.
pub fn show_config(system: &ControlSystem) -> Result<String, DiagnosticsError> {
    let config = system.config().ok_or(DiagnosticsError::NotLoaded)?;
    Ok(serde_json::to_string_pretty(config.as_ref())?)
}

/// `gettypes [filter]`
pub fn get_types(system: &ControlSystem, filter: Option<&str>) -> String {
    let types = system.factory().type_names(filter);
    let width = types.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    let mut out = format!("{} type(s)\n", types.len());
    for (name, description) in types {
        out.push_str(&format!("  {name:<width$}  {description}\n"));
    }
    out
}

/// `getroutingports <deviceKey>`
pub fn get_routing_ports(system: &ControlSystem, key: &str) -> Result<String, DiagnosticsError> {
    let device = system
        .registry()
        .get(key)
        .ok_or_else(|| DiagnosticsError::UnknownDevice(key.to_string()))?;

    let mut out = String::new();
    for (title, direction) in [("Inputs", PortDirection::Input), ("Outputs", PortDirection::Output)] {
        out.push_str(&format!("{title}:\n"));
        for port in device.ports().iter().filter(|p| p.direction == direction) {
            out.push_str(&format!("  {} ({:?})\n", port.key, port.kind));
        }
    }
    Ok(out)
}

/// `devices`: every registered device with its type and capabilities.
pub fn devices(system: &ControlSystem) -> String {
    let snapshot = system.registry().all_devices();
    let mut out = format!("{} device(s)\n", snapshot.len());
    for device in &snapshot {
        out.push_str(&format!(
            "  {} [{}] {:?}\n",
            device.key(),
            device.type_name(),
            device.capabilities()
        ));
    }
    out
}

/// `press <bridge> <join> <true|false>`
pub fn press(
    system: &ControlSystem,
    bridge: &str,
    join: u32,
    value: bool,
) -> Result<(), DiagnosticsError> {
    let link = system
        .links()
        .get(bridge)
        .ok_or_else(|| DiagnosticsError::UnknownBridge(bridge.to_string()))?;
    if link.press_bool(join, value) {
        Ok(())
    } else {
        Err(DiagnosticsError::NoAction {
            bridge: bridge.to_string(),
            join,
        })
    }
}
