//! The in-memory system configuration object.
//!
//! The core never reads or parses configuration text.  The application loads a
//! file, deserializes it into a [`SystemConfig`], and hands the result to the
//! factory, the routing resolver and the rooms.  All keys are camelCase.
//!
//! ```json
//! {
//!   "info": { "name": "Boardroom" },
//!   "devices": [ { "key": "display-1", "type": "display", "properties": {} } ],
//!   "rooms": [ { "key": "room-1", "type": "huddle", "properties": {} } ],
//!   "tieLines": [ { "sourceKey": "laptop", "sourcePort": "hdmiOut",
//!                   "destinationKey": "display-1", "destinationPort": "hdmiIn1" } ],
//!   "sourceLists": { "default": { "laptop": { "sourceKey": "laptop" } } },
//!   "destinationLists": {},
//!   "joinMaps": {}
//! }
//! ```

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::device::SignalType;
use crate::domain::lists::{DestinationList, SourceList};

/// Descriptive metadata about the installed system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// One device or room entry: a key, a type tag and an opaque property blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    pub key: String,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "type")]
    pub type_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(default)]
    pub properties: Value,
}

impl DeviceConfig {
    pub fn new(key: impl Into<String>, type_name: impl Into<String>, properties: Value) -> Self {
        Self {
            key: key.into(),
            name: String::new(),
            type_name: type_name.into(),
            group: None,
            properties,
        }
    }

    /// Deserializes the property blob into a typed properties struct.
    ///
    /// A missing (`null`) blob is treated as an empty object so that property
    /// structs with all-default fields still deserialize.
    pub fn properties<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match &self.properties {
            Value::Null => serde_json::from_value(Value::Object(Default::default())),
            other => serde_json::from_value(other.clone()),
        }
    }

    /// The display name, falling back to the key.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.key
        } else {
            &self.name
        }
    }
}

/// One declared tie line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TieLineConfig {
    pub source_key: String,
    pub source_port: String,
    pub destination_key: String,
    pub destination_port: String,

    #[serde(rename = "type", default)]
    pub signal: SignalType,
}

/// The complete, already-merged system configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemConfig {
    #[serde(default)]
    pub info: SystemInfo,

    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    #[serde(default)]
    pub rooms: Vec<DeviceConfig>,

    #[serde(default)]
    pub tie_lines: Vec<TieLineConfig>,

    #[serde(default)]
    pub source_lists: BTreeMap<String, SourceList>,

    #[serde(default)]
    pub destination_lists: BTreeMap<String, DestinationList>,

    /// Serialized join-map overrides keyed by join-map key.  A value may be
    /// a JSON object or a string containing JSON.
    #[serde(default)]
    pub join_maps: BTreeMap<String, Value>,
}

impl SystemConfig {
    pub fn source_list(&self, key: &str) -> Option<&SourceList> {
        self.source_lists.get(key)
    }

    pub fn destination_list(&self, key: &str) -> Option<&DestinationList> {
        self.destination_lists.get(key)
    }

    /// Returns the serialized override for `join_map_key`, if any.
    pub fn join_map_override(&self, join_map_key: &str) -> Option<&Value> {
        self.join_maps.get(join_map_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_object_deserializes_to_default() {
        let cfg: SystemConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, SystemConfig::default());
    }

    #[test]
    fn test_full_config_deserializes() {
        // Arrange
        let json = json!({
            "info": { "name": "Boardroom" },
            "devices": [{ "key": "display-1", "type": "display", "properties": { "warmupMs": 0 } }],
            "rooms": [{ "key": "room-1", "type": "huddle" }],
            "tieLines": [{ "sourceKey": "laptop", "sourcePort": "out",
                           "destinationKey": "display-1", "destinationPort": "hdmiIn1",
                           "type": "video" }],
            "sourceLists": { "default": { "laptop": { "sourceKey": "laptop", "order": 1 } } },
            "destinationLists": { "default": { "left": { "sinkKey": "display-1" } } },
            "joinMaps": { "irMap": "{}" }
        });

        // Act
        let cfg: SystemConfig = serde_json::from_value(json).unwrap();

        // Assert
        assert_eq!(cfg.info.name, "Boardroom");
        assert_eq!(cfg.devices[0].type_name, "display");
        assert_eq!(cfg.rooms[0].properties, Value::Null);
        assert_eq!(cfg.tie_lines[0].signal, SignalType::Video);
        assert!(cfg.source_list("default").unwrap().contains_key("laptop"));
        assert_eq!(
            cfg.destination_list("default").unwrap()["left"].sink_key,
            "display-1"
        );
        assert!(cfg.join_map_override("irMap").is_some());
    }

    #[test]
    fn test_tie_line_signal_defaults_to_audio_video() {
        let t: TieLineConfig = serde_json::from_value(json!({
            "sourceKey": "a", "sourcePort": "o", "destinationKey": "b", "destinationPort": "i"
        }))
        .unwrap();
        assert_eq!(t.signal, SignalType::AudioVideo);
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Props {
        #[serde(default)]
        warmup_ms: u64,
    }

    #[test]
    fn test_null_properties_deserialize_as_empty_object() {
        let entry = DeviceConfig::new("d", "display", Value::Null);
        let props: Props = entry.properties().unwrap();
        assert_eq!(props.warmup_ms, 0);
        assert_eq!(entry.display_name(), "d");
    }
}
