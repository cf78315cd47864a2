//! Source and destination lists: named logical endpoints declared in config.
//!
//! A source list maps a selection key (what a touch panel sends) to a
//! [`SourceListItem`] naming the physical source device.  A destination list
//! maps a destination key to a [`DestinationListItem`] naming a sink device and
//! where it sits on the control surface, which allows positional lookup such as
//! "the display at surface 0, column 1, row 0".

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Reserved source key meaning "turn the room off".
pub const OFF_SOURCE_KEY: &str = "$off";

/// How selecting a source item affects the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceItemType {
    /// Route the source to the room's sinks.
    #[default]
    Route,
    /// Power the room off.
    Off,
    /// Selectable but not routed (e.g. a UI-only page).
    Other,
}

/// One selectable source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceListItem {
    /// Key of the source device, or [`OFF_SOURCE_KEY`].
    pub source_key: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub order: i32,

    #[serde(rename = "type", default)]
    pub item_type: SourceItemType,

    /// Device receiving room volume commands while this source is active.
    ///
    /// `None` and `"$defaultAudio"` select the room's default audio device;
    /// `"$defaultDisplay"` selects the room's first sink.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_control_key: Option<String>,
}

impl SourceListItem {
    /// Returns `true` if selecting this item turns the room off.
    pub fn is_off(&self) -> bool {
        self.source_key == OFF_SOURCE_KEY || self.item_type == SourceItemType::Off
    }

    /// The display name, falling back to the source key.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.source_key
        } else {
            &self.name
        }
    }
}

/// One sink on the control surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationListItem {
    pub sink_key: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub surface_location: u32,

    #[serde(default)]
    pub horizontal_location: u32,

    #[serde(default)]
    pub vertical_location: u32,
}

impl DestinationListItem {
    pub fn is_at(&self, surface: u32, horizontal: u32, vertical: u32) -> bool {
        self.surface_location == surface
            && self.horizontal_location == horizontal
            && self.vertical_location == vertical
    }
}

/// Selection key → source item.
pub type SourceList = BTreeMap<String, SourceListItem>;

/// Destination key → destination item.
pub type DestinationList = BTreeMap<String, DestinationListItem>;

/// Finds the destination at the given surface position.
///
/// When several items share a position the one with the lowest key wins, so
/// the result is stable.
pub fn find_at_position(
    list: &DestinationList,
    surface: u32,
    horizontal: u32,
    vertical: u32,
) -> Option<(&String, &DestinationListItem)> {
    list.iter()
        .find(|(_, item)| item.is_at(surface, horizontal, vertical))
}

/// Source items sorted by `order`, then by selection key.
pub fn ordered_sources(list: &SourceList) -> Vec<(&String, &SourceListItem)> {
    let mut items: Vec<_> = list.iter().collect();
    items.sort_by(|a, b| a.1.order.cmp(&b.1.order).then_with(|| a.0.cmp(b.0)));
    items
}
