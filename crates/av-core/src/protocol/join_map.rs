//! Join maps: semantic signal names mapped onto numbered join addresses.
//!
//! A control-surface link exposes three flat address spaces (digital, analog
//! and serial joins).  A [`JoinMap`] says which address each of a device's
//! signals occupies, e.g. `"POWER" → digital join 9`.  Several devices share a
//! link by binding at different base offsets; the offset is added to every
//! raw address in the map.
//!
//! Maps come from two places:
//!
//! - **synthesis**: [`JoinMap::synthesize_digital`] numbers a list of command
//!   names from address 0 in declaration order;
//! - **overrides**: [`JoinMap::from_override`] deserializes a map supplied in
//!   the system configuration, e.g.
//!
//! ```json
//! { "POWER": { "joinNumber": 1, "joinType": "digital",
//!              "joinCapabilities": "fromRemote", "description": "Power toggle" } }
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The three join address spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JoinKind {
    Digital,
    Analog,
    Serial,
}

/// Direction(s) a join carries data, seen from the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JoinCapabilities {
    /// Feedback published to the remote surface.
    ToRemote,
    /// Action written by the remote surface.
    #[default]
    FromRemote,
    ToFromRemote,
}

/// One join assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinData {
    pub join_number: u32,

    #[serde(default = "default_join_span")]
    pub join_span: u32,

    #[serde(rename = "joinType")]
    pub kind: JoinKind,

    #[serde(rename = "joinCapabilities", default)]
    pub capabilities: JoinCapabilities,

    #[serde(default)]
    pub description: String,
}

fn default_join_span() -> u32 {
    1
}

impl JoinData {
    pub fn new(join_number: u32, kind: JoinKind, capabilities: JoinCapabilities) -> Self {
        Self {
            join_number,
            join_span: 1,
            kind,
            capabilities,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_span(mut self, span: u32) -> Self {
        self.join_span = span.max(1);
        self
    }

    /// Last address occupied by this join, saturating at `u32::MAX`.
    pub fn last_join(&self) -> u32 {
        self.join_number.saturating_add(self.join_span.max(1) - 1)
    }

    /// Moves this join up by `offset`, or `None` if any address it spans
    /// would leave the `u32` range.
    fn offset_by(&self, offset: u32) -> Option<u32> {
        let start = self.join_number.checked_add(offset)?;
        start.checked_add(self.join_span.max(1) - 1)?;
        Some(start)
    }

    fn overlaps(&self, other: &JoinData) -> bool {
        self.kind == other.kind
            && self.join_number <= other.last_join()
            && other.join_number <= self.last_join()
    }
}

/// Errors raised while loading or validating join maps.
#[derive(Debug, Error, PartialEq)]
pub enum JoinMapError {
    #[error("invalid join map: {0}")]
    Parse(String),

    #[error("join '{name}' at {join} does not fit at offset {offset}")]
    AddressOverflow { name: String, join: u32, offset: u32 },

    #[error("joins '{first}' and '{second}' overlap at {kind:?} join {join}")]
    Collision {
        first: String,
        second: String,
        kind: JoinKind,
        join: u32,
    },
}

/// Ordered mapping from join name to [`JoinData`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinMap {
    joins: BTreeMap<String, JoinData>,

    /// Base offset already applied to every join.
    #[serde(skip)]
    offset: u32,
}

impl JoinMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map from `(name, data)` pairs.
    pub fn from_joins<I, S>(joins: I) -> Self
    where
        I: IntoIterator<Item = (S, JoinData)>,
        S: Into<String>,
    {
        Self {
            joins: joins.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            offset: 0,
        }
    }

    /// One digital action join per name, numbered from 0 in declaration order.
    ///
    /// Duplicate names keep their first address.
    pub fn synthesize_digital<'a, I>(names: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut map = Self::new();
        let mut next = 0;
        for name in names {
            if map.joins.contains_key(name) {
                continue;
            }
            map.joins.insert(
                name.to_string(),
                JoinData::new(next, JoinKind::Digital, JoinCapabilities::FromRemote)
                    .with_description(name),
            );
            next += 1;
        }
        map
    }

    /// Deserializes an externally supplied map.
    ///
    /// The value is either a JSON object of `name → JoinData`, or a string
    /// holding such an object.
    pub fn from_override(value: &Value) -> Result<Self, JoinMapError> {
        let joins: BTreeMap<String, JoinData> = match value {
            Value::String(text) => {
                serde_json::from_str(text).map_err(|e| JoinMapError::Parse(e.to_string()))?
            }
            other => serde_json::from_value(other.clone())
                .map_err(|e| JoinMapError::Parse(e.to_string()))?,
        };
        Ok(Self { joins, offset: 0 })
    }

    pub fn insert(&mut self, name: impl Into<String>, data: JoinData) {
        self.joins.insert(name.into(), data);
    }

    pub fn get(&self, name: &str) -> Option<&JoinData> {
        self.joins.get(name)
    }

    /// The join number of `name`, if present.
    pub fn join_number(&self, name: &str) -> Option<u32> {
        self.joins.get(name).map(|j| j.join_number)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.joins.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &JoinData)> {
        self.joins.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.joins.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Adds `offset` to every join number.  No cross-device collision check
    /// is made.
    ///
    /// The map is left untouched when any join would overflow.
    pub fn apply_offset(&mut self, offset: u32) -> Result<(), JoinMapError> {
        let mut shifted = Vec::with_capacity(self.joins.len());
        for (name, join) in &self.joins {
            let number = join
                .offset_by(offset)
                .ok_or_else(|| JoinMapError::AddressOverflow {
                    name: name.clone(),
                    join: join.join_number,
                    offset,
                })?;
            shifted.push(number);
        }

        for (join, number) in self.joins.values_mut().zip(shifted) {
            join.join_number = number;
        }
        self.offset = self.offset.saturating_add(offset);
        Ok(())
    }

    /// Keeps only the joins whose name satisfies `keep`.
    pub fn retain_names<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.joins.retain(|name, _| keep(name));
    }

    /// Checks that no two joins of the same kind overlap.
    pub fn validate(&self) -> Result<(), JoinMapError> {
        let entries: Vec<_> = self.joins.iter().collect();
        for (i, (name_a, a)) in entries.iter().enumerate() {
            for (name_b, b) in &entries[i + 1..] {
                if a.overlaps(b) {
                    return Err(JoinMapError::Collision {
                        first: (*name_a).clone(),
                        second: (*name_b).clone(),
                        kind: a.kind,
                        join: a.join_number.max(b.join_number),
                    });
                }
            }
        }
        Ok(())
    }

    /// Entries sorted by kind, then address.
    fn sorted(&self) -> Vec<(&String, &JoinData)> {
        let mut rows: Vec<_> = self.joins.iter().collect();
        rows.sort_by_key(|(name, j)| (j.kind, j.join_number, (*name).clone()));
        rows
    }

    /// Renders a plain-text table for console output.
    pub fn to_text(&self, title: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Join map for {title} (offset {}):", self.offset);
        for kind in [JoinKind::Digital, JoinKind::Analog, JoinKind::Serial] {
            let rows: Vec<_> = self
                .sorted()
                .into_iter()
                .filter(|(_, j)| j.kind == kind)
                .collect();
            if rows.is_empty() {
                continue;
            }
            let _ = writeln!(out, "  {kind:?}:");
            for (name, join) in rows {
                let _ = writeln!(
                    out,
                    "    {:>5}  span {:<3} {:<14} {:<24} {}",
                    join.join_number,
                    join.join_span,
                    format!("{:?}", join.capabilities),
                    name,
                    join.description
                );
            }
        }
        out
    }

    /// Renders a markdown table suitable for documentation.
    pub fn to_markdown(&self, title: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "## {title}");
        let _ = writeln!(out);
        let _ = writeln!(out, "| Join | Span | Type | Capabilities | Name | Description |");
        let _ = writeln!(out, "| ---- | ---- | ---- | ------------ | ---- | ----------- |");
        for (name, join) in self.sorted() {
            let _ = writeln!(
                out,
                "| {} | {} | {:?} | {:?} | {} | {} |",
                join.join_number, join.join_span, join.kind, join.capabilities, name,
                join.description
            );
        }
        out
    }
}
