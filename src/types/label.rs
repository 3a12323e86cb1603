//! Normalized labels and the label index built once per connection

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use super::LogicalMetric;

/// A metric label normalized for case-insensitive lookup.
///
/// `"CPU Package Power"` and `"cpu package power"` are the same label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct Label(String);

impl Label {
    /// Normalize a raw label.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Label(raw.as_ref().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The logical metric this label names, if it is one of the logical keys.
    pub fn logical(&self) -> Option<LogicalMetric> {
        LogicalMetric::from_key(&self.0)
    }
}

impl From<String> for Label {
    fn from(raw: String) -> Self {
        Label::new(raw)
    }
}

impl From<&str> for Label {
    fn from(raw: &str) -> Self {
        Label::new(raw)
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        label.0
    }
}

impl AsRef<str> for Label {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Label {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which location survives when two rows expose the same normalized label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// The later row in table order replaces the earlier one.
    #[default]
    LastWins,
    /// The first row seen keeps the label.
    FirstWins,
}

/// Mapping from normalized label to a stable location.
///
/// The location is a reading-table row for the shared-memory backend and a
/// column index for the log backend.
#[derive(Debug, Clone, Default)]
pub struct LabelIndex {
    entries: HashMap<Label, usize>,
    policy: CollisionPolicy,
    collisions: usize,
}

impl LabelIndex {
    pub fn new(policy: CollisionPolicy) -> Self {
        Self { entries: HashMap::new(), policy, collisions: 0 }
    }

    pub fn with_capacity(policy: CollisionPolicy, capacity: usize) -> Self {
        Self { entries: HashMap::with_capacity(capacity), policy, collisions: 0 }
    }

    /// Record `label` at `location`, applying the collision policy.
    ///
    /// Returns the location that lost, if two distinct locations competed for
    /// the label. Empty labels are ignored.
    pub fn insert(&mut self, label: Label, location: usize) -> Option<usize> {
        if label.is_empty() {
            return None;
        }

        match self.entries.get(&label).copied() {
            None => {
                self.entries.insert(label, location);
                None
            }
            Some(existing) if existing == location => None,
            Some(existing) => {
                self.collisions += 1;
                debug!(
                    label = %label,
                    existing,
                    incoming = location,
                    policy = ?self.policy,
                    "Label collision in index"
                );
                match self.policy {
                    CollisionPolicy::LastWins => {
                        self.entries.insert(label, location);
                        Some(existing)
                    }
                    CollisionPolicy::FirstWins => Some(location),
                }
            }
        }
    }

    pub fn get(&self, label: &str) -> Option<usize> {
        self.entries.get(label).copied()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.entries.contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn policy(&self) -> CollisionPolicy {
        self.policy
    }

    /// Number of times two distinct locations competed for one label.
    pub fn collisions(&self) -> usize {
        self.collisions
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Label, usize)> {
        self.entries.iter().map(|(label, location)| (label, *location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_normalize_case() {
        assert_eq!(Label::new("CPU Package Power"), Label::new("cpu package power"));
        assert_eq!(Label::new("GT Cores Power").as_str(), "gt cores power");
    }

    #[test]
    fn labels_deserialize_normalized() {
        let label: Label = serde_yaml_ng::from_str("\"Total CPU Utility\"").unwrap();
        assert_eq!(label.as_str(), "total cpu utility");
    }

    #[test]
    fn last_wins_replaces_earlier_row() {
        let mut index = LabelIndex::new(CollisionPolicy::LastWins);
        assert_eq!(index.insert(Label::new("Power"), 1), None);
        assert_eq!(index.insert(Label::new("POWER"), 4), Some(1));
        assert_eq!(index.get("power"), Some(4));
        assert_eq!(index.collisions(), 1);
    }

    #[test]
    fn first_wins_keeps_earlier_row() {
        let mut index = LabelIndex::new(CollisionPolicy::FirstWins);
        index.insert(Label::new("Power"), 1);
        assert_eq!(index.insert(Label::new("power"), 4), Some(4));
        assert_eq!(index.get("power"), Some(1));
        assert_eq!(index.collisions(), 1);
    }

    #[test]
    fn same_row_under_two_names_is_not_a_collision() {
        let mut index = LabelIndex::default();
        index.insert(Label::new("CPU Package Power"), 2);
        index.insert(Label::new("cpu package power"), 2);
        assert_eq!(index.collisions(), 0);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn empty_labels_are_ignored() {
        let mut index = LabelIndex::default();
        assert_eq!(index.insert(Label::new(""), 0), None);
        assert!(index.is_empty());
    }
}
