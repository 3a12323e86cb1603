//! Point-in-time telemetry snapshots

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::Label;

/// One point-in-time set of resolved metric values.
///
/// Built fresh by every sample call and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct TelemetrySnapshot {
    values: BTreeMap<Label, f64>,
    /// Capture time in milliseconds since the Unix epoch
    captured_at_ms: u64,
    /// Producer poll time from the shared-memory header
    poll_time: Option<i64>,
    /// Date and time columns of the log row the values came from
    row_time: Option<String>,
}

impl TelemetrySnapshot {
    /// Create a snapshot captured now.
    pub fn new(values: BTreeMap<Label, f64>) -> Self {
        Self::captured_at(values, SystemTime::now())
    }

    /// Create a snapshot with an explicit capture time.
    pub fn captured_at(values: BTreeMap<Label, f64>, at: SystemTime) -> Self {
        let captured_at_ms =
            at.duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or_default();
        Self { values, captured_at_ms, poll_time: None, row_time: None }
    }

    /// An empty snapshot captured now.
    pub fn empty() -> Self {
        Self::new(BTreeMap::new())
    }

    pub(crate) fn with_poll_time(mut self, poll_time: i64) -> Self {
        self.poll_time = Some(poll_time);
        self
    }

    pub(crate) fn with_row_time(mut self, row_time: Option<String>) -> Self {
        self.row_time = row_time;
        self
    }

    /// Look up a value by label (case-insensitive).
    pub fn get(&self, label: &str) -> Option<f64> {
        let label = Label::new(label);
        self.values.get(&label).copied()
    }

    pub fn values(&self) -> &BTreeMap<Label, f64> {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Label, f64)> {
        self.values.iter().map(|(label, value)| (label, *value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn captured_at_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.captured_at_ms)
    }

    pub fn captured_at_ms(&self) -> u64 {
        self.captured_at_ms
    }

    /// Producer poll time; lets a caller detect that nothing changed since the
    /// last observed poll.
    pub fn poll_time(&self) -> Option<i64> {
        self.poll_time
    }

    pub fn row_time(&self) -> Option<&str> {
        self.row_time.as_deref()
    }
}

/// Outcome of one sample call.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    /// New values were read.
    Fresh(TelemetrySnapshot),
    /// The source has not changed since the last sample; keep the previous
    /// snapshot.
    NoNewData,
}

impl Sample {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Sample::Fresh(_))
    }

    pub fn snapshot(&self) -> Option<&TelemetrySnapshot> {
        match self {
            Sample::Fresh(snapshot) => Some(snapshot),
            Sample::NoNewData => None,
        }
    }

    pub fn into_snapshot(self) -> Option<TelemetrySnapshot> {
        match self {
            Sample::Fresh(snapshot) => Some(snapshot),
            Sample::NoNewData => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut values = BTreeMap::new();
        values.insert(Label::new("CPU Package Power"), 42.5);
        let snapshot = TelemetrySnapshot::new(values);

        assert_eq!(snapshot.get("cpu package power"), Some(42.5));
        assert_eq!(snapshot.get("CPU PACKAGE POWER"), Some(42.5));
        assert_eq!(snapshot.get("gt cores power"), None);
    }

    #[test]
    fn capture_time_round_trips_to_millis() {
        let at = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        let snapshot = TelemetrySnapshot::captured_at(BTreeMap::new(), at);
        assert_eq!(snapshot.captured_at_ms(), 1_700_000_000_123);
        assert_eq!(snapshot.captured_at_time(), at);
    }

    #[test]
    fn no_new_data_has_no_snapshot() {
        assert!(Sample::NoNewData.snapshot().is_none());
        assert!(!Sample::NoNewData.is_fresh());
        assert!(Sample::Fresh(TelemetrySnapshot::empty()).is_fresh());
    }
}
