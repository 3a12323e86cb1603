//! Mapping requested labels to CSV columns

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::{debug, warn};

use super::split_fields;
use crate::types::{CollisionPolicy, Label, LabelIndex};
use crate::{Result, TelemetryError};

/// Upper bound on the header row length
const MAX_HEADER_BYTES: u64 = 256 * 1024;

/// What to do with a label no header column matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum UnresolvedColumnPolicy {
    /// Read column 0 for the label and log a warning. Column 0 is the date,
    /// so the value will fail to parse and be skipped at sample time.
    #[default]
    FirstColumn,
    /// Fail resolution with every unresolved label listed.
    Fail,
}

/// Column names parsed from a log's header row.
#[derive(Debug, Clone)]
pub struct LogSchema {
    columns: Vec<String>,
    exact: LabelIndex,
    without_unit: LabelIndex,
}

impl LogSchema {
    /// Parse a header row.
    ///
    /// A leading byte-order mark and surrounding quotes are removed. Where a
    /// header appears twice the first column wins.
    pub fn parse(header: &str) -> Self {
        let header = header.trim_start_matches('\u{feff}').trim_end_matches(['\r', '\n']);
        let columns: Vec<String> = split_fields(header).map(str::to_string).collect();

        let mut exact = LabelIndex::with_capacity(CollisionPolicy::FirstWins, columns.len());
        let mut without_unit = LabelIndex::with_capacity(CollisionPolicy::FirstWins, columns.len());
        for (column, name) in columns.iter().enumerate() {
            exact.insert(Label::new(name), column);
            if let Some(stripped) = strip_unit(name) {
                without_unit.insert(Label::new(stripped), column);
            }
        }

        Self { columns, exact, without_unit }
    }

    /// Read and parse the first line of the file at `path`.
    ///
    /// The bytes are decoded lossily so a header written in a legacy code page
    /// still yields its ASCII columns.
    pub fn read_from(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| TelemetryError::file_error(path.to_path_buf(), e))?;
        let mut reader = BufReader::new(file).take(MAX_HEADER_BYTES);

        let mut line = Vec::new();
        reader
            .read_until(b'\n', &mut line)
            .map_err(|e| TelemetryError::file_error(path.to_path_buf(), e))?;

        let schema = Self::parse(&String::from_utf8_lossy(&line));
        debug!(path = %path.display(), columns = schema.len(), "Parsed log header");
        Ok(schema)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Find the column for a header name, ignoring case and optionally the
    /// trailing `[unit]`.
    pub fn find(&self, name: &str) -> Option<usize> {
        let label = Label::new(name);
        self.exact.get(label.as_str()).or_else(|| self.without_unit.get(label.as_str()))
    }
}

/// `"CPU Package Power [W]"` -> `"CPU Package Power"`
fn strip_unit(name: &str) -> Option<&str> {
    let trimmed = name.trim_end();
    if !trimmed.ends_with(']') {
        return None;
    }
    let open = trimmed.rfind('[')?;
    let stripped = trimmed[..open].trim_end();
    (!stripped.is_empty()).then_some(stripped)
}

/// Resolves requested labels against a [`LogSchema`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSchemaResolver {
    policy: UnresolvedColumnPolicy,
}

impl LogSchemaResolver {
    pub fn new(policy: UnresolvedColumnPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> UnresolvedColumnPolicy {
        self.policy
    }

    /// Map each label to a column.
    ///
    /// Logical metric keys match any of their known header spellings; other
    /// labels match the header text itself.
    pub fn resolve(&self, schema: &LogSchema, labels: &[Label]) -> Result<Vec<(Label, usize)>> {
        let mut resolved = Vec::with_capacity(labels.len());
        let mut unresolved = Vec::new();

        for label in labels {
            if resolved.iter().any(|(seen, _): &(Label, usize)| seen == label) {
                continue;
            }

            match Self::find(schema, label) {
                Some(column) => resolved.push((label.clone(), column)),
                None => match self.policy {
                    UnresolvedColumnPolicy::FirstColumn => {
                        warn!(label = %label, "No log column matches label, reading column 0");
                        resolved.push((label.clone(), 0));
                    }
                    UnresolvedColumnPolicy::Fail => unresolved.push(label.to_string()),
                },
            }
        }

        if !unresolved.is_empty() {
            return Err(TelemetryError::Resolution { unresolved });
        }
        Ok(resolved)
    }

    fn find(schema: &LogSchema, label: &Label) -> Option<usize> {
        if let Some(metric) = label.logical() {
            return metric
                .header_spellings()
                .iter()
                .chain(metric.reading_labels())
                .find_map(|spelling| schema.find(spelling));
        }
        schema.find(label.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ENGLISH: &str = "\"Date\",\"Time\",\"Total CPU Usage [%]\",\"CPU Package Power [W]\",\"GT Cores Power [W]\",\"GPU D3D Usage [%]\"";
    const LOCALIZED: &str = "\u{feff}\"Date\",\"Time\",\"CPU 总使用率 [%]\",\"GPU D3D 使用率 [%]\",\"CPU 封装功率 [W]\",\"GT 核心功率 [W]\"\r\n";

    fn labels(names: &[&str]) -> Vec<Label> {
        names.iter().map(Label::new).collect()
    }

    #[test]
    fn logical_metrics_match_english_headers() {
        let schema = LogSchema::parse(ENGLISH);
        let resolved = LogSchemaResolver::default()
            .resolve(&schema, &labels(&["cpu_usage", "cpu_power", "gpu_power", "gpu_usage"]))
            .unwrap();
        let columns: Vec<_> = resolved.iter().map(|(_, c)| *c).collect();
        assert_eq!(columns, vec![2, 3, 4, 5]);
    }

    #[test]
    fn logical_metrics_match_localized_headers() {
        let schema = LogSchema::parse(LOCALIZED);
        assert_eq!(schema.columns()[0], "Date");

        let resolved = LogSchemaResolver::default()
            .resolve(&schema, &labels(&["cpu_usage", "gpu_usage", "cpu_power", "gpu_power"]))
            .unwrap();
        let columns: Vec<_> = resolved.iter().map(|(_, c)| *c).collect();
        assert_eq!(columns, vec![2, 3, 4, 5]);
    }

    #[test]
    fn raw_labels_match_with_or_without_unit() {
        let schema = LogSchema::parse(ENGLISH);
        assert_eq!(schema.find("CPU Package Power [W]"), Some(3));
        assert_eq!(schema.find("cpu package power"), Some(3));
        assert_eq!(schema.find("gt cores power [w]"), Some(4));
        assert_eq!(schema.find("Physical Memory Load"), None);
    }

    #[test]
    fn unresolved_defaults_to_first_column() {
        let schema = LogSchema::parse(ENGLISH);
        let resolved = LogSchemaResolver::default()
            .resolve(&schema, &labels(&["Physical Memory Load"]))
            .unwrap();
        assert_eq!(resolved, vec![(Label::new("physical memory load"), 0)]);
    }

    #[test]
    fn fail_policy_lists_unresolved() {
        let schema = LogSchema::parse(ENGLISH);
        let result = LogSchemaResolver::new(UnresolvedColumnPolicy::Fail)
            .resolve(&schema, &labels(&["cpu_power", "Memory Load", "Fan1"]));
        match result {
            Err(TelemetryError::Resolution { unresolved }) => {
                assert_eq!(unresolved, vec!["memory load".to_string(), "fan1".to_string()]);
            }
            other => panic!("expected resolution error, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_headers_keep_first_column() {
        let schema = LogSchema::parse("Date,Time,Power [W],Power [W]");
        assert_eq!(schema.find("power [w]"), Some(2));
    }

    #[test]
    fn strip_unit_needs_bracket_suffix() {
        assert_eq!(strip_unit("CPU Package Power [W]"), Some("CPU Package Power"));
        assert_eq!(strip_unit("Date"), None);
        assert_eq!(strip_unit("[W]"), None);
    }

    #[test]
    fn reads_header_from_file_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("whinfo.CSV");
        let mut bytes = b"\"Date\",\"Time\",\"CPU Package Power [W]\",\"".to_vec();
        // GBK bytes for a localized column; decoded lossily
        bytes.extend_from_slice(&[0xB7, 0xE2, 0xD7, 0xB0]);
        bytes.extend_from_slice(b"\"\n1.1.2025,10:00:00,12.5,3\n");
        std::fs::write(&path, bytes).unwrap();

        let schema = LogSchema::read_from(&path).unwrap();
        assert_eq!(schema.len(), 4);
        assert_eq!(schema.find("cpu package power"), Some(2));
    }

    #[test]
    fn missing_file_is_file_error() {
        let result = LogSchema::read_from(Path::new("/nonexistent/whinfo.CSV"));
        assert!(matches!(result, Err(TelemetryError::File { .. })));
    }

    proptest! {
        #[test]
        fn parse_never_panics(header in ".*") {
            let schema = LogSchema::parse(&header);
            prop_assert!(schema.len() >= 1);
        }

        #[test]
        fn every_column_finds_itself_or_an_earlier_twin(
            names in prop::collection::vec("[A-Za-z][A-Za-z0-9 ]{0,12}", 1..12)
        ) {
            let schema = LogSchema::parse(&names.join(","));
            for (column, name) in schema.columns().iter().enumerate() {
                let found = schema.find(name);
                prop_assert!(matches!(found, Some(c) if c <= column));
            }
        }
    }
}
