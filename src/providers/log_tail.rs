//! CSV log tail source
//!
//! Samples the producer's CSV log by reading its last two lines and parsing
//! the second-to-last one; the last line may still be mid-write. Column
//! positions come from the header row. Whenever the file changes its header
//! row is read again, and columns are re-resolved if the header differs from
//! the one they were resolved against or a newer log file has appeared.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, trace, warn};

use crate::log::{
    LogLocation, LogSchema, LogSchemaResolver, TailReader, UnresolvedColumnPolicy, split_fields,
};
use crate::provider::{Backend, TelemetrySource};
use crate::types::{Label, Sample, TelemetrySnapshot};
use crate::{Result, TelemetryError};

struct OpenLog {
    path: PathBuf,
    modified: Option<SystemTime>,
    len: u64,
    /// Header columns the mapping below was resolved against
    header: Vec<String>,
    /// Label to column, `None` until resolved against the current file
    columns: Option<Vec<(Label, usize)>>,
}

/// Snapshot source over a growing CSV sensor log.
pub struct LogTailSource {
    location: LogLocation,
    resolver: LogSchemaResolver,
    tail: TailReader,
    requested: Vec<Label>,
    open: Option<OpenLog>,
}

impl LogTailSource {
    pub fn new(location: LogLocation) -> Self {
        Self {
            location,
            resolver: LogSchemaResolver::default(),
            tail: TailReader::default(),
            requested: Vec::new(),
            open: None,
        }
    }

    pub fn with_unresolved_policy(mut self, policy: UnresolvedColumnPolicy) -> Self {
        self.resolver = LogSchemaResolver::new(policy);
        self
    }

    pub fn with_tail_reader(mut self, tail: TailReader) -> Self {
        self.tail = tail;
        self
    }

    pub fn location(&self) -> &LogLocation {
        &self.location
    }

    /// Log file currently being tailed.
    pub fn path(&self) -> Option<&Path> {
        self.open.as_ref().map(|open| open.path.as_path())
    }

    /// Resolved label-to-column mapping for the current file.
    pub fn columns(&self) -> impl Iterator<Item = (&Label, usize)> {
        self.open
            .iter()
            .filter_map(|open| open.columns.as_ref())
            .flatten()
            .map(|(label, column)| (label, *column))
    }

    fn resolve_columns(
        &self,
        path: &Path,
        schema: &LogSchema,
        labels: &[Label],
    ) -> Result<Vec<(Label, usize)>> {
        let columns = self.resolver.resolve(schema, labels)?;
        debug!(path = %path.display(), columns = ?columns, "Resolved log columns");
        Ok(columns)
    }
}

impl TelemetrySource for LogTailSource {
    fn open(&mut self) -> Result<()> {
        let path = self.location.locate()?;
        info!(path = %path.display(), "Opened telemetry log");
        self.open = Some(OpenLog { path, modified: None, len: 0, header: Vec::new(), columns: None });
        Ok(())
    }

    fn resolve(&mut self, labels: &[Label]) -> Result<()> {
        let path = match &self.open {
            Some(open) => open.path.clone(),
            None => return Err(TelemetryError::closed("resolve")),
        };

        let schema = LogSchema::read_from(&path)?;
        let columns = self.resolve_columns(&path, &schema, labels)?;
        self.requested = labels.to_vec();
        if let Some(open) = self.open.as_mut() {
            open.header = schema.columns().to_vec();
            open.columns = Some(columns);
            // Force the next sample to read even if the file is unchanged
            open.modified = None;
        }
        Ok(())
    }

    fn sample(&mut self) -> Result<Sample> {
        if self.open.is_none() {
            return Err(TelemetryError::closed("sample"));
        }

        let path = self.location.locate()?;
        let metadata = std::fs::metadata(&path).map_err(|e| {
            TelemetryError::connection_failed_with_source(
                format!("Log file {} disappeared", path.display()),
                Box::new(e),
            )
        })?;
        let modified = metadata.modified().map_err(|e| TelemetryError::file_error(path.clone(), e))?;
        let len = metadata.len();

        let Some(open) = self.open.as_ref() else {
            return Err(TelemetryError::closed("sample"));
        };

        let same_file = open.path == path;
        if same_file && open.modified == Some(modified) && open.len == len {
            debug!(path = %path.display(), "Log unchanged since last sample");
            return Ok(Sample::NoNewData);
        }

        let schema = LogSchema::read_from(&path)?;
        let header_changed = open.header.as_slice() != schema.columns();
        let columns = match (&open.columns, same_file && !header_changed) {
            (Some(columns), true) => columns.clone(),
            _ => {
                if !same_file {
                    info!(from = %open.path.display(), to = %path.display(), "Switched to newer log file");
                } else if header_changed {
                    info!(path = %path.display(), "Log header changed");
                }
                self.resolve_columns(&path, &schema, &self.requested)?
            }
        };

        let tail = self.tail.read(&path, 2)?;

        if let Some(open) = self.open.as_mut() {
            open.path = path.clone();
            open.modified = Some(modified);
            open.len = len;
            open.header = schema.columns().to_vec();
            open.columns = Some(columns.clone());
        }

        // In a two-line file the second-to-last line is the header
        if tail.lines.len() < 2 || (tail.from_start && tail.lines.len() == 2) {
            warn!(path = %path.display(), lines = tail.lines.len(), "Log has no complete data row yet");
            return Ok(Sample::Fresh(TelemetrySnapshot::empty()));
        }

        let row = &tail.lines[tail.lines.len() - 2];
        let fields: Vec<&str> = split_fields(row).collect();

        let mut values = BTreeMap::new();
        for (label, column) in &columns {
            match fields.get(*column).map(|field| field.parse::<f64>()) {
                Some(Ok(value)) => {
                    values.insert(label.clone(), value);
                }
                Some(Err(_)) => {
                    warn!(label = %label, column, field = fields[*column], "Skipping unparseable log field");
                }
                None => {
                    warn!(label = %label, column, fields = fields.len(), "Log row is missing column");
                }
            }
        }

        let row_time = match fields.as_slice() {
            [date, time, ..] => Some(format!("{date} {time}")),
            _ => None,
        };

        let snapshot = TelemetrySnapshot::new(values).with_row_time(row_time);
        trace!(values = snapshot.len(), row_time = ?snapshot.row_time(), "Sampled log row");
        Ok(Sample::Fresh(snapshot))
    }

    fn close(&mut self) {
        if let Some(open) = self.open.take() {
            info!(path = %open.path.display(), "Closed telemetry log");
        }
    }

    fn is_open(&self) -> bool {
        self.open.is_some()
    }

    fn backend(&self) -> Backend {
        Backend::LogTail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};
    use std::fs::{File, FileTimes, OpenOptions};
    use std::io::Write;
    use std::time::Duration;

    fn labels(names: &[&str]) -> Vec<Label> {
        names.iter().map(Label::new).collect()
    }

    fn write_log(path: &Path, contents: &str, age_secs: u64) {
        std::fs::write(path, contents).unwrap();
        let when = SystemTime::now() - Duration::from_secs(age_secs);
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_times(FileTimes::new().set_modified(when))
            .unwrap();
    }

    fn append(path: &Path, contents: &str) {
        let mut file = OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        // Push mtime forward so coarse filesystem clocks still see a change
        file.set_times(FileTimes::new().set_modified(SystemTime::now() + Duration::from_secs(5)))
            .unwrap();
    }

    #[test]
    fn second_to_last_row_is_sampled() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("whinfo.CSV");
        write_log(&path, "h1,h2,CPU Package Power [W]\n1,2,55.3\n1,2,60.1", 10);

        let mut source = LogTailSource::new(LogLocation::file(&path));
        source.open()?;
        source.resolve(&labels(&["cpu_power"]))?;

        let snapshot = source.sample()?.into_snapshot().context("fresh sample")?;
        assert_eq!(snapshot.get("cpu_power"), Some(55.3));
        assert_eq!(snapshot.row_time(), Some("1 2"));

        assert_eq!(source.sample()?, Sample::NoNewData);
        Ok(())
    }

    #[test]
    fn appended_rows_are_seen() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("whinfo.CSV");
        write_log(&path, "Date,Time,CPU Package Power [W]\n1.1.2025,10:00:00,55.3\n1.1.2025,10:00:01,60.1\n", 10);

        let mut source = LogTailSource::new(LogLocation::file(&path));
        source.open()?;
        source.resolve(&labels(&["CPU Package Power"]))?;
        source.sample()?;

        append(&path, "1.1.2025,10:00:02,61.7\n");
        let snapshot = source.sample()?.into_snapshot().context("fresh sample")?;
        assert_eq!(snapshot.get("cpu package power"), Some(60.1));
        assert_eq!(snapshot.row_time(), Some("1.1.2025 10:00:01"));
        Ok(())
    }

    #[test]
    fn header_only_or_single_row_yields_empty_snapshot() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("whinfo.CSV");
        let mut source = LogTailSource::new(LogLocation::file(&path));

        write_log(&path, "Date,Time,CPU Package Power [W]\n", 10);
        source.open()?;
        source.resolve(&labels(&["cpu_power"]))?;
        let snapshot = source.sample()?.into_snapshot().context("fresh sample")?;
        assert!(snapshot.is_empty());

        append(&path, "1.1.2025,10:00:00,55.3\n");
        let snapshot = source.sample()?.into_snapshot().context("fresh sample")?;
        assert!(snapshot.is_empty());
        Ok(())
    }

    #[test]
    fn unparseable_fields_are_skipped() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("whinfo.CSV");
        write_log(
            &path,
            "Date,Time,CPU Package Power [W],GPU D3D Usage [%]\n1.1.2025,10:00:00,n/a,12.5\n1.1.2025,10:00:01,1,2\n",
            10,
        );

        let mut source = LogTailSource::new(LogLocation::file(&path));
        source.open()?;
        source.resolve(&labels(&["cpu_power", "gpu_usage"]))?;

        let snapshot = source.sample()?.into_snapshot().context("fresh sample")?;
        assert_eq!(snapshot.get("cpu_power"), None);
        assert_eq!(snapshot.get("gpu_usage"), Some(12.5));
        Ok(())
    }

    #[test]
    fn unresolved_label_reads_date_column_and_is_skipped() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("whinfo.CSV");
        write_log(&path, "Date,Time,CPU Package Power [W]\n1.1.2025,10:00:00,5\n1.1.2025,10:00:01,6\n", 10);

        let mut source = LogTailSource::new(LogLocation::file(&path));
        source.open()?;
        source.resolve(&labels(&["Fan1"]))?;
        assert_eq!(source.columns().collect::<Vec<_>>(), vec![(&Label::new("fan1"), 0)]);

        let snapshot = source.sample()?.into_snapshot().context("fresh sample")?;
        assert!(snapshot.is_empty());
        Ok(())
    }

    #[test]
    fn fail_policy_rejects_unknown_columns() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("whinfo.CSV");
        write_log(&path, "Date,Time,CPU Package Power [W]\n", 10);

        let mut source = LogTailSource::new(LogLocation::file(&path))
            .with_unresolved_policy(UnresolvedColumnPolicy::Fail);
        source.open()?;
        let result = source.resolve(&labels(&["cpu_power", "Fan1"]));
        assert!(matches!(result, Err(TelemetryError::Resolution { .. })));
        Ok(())
    }

    #[test]
    fn newer_log_file_is_followed_and_reresolved() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let old = dir.path().join("a_whinfo.CSV");
        write_log(&old, "Date,Time,CPU Package Power [W]\nd,t,10\nd,t,11\n", 600);

        let mut source = LogTailSource::new(LogLocation::newest(dir.path(), "whinfo.CSV"));
        source.open()?;
        source.resolve(&labels(&["cpu_power"]))?;
        let snapshot = source.sample()?.into_snapshot().context("fresh sample")?;
        assert_eq!(snapshot.get("cpu_power"), Some(10.0));

        // A new session writes columns in another order
        let new = dir.path().join("b_whinfo.CSV");
        write_log(&new, "Date,Time,GPU D3D Usage [%],CPU Package Power [W]\nd,t,1,20\nd,t,2,21\n", 0);

        let snapshot = source.sample()?.into_snapshot().context("fresh sample")?;
        assert_eq!(snapshot.get("cpu_power"), Some(20.0));
        assert_eq!(source.path(), Some(new.as_path()));
        Ok(())
    }

    #[test]
    fn truncated_log_is_reresolved() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("whinfo.CSV");
        write_log(&path, "Date,Time,CPU Package Power [W],Pad\nd,t,10,0000000000\nd,t,11,0000000000\n", 10);

        let mut source = LogTailSource::new(LogLocation::file(&path));
        source.open()?;
        source.resolve(&labels(&["cpu_power"]))?;
        source.sample()?;

        write_log(&path, "Date,Time,X,CPU Package Power [W]\nd,t,0,30\nd,t,0,31\n", 0);
        let snapshot = source.sample()?.into_snapshot().context("fresh sample")?;
        assert_eq!(snapshot.get("cpu_power"), Some(30.0));
        Ok(())
    }

    #[test]
    fn rewritten_header_in_same_file_is_reresolved() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("whinfo.CSV");

        let mut before = String::from("Date,Time,CPU Package Power [W],GPU D3D Usage [%]\n");
        before.push_str(&"d,t,10,70\n".repeat(1000));
        write_log(&path, &before, 10);

        let mut source = LogTailSource::new(LogLocation::file(&path));
        source.open()?;
        source.resolve(&labels(&["cpu_power"]))?;
        let snapshot = source.sample()?.into_snapshot().context("fresh sample")?;
        assert_eq!(snapshot.get("cpu_power"), Some(10.0));

        // Logging restarts at the same path with the columns swapped and the
        // file already longer than before
        let mut after = String::from("Date,Time,GPU D3D Usage [%],CPU Package Power [W]\n");
        after.push_str(&"d,t,70,20\n".repeat(1200));
        write_log(&path, &after, 0);

        let snapshot = source.sample()?.into_snapshot().context("fresh sample")?;
        assert_eq!(snapshot.get("cpu_power"), Some(20.0));
        assert_eq!(source.columns().collect::<Vec<_>>(), vec![(&Label::new("cpu_power"), 3)]);
        Ok(())
    }

    #[test]
    fn missing_log_is_connection_error() {
        let mut source = LogTailSource::new(LogLocation::file("/nonexistent/whinfo.CSV"));
        assert!(matches!(source.open(), Err(TelemetryError::Connection { .. })));
    }

    #[test]
    fn closed_source_rejects_calls() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("whinfo.CSV");
        write_log(&path, "Date,Time\n", 0);

        let mut source = LogTailSource::new(LogLocation::file(&path));
        assert!(matches!(source.resolve(&[]), Err(TelemetryError::Closed { operation: "resolve" })));

        source.open()?;
        source.close();
        assert!(matches!(source.sample(), Err(TelemetryError::Closed { operation: "sample" })));
        Ok(())
    }
}
