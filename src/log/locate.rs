//! Finding the log file

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, trace};

use crate::{Result, TelemetryError};

/// Where the producer writes its CSV log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogLocation {
    /// A fixed file path.
    File { path: PathBuf },
    /// The most recently modified file in `directory` whose name ends with
    /// `suffix`. The producer starts a new file per logging session.
    Newest { directory: PathBuf, suffix: String },
}

impl LogLocation {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        LogLocation::File { path: path.into() }
    }

    pub fn newest(directory: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        LogLocation::Newest { directory: directory.into(), suffix: suffix.into() }
    }

    /// Resolve to a concrete file path.
    ///
    /// Fails with a connection error when the file, the directory, or any
    /// matching file is absent.
    pub fn locate(&self) -> Result<PathBuf> {
        match self {
            LogLocation::File { path } => {
                if path.is_file() {
                    Ok(path.clone())
                } else {
                    Err(TelemetryError::connection_failed(format!(
                        "Log file {} does not exist",
                        path.display()
                    )))
                }
            }
            LogLocation::Newest { directory, suffix } => newest_with_suffix(directory, suffix),
        }
    }
}

fn newest_with_suffix(directory: &Path, suffix: &str) -> Result<PathBuf> {
    let entries = std::fs::read_dir(directory).map_err(|e| {
        TelemetryError::connection_failed_with_source(
            format!("Log directory {} is not readable", directory.display()),
            Box::new(e),
        )
    })?;

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if !name.to_string_lossy().ends_with(suffix) {
            continue;
        }
        let Ok(metadata) = entry.metadata() else { continue };
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let path = entry.path();
        trace!(path = %path.display(), "Candidate log file");

        // Ties go to the lexically greater name so the choice is stable
        let replace = match &newest {
            None => true,
            Some((best_time, best_path)) => {
                (modified, &path) > (*best_time, best_path)
            }
        };
        if replace {
            newest = Some((modified, path));
        }
    }

    match newest {
        Some((_, path)) => {
            debug!(path = %path.display(), "Located newest log file");
            Ok(path)
        }
        None => Err(TelemetryError::connection_failed(format!(
            "No log file ending with {:?} in {}",
            suffix,
            directory.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{File, FileTimes};
    use std::time::Duration;

    fn touch(path: &Path, age_secs: u64) {
        let file = File::create(path).unwrap();
        let when = SystemTime::now() - Duration::from_secs(age_secs);
        file.set_times(FileTimes::new().set_modified(when)).unwrap();
    }

    #[test]
    fn fixed_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("whinfo.CSV");

        let location = LogLocation::file(&path);
        assert!(matches!(location.locate(), Err(TelemetryError::Connection { .. })));

        touch(&path, 0);
        assert_eq!(location.locate().unwrap(), path);
    }

    #[test]
    fn picks_newest_matching_file() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("monday_whinfo.CSV"), 600);
        touch(&dir.path().join("tuesday_whinfo.CSV"), 60);
        touch(&dir.path().join("notes.txt"), 0);

        let located = LogLocation::newest(dir.path(), "whinfo.CSV").locate().unwrap();
        assert_eq!(located, dir.path().join("tuesday_whinfo.CSV"));
    }

    #[test]
    fn suffix_match_is_case_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("log_whinfo.csv"), 0);

        let result = LogLocation::newest(dir.path(), "whinfo.CSV").locate();
        assert!(matches!(result, Err(TelemetryError::Connection { .. })));
    }

    #[test]
    fn missing_directory_is_connection_error() {
        let result = LogLocation::newest("/nonexistent/hwinfo/logs", "whinfo.CSV").locate();
        assert!(matches!(result, Err(TelemetryError::Connection { .. })));
    }

    #[test]
    fn deserializes_either_shape() {
        let file: LogLocation = serde_yaml_ng::from_str("path: /tmp/whinfo.CSV").unwrap();
        assert_eq!(file, LogLocation::file("/tmp/whinfo.CSV"));

        let newest: LogLocation =
            serde_yaml_ng::from_str("directory: /tmp/logs\nsuffix: whinfo.CSV").unwrap();
        assert_eq!(newest, LogLocation::newest("/tmp/logs", "whinfo.CSV"));
    }
}
