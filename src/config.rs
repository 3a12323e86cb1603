//! Configuration for telemetry acquisition
//!
//! Loaded from YAML. Every field has a default, so an empty document plus a
//! label list is a working configuration.
//!
//! ```yaml
//! labels: [cpu_power, gpu_usage, "Total CPU Usage"]
//! interval_ms: 1000
//! backend:
//!   kind: auto
//!   log:
//!     directory: C:\hwinfo\logs
//!     suffix: whinfo.CSV
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::log::{LogLocation, UnresolvedColumnPolicy};
use crate::providers::{LogTailSource, SharedMemorySource};
use crate::segment::{DEFAULT_SEGMENT_NAME, DumpFile};
use crate::types::{CollisionPolicy, Label};
use crate::{Result, TelemetryError};

const DEFAULT_INTERVAL_MS: u64 = 1000;
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Which backend to open at start-up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    SharedMemory,
    LogTail,
    /// Shared memory, falling back to the log when the segment is unavailable.
    #[default]
    Auto,
}

/// Backend selection and per-backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Named shared-memory segment
    pub segment: String,
    /// Replay a segment dump instead of the named segment
    pub dump: Option<PathBuf>,
    pub log: Option<LogLocation>,
    pub unresolved_columns: UnresolvedColumnPolicy,
    pub collisions: CollisionPolicy,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            segment: DEFAULT_SEGMENT_NAME.to_string(),
            dump: None,
            log: None,
            unresolved_columns: UnresolvedColumnPolicy::default(),
            collisions: CollisionPolicy::default(),
        }
    }
}

/// Top-level telemetry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Labels or logical metric keys to sample
    pub labels: Vec<Label>,
    pub interval_ms: u64,
    /// Back-off after a transient error
    pub retry_delay_ms: u64,
    pub backend: BackendConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            labels: Vec::new(),
            interval_ms: DEFAULT_INTERVAL_MS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            backend: BackendConfig::default(),
        }
    }
}

impl TelemetryConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| TelemetryError::config(format!("Invalid YAML: {}", e)))?;
        config.validate()?;
        debug!(labels = config.labels.len(), kind = ?config.backend.kind, "Loaded telemetry config");
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| TelemetryError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }

    /// Check the settings are consistent.
    pub fn validate(&self) -> Result<()> {
        if self.labels.is_empty() {
            return Err(TelemetryError::config("At least one label is required"));
        }
        if let Some(empty) = self.labels.iter().position(Label::is_empty) {
            return Err(TelemetryError::config(format!("Label {} is empty", empty)));
        }
        if self.interval_ms == 0 {
            return Err(TelemetryError::config("interval_ms must be greater than zero"));
        }

        let backend = &self.backend;
        if backend.kind == BackendKind::LogTail && backend.log.is_none() {
            return Err(TelemetryError::config("The log_tail backend needs a log location"));
        }
        if backend.kind != BackendKind::LogTail
            && backend.dump.is_none()
            && backend.segment.trim().is_empty()
        {
            return Err(TelemetryError::config("Segment name is empty"));
        }
        if let Some(LogLocation::Newest { suffix, .. }) = &backend.log {
            if suffix.is_empty() {
                return Err(TelemetryError::config("Log suffix is empty"));
            }
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Closed shared-memory source for these settings.
    pub fn shared_memory_source(&self) -> SharedMemorySource {
        let source = match &self.backend.dump {
            Some(path) => SharedMemorySource::new(DumpFile::new(path)),
            None => SharedMemorySource::named(self.backend.segment.clone()),
        };
        source.with_collision_policy(self.backend.collisions)
    }

    /// Closed log tail source for these settings.
    pub fn log_tail_source(&self) -> Result<LogTailSource> {
        let location = self
            .backend
            .log
            .clone()
            .ok_or_else(|| TelemetryError::config("No log location configured"))?;
        Ok(LogTailSource::new(location).with_unresolved_policy(self.backend.unresolved_columns))
    }
}
