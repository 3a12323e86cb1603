//! Telemetry source implementations and start-up backend selection

mod log_tail;
mod shared_memory;

pub use log_tail::LogTailSource;
pub use shared_memory::{ReadStats, ReadingRecord, SharedMemorySource};

use tracing::{info, warn};

use crate::config::{BackendKind, TelemetryConfig};
use crate::provider::TelemetrySource;
use crate::{Result, TelemetryError};

/// Open and resolve the backend `config` selects.
///
/// The backend is chosen once here. With [`BackendKind::Auto`] shared memory
/// is tried first and the log is used when a log location is configured and
/// the segment cannot be opened or is malformed.
pub fn open_source(config: &TelemetryConfig) -> Result<Box<dyn TelemetrySource>> {
    config.validate()?;

    let mut source = match config.backend.kind {
        BackendKind::SharedMemory => open_shared_memory(config)?,
        BackendKind::LogTail => open_log_tail(config)?,
        BackendKind::Auto => match open_shared_memory(config) {
            Ok(source) => source,
            Err(e) if falls_back(&e) && config.backend.log.is_some() => {
                warn!(error = %e, "Shared memory unavailable, using log backend");
                open_log_tail(config)?
            }
            Err(e) => return Err(e),
        },
    };

    source.resolve(&config.labels)?;
    info!(backend = ?source.backend(), labels = config.labels.len(), "Telemetry source ready");
    Ok(source)
}

fn falls_back(error: &TelemetryError) -> bool {
    matches!(
        error,
        TelemetryError::Connection { .. }
            | TelemetryError::UnsupportedPlatform { .. }
            | TelemetryError::Layout { .. }
            | TelemetryError::Signature { .. }
    )
}

fn open_shared_memory(config: &TelemetryConfig) -> Result<Box<dyn TelemetrySource>> {
    let mut source = config.shared_memory_source();
    source.open()?;
    Ok(Box::new(source))
}

fn open_log_tail(config: &TelemetryConfig) -> Result<Box<dyn TelemetrySource>> {
    let mut source = config.log_tail_source()?;
    source.open()?;
    Ok(Box::new(source))
}
