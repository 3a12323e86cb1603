//! Hardware sensor telemetry from HWiNFO shared memory or its CSV log.
//!
//! sensortap samples named metrics ("CPU Package Power", `gpu_usage`) from an
//! external sensor monitor at a caller-chosen cadence with minimal per-sample
//! cost.
//!
//! # Features
//!
//! - **Shared memory**: parses the producer's binary header and tables once,
//!   then reads one element per subscribed label per sample
//! - **CSV log**: tails the producer's log, resolving columns from its header
//!   row whatever the column order or header language
//! - **One contract**: both backends implement [`TelemetrySource`], so
//!   consumers never know which one is active
//! - **Async polling**: [`poll::sample_stream`] turns a source into a
//!   `Stream` of snapshots with retry and cancellation
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use sensortap::{Label, SensorTap, TelemetrySource};
//!
//! fn main() -> sensortap::Result<()> {
//!     let mut source = SensorTap::connect(&[Label::new("cpu_power"), Label::new("GPU D3D Usage")])?;
//!
//!     if let Some(snapshot) = source.sample()?.into_snapshot() {
//!         println!("CPU package: {:?} W", snapshot.get("cpu_power"));
//!     }
//!     source.close();
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Binary layout and byte sources
pub mod layout;
pub mod segment;

// CSV log support
pub mod log;

// Source contract, implementations and configuration
pub mod config;
pub mod poll;
pub mod provider;
pub mod providers;

// Platform-specific modules
#[cfg(windows)]
pub mod windows;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use config::{BackendKind, TelemetryConfig};
pub use log::{LogLocation, UnresolvedColumnPolicy};
pub use poll::{PollOptions, SampleStream, sample_stream};
pub use provider::{Backend, TelemetrySource};
pub use providers::{LogTailSource, SharedMemorySource, open_source};
pub use segment::{DEFAULT_SEGMENT_NAME, DumpFile, MemorySegment, NamedSegment};

/// Unified entry point for telemetry sources.
///
/// Each constructor returns an opened source with `labels` resolved.
///
/// # Examples
///
/// ## Shared memory (Windows)
/// ```rust,no_run
/// use sensortap::{Label, SensorTap};
///
/// let source = SensorTap::connect(&[Label::new("cpu_power")])?;
/// # Ok::<(), sensortap::TelemetryError>(())
/// ```
///
/// ## CSV log (cross-platform)
/// ```rust,no_run
/// use sensortap::{Label, LogLocation, SensorTap};
///
/// let location = LogLocation::newest("C:\\hwinfo", "whinfo.CSV");
/// let source = SensorTap::tail(location, &[Label::new("cpu_power")])?;
/// # Ok::<(), sensortap::TelemetryError>(())
/// ```
pub struct SensorTap;

impl SensorTap {
    /// Open the producer's named shared-memory segment.
    ///
    /// # Platform
    ///
    /// Named segments exist only on Windows. On other platforms this returns
    /// an `UnsupportedPlatform` error.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The producer is not running or shared memory is disabled
    /// - The header is malformed
    /// - A label matches no reading
    pub fn connect(labels: &[Label]) -> Result<SharedMemorySource> {
        let mut source = SharedMemorySource::default();
        source.open()?;
        source.resolve(labels)?;
        Ok(source)
    }

    /// Replay a byte dump of a shared-memory segment.
    pub fn replay<P: AsRef<std::path::Path>>(path: P, labels: &[Label]) -> Result<SharedMemorySource> {
        let mut source = SharedMemorySource::new(DumpFile::new(path.as_ref()));
        source.open()?;
        source.resolve(labels)?;
        Ok(source)
    }

    /// Tail the producer's CSV log.
    pub fn tail(location: LogLocation, labels: &[Label]) -> Result<LogTailSource> {
        let mut source = LogTailSource::new(location);
        source.open()?;
        source.resolve(labels)?;
        Ok(source)
    }

    /// Open whichever backend `config` selects.
    pub fn from_config(config: &TelemetryConfig) -> Result<Box<dyn TelemetrySource>> {
        open_source(config)
    }
}
