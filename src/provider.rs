//! The contract both telemetry backends implement

use crate::types::{Label, Sample};
use crate::Result;

/// Which storage a source reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    SharedMemory,
    LogTail,
}

/// Trait for telemetry sources
///
/// Everything downstream depends only on this trait, never on which backend
/// is active. All methods are synchronous and bounded: `sample` costs one
/// pass over the subscribed labels (shared memory) or one stat plus a bounded
/// tail read (log), so it can be called from a tight polling loop at whatever
/// cadence the caller picks.
pub trait TelemetrySource: Send {
    /// Connect to the underlying storage and build the label index.
    ///
    /// Fails with a connection error when the segment or file is absent.
    fn open(&mut self) -> Result<()>;

    /// Subscribe to `labels` (case-insensitive).
    ///
    /// Idempotent; calling it again replaces the subscription.
    fn resolve(&mut self, labels: &[Label]) -> Result<()>;

    /// Read the current values of the subscribed labels.
    ///
    /// Returns:
    /// - `Ok(Sample::Fresh(snapshot))` - New values read
    /// - `Ok(Sample::NoNewData)` - Source unchanged since the last sample
    /// - `Err(e)` - Source closed or a transient read failure
    fn sample(&mut self) -> Result<Sample>;

    /// Release the underlying handle. Safe to call more than once.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    fn backend(&self) -> Backend;
}

impl<T: TelemetrySource + ?Sized> TelemetrySource for Box<T> {
    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn resolve(&mut self, labels: &[Label]) -> Result<()> {
        (**self).resolve(labels)
    }

    fn sample(&mut self) -> Result<Sample> {
        (**self).sample()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn backend(&self) -> Backend {
        (**self).backend()
    }
}
