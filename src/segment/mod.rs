//! Byte sources a shared-memory snapshot source can read from
//!
//! A [`Segment`] is an open, read-only view of the producer's segment. A
//! [`SegmentOpener`] knows how to obtain one and is called on every `open()`,
//! so a source can be closed and reopened after the producer restarts.
//!
//! Provided openers:
//!
//! - [`NamedSegment`]: the OS-global named mapping (Windows)
//! - [`MemorySegment`]: an in-process buffer, shared between clones
//! - [`DumpFile`]: a file holding a byte copy of a segment, for offline replay

use crate::{Result, TelemetryError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Well-known name of the producer's sensor segment
pub const DEFAULT_SEGMENT_NAME: &str = "Global\\HWiNFO_SENS_SM2";

/// Read-only view of an open segment.
pub trait Segment: Send {
    /// Total readable length in bytes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `buf.len()` bytes starting at `offset` into `buf`.
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<()>;
}

/// Produces a fresh [`Segment`] each time a source is opened.
pub trait SegmentOpener: Send {
    fn open_segment(&self) -> Result<Box<dyn Segment>>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

fn check_bounds(len: usize, offset: usize, requested: usize) -> Result<()> {
    match offset.checked_add(requested) {
        Some(end) if end <= len => Ok(()),
        _ => Err(TelemetryError::layout(
            offset,
            format!("Read of {} bytes exceeds segment of {} bytes", requested, len),
        )),
    }
}

/// In-process segment backed by a shared buffer.
///
/// Clones share the same bytes, so one clone can play the producer while a
/// source samples another.
#[derive(Debug, Clone, Default)]
pub struct MemorySegment {
    bytes: Arc<RwLock<Vec<u8>>>,
}

impl MemorySegment {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes: Arc::new(RwLock::new(bytes)) }
    }

    /// Overwrite bytes at `offset`.
    pub fn write_at(&self, offset: usize, data: &[u8]) -> Result<()> {
        let mut bytes = self
            .bytes
            .write()
            .map_err(|_| TelemetryError::connection_failed("Memory segment lock poisoned"))?;
        check_bounds(bytes.len(), offset, data.len())?;
        bytes[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Replace the whole buffer, as a restarting producer would.
    pub fn replace(&self, data: Vec<u8>) -> Result<()> {
        let mut bytes = self
            .bytes
            .write()
            .map_err(|_| TelemetryError::connection_failed("Memory segment lock poisoned"))?;
        *bytes = data;
        Ok(())
    }

    /// Copy of the current contents.
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.read().map(|bytes| bytes.clone()).unwrap_or_default()
    }
}

impl Segment for MemorySegment {
    fn len(&self) -> usize {
        self.bytes.read().map(|bytes| bytes.len()).unwrap_or(0)
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        let bytes = self
            .bytes
            .read()
            .map_err(|_| TelemetryError::connection_failed("Memory segment lock poisoned"))?;
        check_bounds(bytes.len(), offset, buf.len())?;
        buf.copy_from_slice(&bytes[offset..offset + buf.len()]);
        Ok(())
    }
}

impl SegmentOpener for MemorySegment {
    fn open_segment(&self) -> Result<Box<dyn Segment>> {
        Ok(Box::new(self.clone()))
    }

    fn describe(&self) -> String {
        format!("in-memory segment ({} bytes)", Segment::len(self))
    }
}

/// A file containing a byte copy of a segment.
///
/// The whole file is loaded on open; later changes to the file are not seen
/// until the source is reopened.
#[derive(Debug, Clone)]
pub struct DumpFile {
    path: PathBuf,
}

impl DumpFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SegmentOpener for DumpFile {
    fn open_segment(&self) -> Result<Box<dyn Segment>> {
        let bytes = std::fs::read(&self.path).map_err(|e| {
            TelemetryError::connection_failed_with_source(
                format!("Cannot read segment dump {}", self.path.display()),
                Box::new(e),
            )
        })?;
        debug!(path = %self.path.display(), len = bytes.len(), "Loaded segment dump");
        Ok(Box::new(MemorySegment::new(bytes)))
    }

    fn describe(&self) -> String {
        format!("segment dump {}", self.path.display())
    }
}

/// The producer's OS-global named segment, mapped read-only.
#[derive(Debug, Clone)]
pub struct NamedSegment {
    name: String,
}

impl NamedSegment {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Default for NamedSegment {
    fn default() -> Self {
        Self::new(DEFAULT_SEGMENT_NAME)
    }
}

impl SegmentOpener for NamedSegment {
    #[cfg(windows)]
    fn open_segment(&self) -> Result<Box<dyn Segment>> {
        let mapping = crate::windows::MappedSegment::open(&self.name)?;
        Ok(Box::new(mapping))
    }

    #[cfg(not(windows))]
    fn open_segment(&self) -> Result<Box<dyn Segment>> {
        Err(TelemetryError::unsupported_platform("Named shared-memory segments", "Windows"))
    }

    fn describe(&self) -> String {
        format!("named segment {}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn memory_segment_clones_share_bytes() {
        let producer = MemorySegment::new(vec![0u8; 8]);
        let consumer = producer.clone();

        producer.write_at(4, &[1, 2, 3, 4]).unwrap();

        let mut buf = [0u8; 4];
        consumer.read_at(4, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn out_of_bounds_reads_fail() {
        let segment = MemorySegment::new(vec![0u8; 8]);
        let mut buf = [0u8; 4];
        assert!(segment.read_at(6, &mut buf).is_err());
        assert!(segment.read_at(usize::MAX, &mut buf).is_err());
        assert!(segment.write_at(7, &[0, 0]).is_err());
    }

    #[test]
    fn dump_file_loads_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[9, 8, 7]).unwrap();

        let segment = DumpFile::new(file.path()).open_segment().unwrap();
        let mut buf = [0u8; 3];
        segment.read_at(0, &mut buf).unwrap();
        assert_eq!(buf, [9, 8, 7]);
    }

    #[test]
    fn missing_dump_is_connection_error() {
        let result = DumpFile::new("/nonexistent/segment.bin").open_segment();
        assert!(matches!(result, Err(TelemetryError::Connection { .. })));
    }

    #[cfg(not(windows))]
    #[test]
    fn named_segments_need_windows() {
        let result = NamedSegment::default().open_segment();
        assert!(matches!(result, Err(TelemetryError::UnsupportedPlatform { .. })));
    }
}
