//! Shared-memory snapshot source
//!
//! Opening a source reads the header once and makes a single pass over the
//! reading table to build the [`LabelIndex`]. After `resolve`, each sample
//! reads exactly one element-sized slice per subscribed label at
//! `reading_section_offset + row * reading_element_size`, so steady-state
//! cost is independent of how many readings the producer publishes.

use std::collections::BTreeMap;
use tracing::{debug, info, trace, warn};

use crate::layout::{
    HEADER_SIZE, ReadingElement, SharedMemoryHeader, decode_reading, decode_sensor,
};
use crate::provider::{Backend, TelemetrySource};
use crate::segment::{NamedSegment, Segment, SegmentOpener};
use crate::types::{CollisionPolicy, Label, LabelIndex, Sample, TelemetrySnapshot};
use crate::{Result, TelemetryError};

/// Read instrumentation for a shared-memory source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Full passes over the reading table (open and `read_all`)
    pub table_passes: u64,
    /// Single-element reads made while sampling
    pub element_reads: u64,
}

/// One reading from a full catalog listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingRecord {
    /// Row in the reading table
    pub row: usize,
    /// Display name of the owning sensor, empty if the index is out of range
    pub sensor_name: String,
    pub reading: ReadingElement,
}

struct OpenSegment {
    segment: Box<dyn Segment>,
    header: SharedMemoryHeader,
    index: LabelIndex,
    sensor_names: Vec<String>,
}

#[derive(Debug, Clone)]
struct Subscription {
    label: Label,
    row: usize,
    offset: usize,
}

/// Snapshot source over the producer's shared-memory segment.
pub struct SharedMemorySource {
    opener: Box<dyn SegmentOpener>,
    policy: CollisionPolicy,
    open: Option<OpenSegment>,
    subscriptions: Vec<Subscription>,
    scratch: Vec<u8>,
    stats: ReadStats,
}

impl SharedMemorySource {
    /// Create a closed source that opens segments through `opener`.
    pub fn new(opener: impl SegmentOpener + 'static) -> Self {
        Self {
            opener: Box::new(opener),
            policy: CollisionPolicy::default(),
            open: None,
            subscriptions: Vec::new(),
            scratch: Vec::new(),
            stats: ReadStats::default(),
        }
    }

    /// Create a closed source for the OS-global segment `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(NamedSegment::new(name))
    }

    /// Choose which row keeps a label exposed by several rows.
    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Header read at open time.
    pub fn header(&self) -> Option<&SharedMemoryHeader> {
        self.open.as_ref().map(|open| &open.header)
    }

    /// Label index built at open time.
    pub fn index(&self) -> Option<&LabelIndex> {
        self.open.as_ref().map(|open| &open.index)
    }

    /// Sensor display names in table order.
    pub fn sensor_names(&self) -> &[String] {
        self.open.as_ref().map(|open| open.sensor_names.as_slice()).unwrap_or(&[])
    }

    /// Currently subscribed labels with their reading rows.
    pub fn subscriptions(&self) -> impl Iterator<Item = (&Label, usize)> {
        self.subscriptions.iter().map(|sub| (&sub.label, sub.row))
    }

    pub fn stats(&self) -> ReadStats {
        self.stats
    }

    /// Decode every reading with its sensor name.
    ///
    /// This is a full table scan for diagnostics and label discovery; it is
    /// never used on the sampling path.
    pub fn read_all(&mut self) -> Result<Vec<ReadingRecord>> {
        let open = self.open.as_ref().ok_or(TelemetryError::closed("read_all"))?;
        let image = read_image(open.segment.as_ref(), &open.header)?;
        self.stats.table_passes += 1;

        let mut records = Vec::with_capacity(open.header.reading_count());
        for row in 0..open.header.reading_count() {
            match decode_reading(&image, &open.header, row) {
                Ok(reading) => {
                    let sensor_name = open
                        .sensor_names
                        .get(reading.sensor_index as usize)
                        .cloned()
                        .unwrap_or_default();
                    records.push(ReadingRecord { row, sensor_name, reading });
                }
                Err(e) => warn!(row, error = %e, "Skipping malformed reading element"),
            }
        }
        Ok(records)
    }

    fn open_segment(&self) -> Result<OpenSegment> {
        let segment = self.opener.open_segment()?;

        if segment.len() < HEADER_SIZE {
            return Err(TelemetryError::connection_failed(format!(
                "{} is {} bytes, smaller than the {}-byte header",
                self.opener.describe(),
                segment.len(),
                HEADER_SIZE
            )));
        }

        let mut header_bytes = [0u8; HEADER_SIZE];
        segment.read_at(0, &mut header_bytes)?;
        let header = SharedMemoryHeader::parse(&header_bytes)?;

        let image = read_image(segment.as_ref(), &header)?;

        let mut sensor_names = Vec::with_capacity(header.sensor_count());
        for row in 0..header.sensor_count() {
            match decode_sensor(&image, &header, row) {
                Ok(sensor) => sensor_names.push(sensor.display_name().to_string()),
                Err(e) => {
                    warn!(row, error = %e, "Skipping malformed sensor element");
                    sensor_names.push(String::new());
                }
            }
        }

        let mut index = LabelIndex::with_capacity(self.policy, header.reading_count() * 2);
        for row in 0..header.reading_count() {
            match decode_reading(&image, &header, row) {
                Ok(reading) => {
                    index.insert(Label::new(&reading.label_original), row);
                    index.insert(Label::new(&reading.label_user), row);
                }
                Err(e) => warn!(row, error = %e, "Skipping malformed reading element"),
            }
        }

        if index.collisions() > 0 {
            debug!(
                collisions = index.collisions(),
                policy = ?index.policy(),
                "Readings share labels; collision policy applied"
            );
        }

        Ok(OpenSegment { segment, header, index, sensor_names })
    }

    fn lookup(index: &LabelIndex, label: &Label) -> Option<usize> {
        if let Some(row) = index.get(label.as_str()) {
            return Some(row);
        }
        label
            .logical()
            .and_then(|metric| metric.reading_labels().iter().find_map(|alias| index.get(alias)))
    }
}

impl Default for SharedMemorySource {
    fn default() -> Self {
        Self::new(NamedSegment::default())
    }
}

/// Copy the header and both tables out of the segment in one read.
fn read_image(segment: &dyn Segment, header: &SharedMemoryHeader) -> Result<Vec<u8>> {
    let required = header.required_len()?;
    if segment.len() < required {
        return Err(TelemetryError::layout(
            segment.len(),
            format!("Tables need {} bytes but segment holds {}", required, segment.len()),
        ));
    }
    let mut image = vec![0u8; required];
    segment.read_at(0, &mut image)?;
    Ok(image)
}

impl TelemetrySource for SharedMemorySource {
    fn open(&mut self) -> Result<()> {
        if self.open.is_some() {
            debug!("Reopening shared memory source");
            self.close();
        }

        let open = self.open_segment()?;
        self.stats.table_passes += 1;

        info!(
            source = %self.opener.describe(),
            version = open.header.version,
            revision = open.header.revision,
            sensors = open.header.sensor_count(),
            readings = open.header.reading_count(),
            labels = open.index.len(),
            "Opened shared memory telemetry"
        );

        self.scratch = vec![0u8; open.header.reading_stride()];
        self.open = Some(open);
        Ok(())
    }

    fn resolve(&mut self, labels: &[Label]) -> Result<()> {
        let open = self.open.as_ref().ok_or(TelemetryError::closed("resolve"))?;

        let mut resolved = Vec::with_capacity(labels.len());
        let mut unresolved = Vec::new();

        for label in labels {
            if resolved.iter().any(|sub: &Subscription| &sub.label == label) {
                continue;
            }
            match Self::lookup(&open.index, label) {
                Some(row) => {
                    let offset = open.header.reading_offset(row)?;
                    resolved.push(Subscription { label: label.clone(), row, offset });
                }
                None => unresolved.push(label.to_string()),
            }
        }

        if !unresolved.is_empty() {
            warn!(unresolved = ?unresolved, "Labels not found in reading table");
            return Err(TelemetryError::Resolution { unresolved });
        }

        debug!(count = resolved.len(), "Resolved labels to reading rows");
        self.subscriptions = resolved;
        Ok(())
    }

    fn sample(&mut self) -> Result<Sample> {
        let open = self.open.as_ref().ok_or(TelemetryError::closed("sample"))?;

        // The header is re-read for the poll time and to notice a producer
        // that shut down since open
        let mut header_bytes = [0u8; HEADER_SIZE];
        open.segment.read_at(0, &mut header_bytes)?;
        let current = SharedMemoryHeader::decode(&header_bytes)?;
        if current.is_dead() {
            return Err(TelemetryError::connection_failed(
                "Producer has shut down (segment signature is DEAD)",
            ));
        }

        let mut values = BTreeMap::new();
        for sub in &self.subscriptions {
            self.stats.element_reads += 1;
            if let Err(e) = open.segment.read_at(sub.offset, &mut self.scratch) {
                match e {
                    TelemetryError::Layout { .. } => {
                        warn!(label = %sub.label, error = %e, "Skipping unreadable element");
                        continue;
                    }
                    other => return Err(other),
                }
            }

            match ReadingElement::decode(&self.scratch) {
                Ok(reading) => {
                    values.insert(sub.label.clone(), reading.value);
                }
                Err(e) => {
                    warn!(label = %sub.label, row = sub.row, error = %e, "Skipping malformed element")
                }
            }
        }

        let snapshot = TelemetrySnapshot::new(values).with_poll_time(current.poll_time);
        trace!(values = snapshot.len(), poll_time = current.poll_time, "Sampled shared memory");
        Ok(Sample::Fresh(snapshot))
    }

    fn close(&mut self) {
        if self.open.take().is_some() {
            info!(source = %self.opener.describe(), "Closed shared memory telemetry");
        }
        self.subscriptions.clear();
    }

    fn is_open(&self) -> bool {
        self.open.is_some()
    }

    fn backend(&self) -> Backend {
        Backend::SharedMemory
    }
}
