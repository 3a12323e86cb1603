//! Segment header parsing
//!
//! ```c
//! #pragma pack(1)
//! typedef struct _HWiNFO_SENSORS_SHARED_MEM2 {
//!     DWORD   dwSignature;              // "HWiS" while live, "DEAD" after shutdown
//!     DWORD   dwVersion;
//!     DWORD   dwRevision;
//!     __time64_t poll_time;             // last polling time
//!     DWORD   dwOffsetOfSensorSection;
//!     DWORD   dwSizeOfSensorElement;
//!     DWORD   dwNumSensorElements;
//!     DWORD   dwOffsetOfReadingSection;
//!     DWORD   dwSizeOfReadingElement;
//!     DWORD   dwNumReadingElements;
//! } HWiNFO_SENSORS_SHARED_MEM2;
//! ```
//!
//! The header is read once per connection. Offsets and sizes are treated as
//! immutable until the source is reopened.

use super::{
    HEADER_SIZE, READING_ELEMENT_SIZE, SENSOR_ELEMENT_SIZE, SIGNATURE_DEAD, SIGNATURE_LIVE,
    read_i64, read_u32,
};
use crate::{Result, TelemetryError};
use tracing::{debug, trace};

/// Upper bound on table element counts; larger values indicate corruption
const MAX_ELEMENTS: u32 = 100_000;

/// Upper bound on element strides, checked even for empty tables
const MAX_ELEMENT_SIZE: u32 = 64 * 1024;

/// Decoded segment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedMemoryHeader {
    pub signature: u32,
    pub version: u32,
    pub revision: u32,
    /// Producer's last poll time (Unix seconds)
    pub poll_time: i64,
    pub sensor_section_offset: u32,
    pub sensor_element_size: u32,
    pub sensor_element_count: u32,
    pub reading_section_offset: u32,
    pub reading_element_size: u32,
    pub reading_element_count: u32,
}

impl SharedMemoryHeader {
    /// Size of the packed header in bytes
    pub const SIZE: usize = HEADER_SIZE;

    /// Decode and validate the header at the start of `memory`.
    pub fn parse(memory: &[u8]) -> Result<Self> {
        trace!(memory_len = memory.len(), "Parsing segment header");

        if memory.len() < HEADER_SIZE {
            return Err(TelemetryError::layout(
                memory.len(),
                format!("Segment header needs {} bytes, have {}", HEADER_SIZE, memory.len()),
            ));
        }

        let header = Self::decode(memory)?;

        debug!(
            version = header.version,
            revision = header.revision,
            poll_time = header.poll_time,
            sensors = header.sensor_element_count,
            readings = header.reading_element_count,
            reading_stride = header.reading_element_size,
            "Parsed segment header"
        );

        header.validate()?;
        Ok(header)
    }

    /// Decode the header fields without validation.
    pub fn decode(memory: &[u8]) -> Result<Self> {
        Ok(Self {
            signature: read_u32(memory, 0)?,
            version: read_u32(memory, 4)?,
            revision: read_u32(memory, 8)?,
            poll_time: read_i64(memory, 12)?,
            sensor_section_offset: read_u32(memory, 20)?,
            sensor_element_size: read_u32(memory, 24)?,
            sensor_element_count: read_u32(memory, 28)?,
            reading_section_offset: read_u32(memory, 32)?,
            reading_element_size: read_u32(memory, 36)?,
            reading_element_count: read_u32(memory, 40)?,
        })
    }

    /// Validate signature, strides and table bounds.
    pub fn validate(&self) -> Result<()> {
        if self.is_dead() {
            return Err(TelemetryError::connection_failed(
                "Producer has shut down (segment signature is DEAD)",
            ));
        }

        if !self.is_live() {
            return Err(TelemetryError::Signature { found: self.signature });
        }

        if self.sensor_element_count > MAX_ELEMENTS || self.reading_element_count > MAX_ELEMENTS {
            return Err(TelemetryError::layout(
                28,
                format!(
                    "Element counts look corrupted: {} sensors, {} readings",
                    self.sensor_element_count, self.reading_element_count
                ),
            ));
        }

        if self.sensor_element_size > MAX_ELEMENT_SIZE
            || self.reading_element_size > MAX_ELEMENT_SIZE
        {
            return Err(TelemetryError::layout(
                24,
                format!(
                    "Element sizes look corrupted: {} sensor bytes, {} reading bytes",
                    self.sensor_element_size, self.reading_element_size
                ),
            ));
        }

        if self.sensor_element_count > 0
            && (self.sensor_element_size as usize) < SENSOR_ELEMENT_SIZE
        {
            return Err(TelemetryError::layout(
                24,
                format!(
                    "Sensor element size {} is smaller than the {}-byte layout",
                    self.sensor_element_size, SENSOR_ELEMENT_SIZE
                ),
            ));
        }

        if self.reading_element_count > 0
            && (self.reading_element_size as usize) < READING_ELEMENT_SIZE
        {
            return Err(TelemetryError::layout(
                36,
                format!(
                    "Reading element size {} is smaller than the {}-byte layout",
                    self.reading_element_size, READING_ELEMENT_SIZE
                ),
            ));
        }

        // Both table ends must be representable
        self.sensor_table_end()?;
        self.reading_table_end()?;

        Ok(())
    }

    /// True when the producer marks the segment as live.
    pub fn is_live(&self) -> bool {
        self.signature == SIGNATURE_LIVE || self.signature == SIGNATURE_LIVE.swap_bytes()
    }

    /// True when the producer marked the segment as abandoned.
    pub fn is_dead(&self) -> bool {
        self.signature == SIGNATURE_DEAD || self.signature == SIGNATURE_DEAD.swap_bytes()
    }

    /// Byte offset of sensor element `index`.
    pub fn sensor_offset(&self, index: usize) -> Result<usize> {
        element_offset(
            "sensor",
            self.sensor_section_offset,
            self.sensor_element_size,
            self.sensor_element_count,
            index,
        )
    }

    /// Byte offset of reading element `index`:
    /// `reading_section_offset + index * reading_element_size`.
    pub fn reading_offset(&self, index: usize) -> Result<usize> {
        element_offset(
            "reading",
            self.reading_section_offset,
            self.reading_element_size,
            self.reading_element_count,
            index,
        )
    }

    /// End of the sensor table (exclusive).
    pub fn sensor_table_end(&self) -> Result<usize> {
        table_end(self.sensor_section_offset, self.sensor_element_size, self.sensor_element_count)
    }

    /// End of the reading table (exclusive).
    pub fn reading_table_end(&self) -> Result<usize> {
        table_end(
            self.reading_section_offset,
            self.reading_element_size,
            self.reading_element_count,
        )
    }

    /// Minimum segment length that holds the header and both tables.
    pub fn required_len(&self) -> Result<usize> {
        Ok(HEADER_SIZE.max(self.sensor_table_end()?).max(self.reading_table_end()?))
    }

    pub fn sensor_count(&self) -> usize {
        self.sensor_element_count as usize
    }

    pub fn reading_count(&self) -> usize {
        self.reading_element_count as usize
    }

    pub fn reading_stride(&self) -> usize {
        self.reading_element_size as usize
    }

    pub fn sensor_stride(&self) -> usize {
        self.sensor_element_size as usize
    }

    /// Encode the header into its packed representation.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.signature.to_le_bytes());
        out[4..8].copy_from_slice(&self.version.to_le_bytes());
        out[8..12].copy_from_slice(&self.revision.to_le_bytes());
        out[12..20].copy_from_slice(&self.poll_time.to_le_bytes());
        out[20..24].copy_from_slice(&self.sensor_section_offset.to_le_bytes());
        out[24..28].copy_from_slice(&self.sensor_element_size.to_le_bytes());
        out[28..32].copy_from_slice(&self.sensor_element_count.to_le_bytes());
        out[32..36].copy_from_slice(&self.reading_section_offset.to_le_bytes());
        out[36..40].copy_from_slice(&self.reading_element_size.to_le_bytes());
        out[40..44].copy_from_slice(&self.reading_element_count.to_le_bytes());
        out
    }
}

fn element_offset(table: &str, base: u32, stride: u32, count: u32, index: usize) -> Result<usize> {
    if index >= count as usize {
        return Err(TelemetryError::layout(
            base as usize,
            format!("{} index {} out of range (0..{})", table, index, count),
        ));
    }

    index
        .checked_mul(stride as usize)
        .and_then(|relative| relative.checked_add(base as usize))
        .ok_or_else(|| {
            TelemetryError::layout(
                base as usize,
                format!("{} element {} offset overflows", table, index),
            )
        })
}

fn table_end(base: u32, stride: u32, count: u32) -> Result<usize> {
    (count as usize)
        .checked_mul(stride as usize)
        .and_then(|len| len.checked_add(base as usize))
        .ok_or_else(|| TelemetryError::layout(base as usize, "Table size overflows"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn header(readings: u32) -> SharedMemoryHeader {
        SharedMemoryHeader {
            signature: SIGNATURE_LIVE,
            version: 2,
            revision: 1,
            poll_time: 1_700_000_000,
            sensor_section_offset: HEADER_SIZE as u32,
            sensor_element_size: SENSOR_ELEMENT_SIZE as u32,
            sensor_element_count: 2,
            reading_section_offset: (HEADER_SIZE + 2 * SENSOR_ELEMENT_SIZE) as u32,
            reading_element_size: READING_ELEMENT_SIZE as u32,
            reading_element_count: readings,
        }
    }

    prop_compose! {
        fn arb_valid_header()(
            version in 1..4u32,
            revision in any::<u32>(),
            poll_time in any::<i64>(),
            sensor_count in 0..64u32,
            sensor_pad in 0..64u32,
            reading_count in 0..512u32,
            reading_pad in 0..64u32,
            gap in 0..1024u32,
        ) -> SharedMemoryHeader {
            let sensor_size = SENSOR_ELEMENT_SIZE as u32 + sensor_pad;
            let reading_size = READING_ELEMENT_SIZE as u32 + reading_pad;
            let sensor_offset = HEADER_SIZE as u32 + gap;
            SharedMemoryHeader {
                signature: SIGNATURE_LIVE,
                version,
                revision,
                poll_time,
                sensor_section_offset: sensor_offset,
                sensor_element_size: sensor_size,
                sensor_element_count: sensor_count,
                reading_section_offset: sensor_offset + sensor_count * sensor_size,
                reading_element_size: reading_size,
                reading_element_count: reading_count,
            }
        }
    }

    proptest! {
        #[test]
        fn prop_valid_headers_parse_back(header in arb_valid_header()) {
            let parsed = SharedMemoryHeader::parse(&header.to_bytes());
            prop_assert_eq!(parsed.ok(), Some(header));
        }

        #[test]
        fn prop_reading_offsets_follow_stride(header in arb_valid_header()) {
            for index in 0..header.reading_count().min(16) {
                let expected = header.reading_section_offset as usize
                    + index * header.reading_element_size as usize;
                prop_assert_eq!(header.reading_offset(index).ok(), Some(expected));
            }
            prop_assert!(header.reading_offset(header.reading_count()).is_err());
        }

        #[test]
        fn prop_arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..128)) {
            let _ = SharedMemoryHeader::parse(&bytes);
        }

        #[test]
        fn prop_undersized_reading_stride_rejected(stride in 0..READING_ELEMENT_SIZE as u32) {
            let mut header = header(3);
            header.reading_element_size = stride;
            prop_assert!(
                matches!(header.validate(), Err(TelemetryError::Layout { .. })),
                "expected Layout error"
            );
        }
    }

    #[test]
    fn short_buffer_is_layout_error() {
        let result = SharedMemoryHeader::parse(&[0u8; 10]);
        assert!(matches!(result, Err(TelemetryError::Layout { offset: 10, .. })));
    }

    #[test]
    fn dead_signature_is_connection_error() {
        let mut header = header(3);
        header.signature = SIGNATURE_DEAD;
        let result = SharedMemoryHeader::parse(&header.to_bytes());
        assert!(matches!(result, Err(TelemetryError::Connection { .. })));
    }

    #[test]
    fn unknown_signature_is_rejected() {
        let mut header = header(3);
        header.signature = 0x1234_5678;
        let result = SharedMemoryHeader::parse(&header.to_bytes());
        assert!(matches!(result, Err(TelemetryError::Signature { found: 0x1234_5678 })));
    }

    #[test]
    fn byte_swapped_signature_is_accepted() {
        let mut header = header(3);
        header.signature = SIGNATURE_LIVE.swap_bytes();
        assert!(header.validate().is_ok());
    }

    #[test]
    fn empty_tables_allow_zero_strides() {
        let mut header = header(0);
        header.sensor_element_count = 0;
        header.sensor_element_size = 0;
        header.reading_element_size = 0;
        assert!(header.validate().is_ok());
        assert!(header.reading_offset(0).is_err());
    }

    #[test]
    fn required_len_covers_both_tables() {
        let header = header(3);
        assert_eq!(
            header.required_len().unwrap(),
            HEADER_SIZE + 2 * SENSOR_ELEMENT_SIZE + 3 * READING_ELEMENT_SIZE
        );
    }

    #[test]
    fn oversized_strides_are_rejected_even_for_empty_tables() {
        let mut empty = header(0);
        empty.reading_element_size = u32::MAX;
        assert!(matches!(empty.validate(), Err(TelemetryError::Layout { .. })));

        let mut no_sensors = header(3);
        no_sensors.sensor_element_count = 0;
        no_sensors.sensor_element_size = MAX_ELEMENT_SIZE + 1;
        assert!(matches!(no_sensors.validate(), Err(TelemetryError::Layout { .. })));
    }

    #[test]
    fn corrupted_counts_are_rejected() {
        let mut header = header(3);
        header.reading_element_count = u32::MAX;
        assert!(header.validate().is_err());
    }
}
