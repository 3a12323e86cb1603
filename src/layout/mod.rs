//! Shared-memory binary layout
//!
//! Pure decoding of the producer's shared-memory segment: a fixed header that
//! describes two fixed-stride tables (sensors and readings). Nothing here
//! performs I/O; every function takes a byte slice and validates its length
//! before interpreting a single field.
//!
//! ## Segment Structure
//!
//! 1. **Header** (44 bytes, packed) - signature, version, poll time and the
//!    `(offset, element size, element count)` triple of each table
//! 2. **Sensor table** - `sensor_element_count` elements of
//!    `sensor_element_size` bytes each
//! 3. **Reading table** - `reading_element_count` elements of
//!    `reading_element_size` bytes each
//!
//! All numeric fields are little-endian with no padding. Offsets are relative
//! to the start of the segment. Element strides may exceed the layouts decoded
//! here when a newer producer appends fields; only the known prefix is read.

mod elements;
mod header;

pub use elements::{ReadingElement, SensorElement, decode_reading, decode_sensor};
pub use header::SharedMemoryHeader;

use crate::{Result, TelemetryError};

/// Size of the packed segment header in bytes
pub const HEADER_SIZE: usize = 44;
/// Length of sensor name and reading label buffers
pub const STRING_LEN: usize = 128;
/// Length of the reading unit buffer
pub const UNIT_STRING_LEN: usize = 16;
/// Known size of a sensor element: two u32 ids and two name buffers
pub const SENSOR_ELEMENT_SIZE: usize = 8 + 2 * STRING_LEN;
/// Known size of a reading element: three u32 fields, two labels, unit, four f64
pub const READING_ELEMENT_SIZE: usize = 12 + 2 * STRING_LEN + UNIT_STRING_LEN + 4 * 8;

/// Signature of a segment whose producer is publishing
pub const SIGNATURE_LIVE: u32 = u32::from_le_bytes(*b"HWiS");
/// Signature left behind by a producer that has shut down
pub const SIGNATURE_DEAD: u32 = u32::from_le_bytes(*b"DEAD");

fn field<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N]> {
    data.get(offset..offset.saturating_add(N))
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| {
            TelemetryError::layout(
                offset,
                format!(
                    "Insufficient data for {}-byte field (have {} bytes)",
                    N,
                    data.len().saturating_sub(offset)
                ),
            )
        })
}

pub(crate) fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    field::<4>(data, offset).map(u32::from_le_bytes)
}

pub(crate) fn read_i64(data: &[u8], offset: usize) -> Result<i64> {
    field::<8>(data, offset).map(i64::from_le_bytes)
}

pub(crate) fn read_f64(data: &[u8], offset: usize) -> Result<f64> {
    field::<8>(data, offset).map(f64::from_le_bytes)
}

/// Read a NUL-terminated string from a fixed-length buffer.
///
/// Invalid UTF-8 decodes lossily; only a short buffer is an error.
pub(crate) fn read_fixed_str(data: &[u8], offset: usize, len: usize) -> Result<String> {
    let bytes = data.get(offset..offset.saturating_add(len)).ok_or_else(|| {
        TelemetryError::layout(offset, format!("Insufficient data for {}-byte string", len))
    })?;
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
}
