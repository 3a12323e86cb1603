//! Sensor and reading element decoding

use super::{
    READING_ELEMENT_SIZE, SENSOR_ELEMENT_SIZE, STRING_LEN, SharedMemoryHeader, UNIT_STRING_LEN,
    read_f64, read_fixed_str, read_u32,
};
use crate::types::ReadingType;
use crate::{Result, TelemetryError};

// Field offsets within a sensor element
const SENSOR_ID: usize = 0;
const SENSOR_INSTANCE: usize = 4;
const SENSOR_NAME_ORIGINAL: usize = 8;
const SENSOR_NAME_USER: usize = SENSOR_NAME_ORIGINAL + STRING_LEN;

// Field offsets within a reading element
const READING_TYPE: usize = 0;
const READING_SENSOR_INDEX: usize = 4;
const READING_ID: usize = 8;
const READING_LABEL_ORIGINAL: usize = 12;
const READING_LABEL_USER: usize = READING_LABEL_ORIGINAL + STRING_LEN;
const READING_UNIT: usize = READING_LABEL_USER + STRING_LEN;
const READING_VALUE: usize = READING_UNIT + UNIT_STRING_LEN;
const READING_MIN: usize = READING_VALUE + 8;
const READING_MAX: usize = READING_MIN + 8;
const READING_AVG: usize = READING_MAX + 8;

/// A physical or logical device that owns readings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorElement {
    pub sensor_id: u32,
    pub instance: u32,
    pub name_original: String,
    /// User-assigned name, empty when not renamed
    pub name_user: String,
}

impl SensorElement {
    /// Decode one sensor element from a buffer of at least
    /// [`SENSOR_ELEMENT_SIZE`] bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        ensure_len(bytes, SENSOR_ELEMENT_SIZE, "sensor")?;
        Ok(Self {
            sensor_id: read_u32(bytes, SENSOR_ID)?,
            instance: read_u32(bytes, SENSOR_INSTANCE)?,
            name_original: read_fixed_str(bytes, SENSOR_NAME_ORIGINAL, STRING_LEN)?,
            name_user: read_fixed_str(bytes, SENSOR_NAME_USER, STRING_LEN)?,
        })
    }

    /// The user name when set, otherwise the original name.
    pub fn display_name(&self) -> &str {
        if self.name_user.is_empty() { &self.name_original } else { &self.name_user }
    }
}

/// One sampled telemetry value with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingElement {
    pub reading_type: ReadingType,
    /// Index into the sensor table
    pub sensor_index: u32,
    pub reading_id: u32,
    pub label_original: String,
    /// User-assigned label, empty when not renamed
    pub label_user: String,
    pub unit: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

impl ReadingElement {
    /// Decode one reading element from a buffer of at least
    /// [`READING_ELEMENT_SIZE`] bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        ensure_len(bytes, READING_ELEMENT_SIZE, "reading")?;

        let code = read_u32(bytes, READING_TYPE)?;
        let reading_type = ReadingType::from_code(code).ok_or_else(|| {
            TelemetryError::layout(READING_TYPE, format!("Unknown reading type code {}", code))
        })?;

        Ok(Self {
            reading_type,
            sensor_index: read_u32(bytes, READING_SENSOR_INDEX)?,
            reading_id: read_u32(bytes, READING_ID)?,
            label_original: read_fixed_str(bytes, READING_LABEL_ORIGINAL, STRING_LEN)?,
            label_user: read_fixed_str(bytes, READING_LABEL_USER, STRING_LEN)?,
            unit: read_fixed_str(bytes, READING_UNIT, UNIT_STRING_LEN)?,
            value: read_f64(bytes, READING_VALUE)?,
            min: read_f64(bytes, READING_MIN)?,
            max: read_f64(bytes, READING_MAX)?,
            avg: read_f64(bytes, READING_AVG)?,
        })
    }

    /// The user label when set, otherwise the original label.
    pub fn display_label(&self) -> &str {
        if self.label_user.is_empty() { &self.label_original } else { &self.label_user }
    }
}

/// Decode sensor element `index` from a buffer spanning the whole segment.
pub fn decode_sensor(
    segment: &[u8],
    header: &SharedMemoryHeader,
    index: usize,
) -> Result<SensorElement> {
    let offset = header.sensor_offset(index)?;
    let bytes = element_slice(segment, offset, header.sensor_stride())?;
    SensorElement::decode(bytes).map_err(|e| rebase(e, offset))
}

/// Decode reading element `index` from a buffer spanning the whole segment.
pub fn decode_reading(
    segment: &[u8],
    header: &SharedMemoryHeader,
    index: usize,
) -> Result<ReadingElement> {
    let offset = header.reading_offset(index)?;
    let bytes = element_slice(segment, offset, header.reading_stride())?;
    ReadingElement::decode(bytes).map_err(|e| rebase(e, offset))
}

fn ensure_len(bytes: &[u8], required: usize, element: &str) -> Result<()> {
    if bytes.len() < required {
        return Err(TelemetryError::layout(
            0,
            format!("{} element needs {} bytes, have {}", element, required, bytes.len()),
        ));
    }
    Ok(())
}

fn element_slice(segment: &[u8], offset: usize, stride: usize) -> Result<&[u8]> {
    offset.checked_add(stride).and_then(|end| segment.get(offset..end)).ok_or_else(|| {
        TelemetryError::layout(
            offset,
            format!("Element of {} bytes extends past segment of {} bytes", stride, segment.len()),
        )
    })
}

/// Turn an element-relative layout error into a segment-relative one.
fn rebase(error: TelemetryError, base: usize) -> TelemetryError {
    match error {
        TelemetryError::Layout { offset, details } => {
            TelemetryError::Layout { offset: base.saturating_add(offset), details }
        }
        other => other,
    }
}
