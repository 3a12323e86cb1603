//! Test utilities for building synthetic shared-memory segments
//!
//! The producer is an external Windows program, so tests and benchmarks build
//! segments byte-for-byte with [`SegmentBuilder`] instead of relying on a
//! running instance.

#![cfg(any(test, feature = "benchmark"))]

use crate::layout::{
    HEADER_SIZE, READING_ELEMENT_SIZE, SENSOR_ELEMENT_SIZE, SIGNATURE_LIVE, STRING_LEN,
    SharedMemoryHeader, UNIT_STRING_LEN,
};
use crate::segment::MemorySegment;
use crate::types::ReadingType;

/// Offset of the current value within a reading element
pub const READING_VALUE_OFFSET: usize = 12 + 2 * STRING_LEN + UNIT_STRING_LEN;

/// Encode a sensor element in its packed layout.
pub fn encode_sensor(sensor_id: u32, instance: u32, original: &str, user: &str) -> Vec<u8> {
    let mut out = vec![0u8; SENSOR_ELEMENT_SIZE];
    out[0..4].copy_from_slice(&sensor_id.to_le_bytes());
    out[4..8].copy_from_slice(&instance.to_le_bytes());
    put_str(&mut out[8..8 + STRING_LEN], original);
    put_str(&mut out[8 + STRING_LEN..8 + 2 * STRING_LEN], user);
    out
}

/// Encode a reading element in its packed layout. Min, max and average are
/// set to `value`.
pub fn encode_reading(
    kind: ReadingType,
    sensor_index: u32,
    reading_id: u32,
    label: &str,
    user_label: &str,
    unit: &str,
    value: f64,
) -> Vec<u8> {
    let mut out = vec![0u8; READING_ELEMENT_SIZE];
    out[0..4].copy_from_slice(&kind.code().to_le_bytes());
    out[4..8].copy_from_slice(&sensor_index.to_le_bytes());
    out[8..12].copy_from_slice(&reading_id.to_le_bytes());

    let mut cursor = 12;
    put_str(&mut out[cursor..cursor + STRING_LEN], label);
    cursor += STRING_LEN;
    put_str(&mut out[cursor..cursor + STRING_LEN], user_label);
    cursor += STRING_LEN;
    put_str(&mut out[cursor..cursor + UNIT_STRING_LEN], unit);
    cursor += UNIT_STRING_LEN;

    for _ in 0..4 {
        out[cursor..cursor + 8].copy_from_slice(&value.to_le_bytes());
        cursor += 8;
    }
    out
}

fn put_str(dst: &mut [u8], value: &str) {
    // Leave room for the terminating NUL
    let len = value.len().min(dst.len() - 1);
    dst[..len].copy_from_slice(&value.as_bytes()[..len]);
}

struct PendingReading {
    kind: ReadingType,
    sensor_index: u32,
    label: String,
    user_label: String,
    unit: String,
    value: f64,
}

/// Builder for a complete segment: header, sensor table, reading table.
pub struct SegmentBuilder {
    signature: u32,
    poll_time: i64,
    sensor_stride: usize,
    reading_stride: usize,
    sensors: Vec<(String, String)>,
    readings: Vec<PendingReading>,
}

impl Default for SegmentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentBuilder {
    pub fn new() -> Self {
        Self {
            signature: SIGNATURE_LIVE,
            poll_time: 1_700_000_000,
            sensor_stride: SENSOR_ELEMENT_SIZE,
            reading_stride: READING_ELEMENT_SIZE,
            sensors: Vec::new(),
            readings: Vec::new(),
        }
    }

    pub fn signature(mut self, signature: u32) -> Self {
        self.signature = signature;
        self
    }

    pub fn poll_time(mut self, poll_time: i64) -> Self {
        self.poll_time = poll_time;
        self
    }

    pub fn sensor_stride(mut self, stride: usize) -> Self {
        self.sensor_stride = stride;
        self
    }

    pub fn reading_stride(mut self, stride: usize) -> Self {
        self.reading_stride = stride;
        self
    }

    pub fn sensor(mut self, original: &str, user: &str) -> Self {
        self.sensors.push((original.to_string(), user.to_string()));
        self
    }

    pub fn reading(
        mut self,
        kind: ReadingType,
        sensor_index: u32,
        label: &str,
        user_label: &str,
        unit: &str,
        value: f64,
    ) -> Self {
        self.readings.push(PendingReading {
            kind,
            sensor_index,
            label: label.to_string(),
            user_label: user_label.to_string(),
            unit: unit.to_string(),
            value,
        });
        self
    }

    /// Header describing the segment `build` produces.
    pub fn header(&self) -> SharedMemoryHeader {
        let sensor_offset = HEADER_SIZE;
        let reading_offset = sensor_offset + self.sensors.len() * self.sensor_stride;
        SharedMemoryHeader {
            signature: self.signature,
            version: 2,
            revision: 0,
            poll_time: self.poll_time,
            sensor_section_offset: sensor_offset as u32,
            sensor_element_size: self.sensor_stride as u32,
            sensor_element_count: self.sensors.len() as u32,
            reading_section_offset: reading_offset as u32,
            reading_element_size: self.reading_stride as u32,
            reading_element_count: self.readings.len() as u32,
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let header = self.header();
        let total = HEADER_SIZE
            + self.sensors.len() * self.sensor_stride
            + self.readings.len() * self.reading_stride;

        let mut out = vec![0u8; total];
        out[..HEADER_SIZE].copy_from_slice(&header.to_bytes());

        let mut cursor = HEADER_SIZE;
        for (i, (original, user)) in self.sensors.iter().enumerate() {
            let bytes = encode_sensor(0xF000_0000 + i as u32, 0, original, user);
            out[cursor..cursor + bytes.len()].copy_from_slice(&bytes);
            cursor += self.sensor_stride;
        }

        for (i, reading) in self.readings.iter().enumerate() {
            let bytes = encode_reading(
                reading.kind,
                reading.sensor_index,
                i as u32,
                &reading.label,
                &reading.user_label,
                &reading.unit,
                reading.value,
            );
            out[cursor..cursor + bytes.len()].copy_from_slice(&bytes);
            cursor += self.reading_stride;
        }

        out
    }

    /// Build straight into a shared in-memory segment.
    pub fn build_segment(&self) -> MemorySegment {
        MemorySegment::new(self.build())
    }
}

/// Overwrite the current value of reading `index`, as the producer would.
pub fn write_reading_value(segment: &MemorySegment, index: usize, value: f64) {
    let bytes = segment.to_vec();
    let header = SharedMemoryHeader::parse(&bytes).expect("segment header");
    let offset = header.reading_offset(index).expect("reading index") + READING_VALUE_OFFSET;
    segment.write_at(offset, &value.to_le_bytes()).expect("write reading value");
}
