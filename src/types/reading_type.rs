//! Reading type codes published by the producer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a sensor reading.
/// Maps to the producer's `SENSOR_READING_TYPE` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum ReadingType {
    None,
    Temperature,
    Voltage,
    Fan,
    Current,
    Power,
    Clock,
    Usage,
    Other,
}

impl ReadingType {
    pub const ALL: [ReadingType; 9] = [
        ReadingType::None,
        ReadingType::Temperature,
        ReadingType::Voltage,
        ReadingType::Fan,
        ReadingType::Current,
        ReadingType::Power,
        ReadingType::Clock,
        ReadingType::Usage,
        ReadingType::Other,
    ];

    /// Decode a raw type code. Unknown codes yield `None`.
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(ReadingType::None),
            1 => Some(ReadingType::Temperature),
            2 => Some(ReadingType::Voltage),
            3 => Some(ReadingType::Fan),
            4 => Some(ReadingType::Current),
            5 => Some(ReadingType::Power),
            6 => Some(ReadingType::Clock),
            7 => Some(ReadingType::Usage),
            8 => Some(ReadingType::Other),
            _ => None,
        }
    }

    pub const fn code(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for ReadingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReadingType::None => "none",
            ReadingType::Temperature => "temperature",
            ReadingType::Voltage => "voltage",
            ReadingType::Fan => "fan",
            ReadingType::Current => "current",
            ReadingType::Power => "power",
            ReadingType::Clock => "clock",
            ReadingType::Usage => "usage",
            ReadingType::Other => "other",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for kind in ReadingType::ALL {
            assert_eq!(ReadingType::from_code(kind.code()), Some(kind));
        }
    }

    #[test]
    fn unknown_codes_are_rejected() {
        assert_eq!(ReadingType::from_code(9), None);
        assert_eq!(ReadingType::from_code(u32::MAX), None);
    }
}
