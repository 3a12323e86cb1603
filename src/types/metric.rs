//! Backend-independent metric keys
//!
//! A logical metric names a quantity consumers care about (`cpu_power`)
//! without committing to how a backend spells it. The shared-memory backend
//! looks it up through reading labels, the log backend through CSV header
//! spellings, which the producer localizes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical metrics understood by both backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum LogicalMetric {
    CpuUsage,
    CpuPower,
    GpuUsage,
    GpuPower,
}

impl LogicalMetric {
    pub const ALL: [LogicalMetric; 4] = [
        LogicalMetric::CpuUsage,
        LogicalMetric::CpuPower,
        LogicalMetric::GpuUsage,
        LogicalMetric::GpuPower,
    ];

    /// Snapshot key used for this metric.
    pub const fn key(self) -> &'static str {
        match self {
            LogicalMetric::CpuUsage => "cpu_usage",
            LogicalMetric::CpuPower => "cpu_power",
            LogicalMetric::GpuUsage => "gpu_usage",
            LogicalMetric::GpuPower => "gpu_power",
        }
    }

    /// Parse a snapshot key (case-insensitive).
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|metric| metric.key().eq_ignore_ascii_case(key))
    }

    /// Reading labels (normalized) that carry this metric in shared memory,
    /// in preference order.
    pub const fn reading_labels(self) -> &'static [&'static str] {
        match self {
            LogicalMetric::CpuUsage => &["total cpu utility", "total cpu usage"],
            LogicalMetric::CpuPower => &["cpu package power"],
            LogicalMetric::GpuUsage => &["gpu d3d usage"],
            LogicalMetric::GpuPower => &["gt cores power", "gpu power"],
        }
    }

    /// CSV header spellings (unquoted) the producer emits for this metric.
    pub const fn header_spellings(self) -> &'static [&'static str] {
        match self {
            LogicalMetric::CpuUsage => &[
                "Total CPU Utility [%]",
                "Total CPU Usage [%]",
                "CPU 总使用率 [%]",
            ],
            LogicalMetric::CpuPower => &["CPU Package Power [W]", "CPU 封装功率 [W]"],
            LogicalMetric::GpuUsage => &["GPU D3D Usage [%]", "GPU D3D 使用率 [%]"],
            LogicalMetric::GpuPower => &["GT Cores Power [W]", "GT 核心功率 [W]", "GPU Power [W]"],
        }
    }
}

impl fmt::Display for LogicalMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
