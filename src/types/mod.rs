//! Core types shared by both telemetry backends.
//!
//! - [`Label`] is a case-normalized metric name
//! - [`LabelIndex`] maps labels to a stable location with an explicit
//!   [`CollisionPolicy`]
//! - [`LogicalMetric`] names backend-independent metrics (`cpu_power`)
//! - [`ReadingType`] decodes the producer's reading type codes
//! - [`TelemetrySnapshot`] and [`Sample`] are what a sample call returns
//!
//! ## Usage Example
//!
//! ```rust
//! use sensortap::types::{CollisionPolicy, Label, LabelIndex};
//!
//! let mut index = LabelIndex::new(CollisionPolicy::LastWins);
//! index.insert(Label::new("CPU Package Power"), 3);
//!
//! assert_eq!(index.get(Label::new("cpu package power").as_str()), Some(3));
//! ```

mod label;
mod metric;
mod reading_type;
mod snapshot;

pub use label::{CollisionPolicy, Label, LabelIndex};
pub use metric::LogicalMetric;
pub use reading_type::ReadingType;
pub use snapshot::{Sample, TelemetrySnapshot};
