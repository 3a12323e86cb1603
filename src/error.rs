//! Error types for telemetry acquisition.
//!
//! All errors implement the `std::error::Error` trait and carry enough context
//! to decide whether a poll loop should back off and retry or give up.
//!
//! ## Error Categories
//!
//! - **Connection Errors**: segment or log file absent, producer shut down
//! - **File Errors**: I/O failures with the path that caused them
//! - **Layout Errors**: malformed or undersized binary elements
//! - **Resolution Errors**: requested labels with no match in the index
//! - **Closed Errors**: operations on a source that was already closed
//! - **Config Errors**: configuration that cannot be parsed or is inconsistent
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use sensortap::TelemetryError;
//!
//! let error = TelemetryError::connection_failed("HWiNFO not running");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

#[cfg(windows)]
use windows_core as core;

/// Result type alias for telemetry operations.
pub type Result<T, E = TelemetryError> = std::result::Result<T, E>;

/// Main error type for telemetry operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TelemetryError {
    #[error("Failed to connect to telemetry producer: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Telemetry file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed layout at offset {offset:#x}: {details}")]
    Layout { offset: usize, details: String },

    #[error("Unknown producer signature {found:#010x}")]
    Signature { found: u32 },

    #[error("Unresolved labels: {}", unresolved.join(", "))]
    Resolution { unresolved: Vec<String> },

    #[error("Cannot {operation} on a closed telemetry source")]
    Closed { operation: &'static str },

    #[error("Configuration error: {details}")]
    Config { details: String },

    #[error("{feature} is only available on {required_platform}")]
    UnsupportedPlatform { feature: String, required_platform: String },

    #[error("Windows API error: {operation}")]
    #[cfg(windows)]
    WindowsApi {
        operation: String,
        #[source]
        source: core::Error,
    },
}

impl TelemetryError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            TelemetryError::Connection { .. } => true,
            TelemetryError::File { .. } => true,
            TelemetryError::Layout { .. } => true,
            TelemetryError::Signature { .. } => false,
            TelemetryError::Resolution { .. } => false,
            TelemetryError::Closed { .. } => false,
            TelemetryError::Config { .. } => false,
            TelemetryError::UnsupportedPlatform { .. } => false,
            #[cfg(windows)]
            TelemetryError::WindowsApi { .. } => true,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            TelemetryError::Connection { .. } => vec![
                "Ensure HWiNFO is running in sensors-only mode",
                "Enable shared memory support in the HWiNFO settings",
                "Run the consumer with the same privileges as HWiNFO",
                "Check that CSV logging is enabled when using the log backend",
            ],
            TelemetryError::File { .. } => vec![
                "Check the log file exists and is readable",
                "Verify the configured log directory and suffix",
                "Check file permissions",
            ],
            TelemetryError::Layout { .. } => vec![
                "Reopen the source in case the producer restarted",
                "Verify the producer version writes the expected layout",
            ],
            TelemetryError::Signature { .. } => vec![
                "Verify the segment name points at a HWiNFO sensor segment",
                "Update the library if the producer changed its signature",
            ],
            TelemetryError::Resolution { .. } => vec![
                "Check label spelling against the producer's sensor list",
                "Use a logical metric key such as cpu_power",
                "Rename the reading in HWiNFO to match the requested label",
            ],
            TelemetryError::Closed { .. } => vec![
                "Call open() before sampling",
                "Create a new source after close()",
            ],
            TelemetryError::Config { .. } => vec![
                "Check the YAML syntax of the configuration file",
                "Verify every required backend setting is present",
            ],
            TelemetryError::UnsupportedPlatform { .. } => vec![
                "Use the log tail backend on this platform",
                "Replay a segment dump for offline analysis",
            ],
            #[cfg(windows)]
            TelemetryError::WindowsApi { .. } => vec![
                "Check Windows API permissions",
                "Verify HWiNFO shared memory is enabled",
            ],
        }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        TelemetryError::File { path, source }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        TelemetryError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        TelemetryError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for layout errors.
    pub fn layout(offset: usize, details: impl Into<String>) -> Self {
        TelemetryError::Layout { offset, details: details.into() }
    }

    /// Helper constructor for closed-source errors.
    pub fn closed(operation: &'static str) -> Self {
        TelemetryError::Closed { operation }
    }

    /// Helper constructor for configuration errors.
    pub fn config(details: impl Into<String>) -> Self {
        TelemetryError::Config { details: details.into() }
    }

    /// Helper constructor for Windows API errors.
    #[cfg(windows)]
    pub fn windows_api_error(operation: impl Into<String>, source: core::Error) -> Self {
        TelemetryError::WindowsApi { operation: operation.into(), source }
    }

    /// Helper constructor for unsupported platform errors.
    pub fn unsupported_platform(
        feature: impl Into<String>,
        required_platform: impl Into<String>,
    ) -> Self {
        TelemetryError::UnsupportedPlatform {
            feature: feature.into(),
            required_platform: required_platform.into(),
        }
    }
}

impl From<std::io::Error> for TelemetryError {
    fn from(err: std::io::Error) -> Self {
        TelemetryError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

#[cfg(windows)]
impl From<core::Error> for TelemetryError {
    fn from(err: core::Error) -> Self {
        TelemetryError::WindowsApi {
            operation: "Unknown Windows operation".to_string(),
            source: err,
        }
    }
}
