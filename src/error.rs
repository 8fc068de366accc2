// src/error.rs
//! Unified error handling for hdemg-core
//!
//! Every fallible operation in the crate returns [`EmgResult`]. Errors carry an
//! [`ErrorContext`] naming the component and operation that failed so that a
//! message coming out of a long analysis chain still points at its origin.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Unified error type for the entire crate
#[derive(Debug, Clone, Error)]
pub enum EmgError {
    /// Invalid parameters or unsupported option combinations
    #[error("[CONFIG] Configuration error in {component}: {reason} ({})", .context.operation)]
    Configuration {
        /// Component that rejected the configuration
        component: String,
        /// Human readable reason
        reason: String,
        /// Error origin
        context: ErrorContext,
    },

    /// Numerical failures inside an analysis
    #[error("[PROCESSING] {stage} stage error: {reason} ({})", .context.operation)]
    Processing {
        /// Analysis stage that failed
        stage: ProcessingStage,
        /// Human readable reason
        reason: String,
        /// Error origin
        context: ErrorContext,
    },

    /// Data that violates the emgfile invariants or an operation precondition
    #[error("[DATA] Invalid {data_type}: {reason}{} ({})", expected_actual(.expected, .actual), .context.operation)]
    InvalidData {
        /// Which piece of data is wrong
        data_type: String,
        /// Human readable reason
        reason: String,
        /// Expected value, when known
        expected: Option<String>,
        /// Observed value, when known
        actual: Option<String>,
        /// Error origin
        context: ErrorContext,
    },

    /// Malformed or unsupported file content
    #[error("[FORMAT] {format} error{}: {reason} ({})", version_suffix(.version), .context.operation)]
    Format {
        /// File format (json, csv, gzip)
        format: String,
        /// Schema version found in the file, if any
        version: Option<String>,
        /// Human readable reason
        reason: String,
        /// Error origin
        context: ErrorContext,
    },

    /// Filesystem errors
    #[error("[IO] {} failed{}: {source}", .context.operation, path_suffix(.path))]
    Io {
        /// Path being accessed, when known
        path: Option<PathBuf>,
        /// Underlying error
        #[source]
        source: Arc<std::io::Error>,
        /// Error origin
        context: ErrorContext,
    },
}

fn expected_actual(expected: &Option<String>, actual: &Option<String>) -> String {
    match (expected, actual) {
        (Some(exp), Some(act)) => format!(" (expected: {}, got: {})", exp, act),
        (Some(exp), None) => format!(" (expected: {})", exp),
        _ => String::new(),
    }
}

fn version_suffix(version: &Option<String>) -> String {
    version
        .as_ref()
        .map(|v| format!(" in version {}", v))
        .unwrap_or_default()
}

fn path_suffix(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" on {}", p.display()))
        .unwrap_or_default()
}

/// Analysis stages for error tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// IIR design and zero-phase filtering
    Filtering,
    /// 1D and 2D cross-correlation
    Correlation,
    /// Spike-triggered averaging of MUAPs
    SpikeTriggeredAverage,
    /// Maximum likelihood conduction velocity
    ConductionVelocity,
    /// Support vector regression of discharge rates
    Regression,
    /// Matching motor units across files
    Tracking,
    /// Descriptive statistics on firings and force
    Statistics,
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessingStage::Filtering => "Filtering",
            ProcessingStage::Correlation => "Correlation",
            ProcessingStage::SpikeTriggeredAverage => "STA",
            ProcessingStage::ConductionVelocity => "ConductionVelocity",
            ProcessingStage::Regression => "Regression",
            ProcessingStage::Tracking => "Tracking",
            ProcessingStage::Statistics => "Statistics",
        };
        write!(f, "{}", name)
    }
}

/// Error context for debugging
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorContext {
    /// Module that raised the error
    pub component: String,
    /// Operation being performed
    pub operation: String,
    /// Source file, filled for errors converted from dependencies
    pub file: Option<&'static str>,
    /// Source line
    pub line: Option<u32>,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            component: component.to_string(),
            operation: operation.to_string(),
            file: None,
            line: None,
        }
    }

    /// Create error context with file and line information
    pub fn with_location(component: &str, operation: &str, file: &'static str, line: u32) -> Self {
        let mut context = Self::new(component, operation);
        context.file = Some(file);
        context.line = Some(line);
        context
    }
}

/// Error context with file and line info
macro_rules! error_context {
    ($component:expr, $operation:expr) => {
        ErrorContext::with_location($component, $operation, file!(), line!())
    };
}

impl EmgError {
    /// Context attached to the error
    pub fn context(&self) -> &ErrorContext {
        match self {
            EmgError::Configuration { context, .. }
            | EmgError::Processing { context, .. }
            | EmgError::InvalidData { context, .. }
            | EmgError::Format { context, .. }
            | EmgError::Io { context, .. } => context,
        }
    }

    /// Wrap an IO error together with the path that produced it
    pub fn io(err: std::io::Error, path: impl Into<PathBuf>, operation: &str) -> Self {
        EmgError::Io {
            path: Some(path.into()),
            source: Arc::new(err),
            context: ErrorContext::new("io", operation),
        }
    }
}

impl From<std::io::Error> for EmgError {
    fn from(err: std::io::Error) -> Self {
        EmgError::Io {
            path: None,
            source: Arc::new(err),
            context: error_context!("io", "file_operation"),
        }
    }
}

impl From<serde_json::Error> for EmgError {
    fn from(err: serde_json::Error) -> Self {
        EmgError::Format {
            format: "json".to_string(),
            version: None,
            reason: err.to_string(),
            context: error_context!("io::json", "decode"),
        }
    }
}

impl From<csv::Error> for EmgError {
    fn from(err: csv::Error) -> Self {
        EmgError::Format {
            format: "csv".to_string(),
            version: None,
            reason: err.to_string(),
            context: error_context!("io::csv", "parse"),
        }
    }
}

/// Result type alias for hdemg operations
pub type EmgResult<T> = Result<T, EmgError>;

/// Error builder for convenient error construction
pub struct EmgErrorBuilder {
    component: String,
    operation: String,
}

impl EmgErrorBuilder {
    /// Start building an error raised by `component` while running `operation`
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            component: component.to_string(),
            operation: operation.to_string(),
        }
    }

    fn context(&self) -> ErrorContext {
        ErrorContext::new(&self.component, &self.operation)
    }

    /// Configuration error
    pub fn configuration(self, reason: &str) -> EmgError {
        let context = self.context();
        EmgError::Configuration {
            component: self.component,
            reason: reason.to_string(),
            context,
        }
    }

    /// Processing error at the given stage
    pub fn processing(self, stage: ProcessingStage, reason: &str) -> EmgError {
        EmgError::Processing {
            stage,
            reason: reason.to_string(),
            context: self.context(),
        }
    }

    /// Invalid data error
    pub fn invalid_data(self, data_type: &str, reason: &str) -> EmgError {
        EmgError::InvalidData {
            data_type: data_type.to_string(),
            reason: reason.to_string(),
            expected: None,
            actual: None,
            context: self.context(),
        }
    }

    /// Invalid data error with the expected and observed values
    pub fn mismatch(
        self,
        data_type: &str,
        reason: &str,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> EmgError {
        EmgError::InvalidData {
            data_type: data_type.to_string(),
            reason: reason.to_string(),
            expected: Some(expected.to_string()),
            actual: Some(actual.to_string()),
            context: self.context(),
        }
    }

    /// File format error
    pub fn format(self, format: &str, version: Option<&str>, reason: &str) -> EmgError {
        EmgError::Format {
            format: format.to_string(),
            version: version.map(str::to_string),
            reason: reason.to_string(),
            context: self.context(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context_creation() {
        let context = ErrorContext::new("muap", "sta");
        assert_eq!(context.component, "muap");
        assert_eq!(context.operation, "sta");
        assert_eq!(context.file, None);
    }

    #[test]
    fn test_converted_errors_carry_location() {
        let err: EmgError = serde_json::from_str::<f64>("not json").unwrap_err().into();
        assert!(matches!(err, EmgError::Format { .. }));
        assert_eq!(err.context().file, Some(file!()));
        assert!(err.context().line.is_some());
    }

    #[test]
    fn test_error_builder() {
        let err = EmgErrorBuilder::new("tools", "filter_rawemg").configuration("highcut above Nyquist");

        match err {
            EmgError::Configuration { component, reason, .. } => {
                assert_eq!(component, "tools");
                assert_eq!(reason, "highcut above Nyquist");
            }
            _ => panic!("Expected configuration error"),
        }
    }

    #[test]
    fn test_error_display() {
        let err = EmgErrorBuilder::new("emgfile", "validate").mismatch(
            "MUPULSES",
            "length differs from NUMBER_OF_MUS",
            4,
            3,
        );

        let display = err.to_string();
        assert!(display.contains("MUPULSES"));
        assert!(display.contains("expected: 4"));
        assert!(display.contains("got: 3"));
        assert!(display.contains("validate"));
    }

    #[test]
    fn test_format_error_mentions_version() {
        let err = EmgErrorBuilder::new("io::json", "emg_from_json").format(
            "json",
            Some("0.1.0-beta.2"),
            "legacy layout",
        );
        assert!(err.to_string().contains("0.1.0-beta.2"));
    }

    #[test]
    fn test_io_conversion_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = EmgError::io(io, "/tmp/none.json", "open");

        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("/tmp/none.json"));
        assert_eq!(err.context().component, "io");
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EmgError>();
    }
}
