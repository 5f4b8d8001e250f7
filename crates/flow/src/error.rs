//! Error types for the dataflow engine
//!
//! Faults are surfaced two ways: synchronously from `open`/`close` and from
//! operator constructors, or asynchronously on the pipeline's shared error
//! channel when a running operator task fails.

use std::time::Duration;
use thiserror::Error;

/// Main engine error type
#[derive(Error, Debug)]
pub enum FlowError {
    /// Window-related errors
    #[error("window error: {0}")]
    Window(#[from] WindowError),

    /// Configuration errors
    #[error("configuration error: {source}")]
    Configuration {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A user-supplied filter/map function panicked or returned an error
    #[error("user function failed in operator '{operator}': {reason}")]
    UserFunction { operator: String, reason: String },

    /// Sink setup or teardown failed
    #[error("sink '{operator}' failed: {source}")]
    Sink {
        operator: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Pipeline used out of order (e.g. opened twice)
    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    /// Generic error for unexpected conditions
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

/// Window assignment errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// Window size is zero, below one millisecond, or too large for `i64` milliseconds
    #[error("invalid window size: {size:?}, must be between 1ms and i64::MAX ms")]
    InvalidWindowSize { size: Duration },

    /// Only tumbling windows (advance == size) are supported
    #[error("unsupported window advance: {advance_ms}ms, must equal window size {size_ms}ms")]
    UnsupportedAdvance { size_ms: i64, advance_ms: i64 },

    /// A record reached a windowing stage without an event timestamp
    #[error("record without timestamp reached window operator '{operator}'")]
    MissingTimestamp { operator: String },

    /// The window containing a timestamp has bounds outside the `i64` range
    #[error("timestamp {timestamp} has no {size_ms}ms window within the i64 range")]
    TimestampOutOfRange { timestamp: i64, size_ms: i64 },
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, FlowError>;

/// Result type alias for window operations
pub type WindowResult<T> = std::result::Result<T, WindowError>;

impl FlowError {
    /// Shorthand for a configuration error with a plain message
    pub fn config(msg: impl Into<String>) -> Self {
        let msg: String = msg.into();
        FlowError::Configuration { source: msg.into() }
    }
}

impl From<figment::Error> for FlowError {
    fn from(err: figment::Error) -> Self {
        FlowError::Configuration {
            source: Box::new(err),
        }
    }
}

impl From<anyhow::Error> for FlowError {
    fn from(err: anyhow::Error) -> Self {
        FlowError::Unexpected(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_error_display() {
        let err = WindowError::InvalidWindowSize {
            size: Duration::ZERO,
        };
        assert!(err.to_string().contains("invalid window size"));

        let err = WindowError::TimestampOutOfRange {
            timestamp: i64::MAX - 1,
            size_ms: 15_000,
        };
        assert!(err.to_string().contains("no 15000ms window"));

        let err = WindowError::UnsupportedAdvance {
            size_ms: 15_000,
            advance_ms: 5_000,
        };
        assert!(err.to_string().contains("must equal window size 15000ms"));
    }

    #[test]
    fn test_flow_error_from_window_error() {
        let window_err = WindowError::MissingTimestamp {
            operator: "window".to_string(),
        };
        let flow_err: FlowError = window_err.into();
        assert!(matches!(flow_err, FlowError::Window(_)));
        assert!(flow_err.to_string().contains("without timestamp"));
    }

    #[test]
    fn test_user_function_error_display() {
        let err = FlowError::UserFunction {
            operator: "map".to_string(),
            reason: "boom".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "user function failed in operator 'map': boom"
        );
    }

    #[test]
    fn test_config_shorthand() {
        let err = FlowError::config("n must be greater than 0");
        assert!(matches!(err, FlowError::Configuration { .. }));
        assert!(err.to_string().contains("n must be greater than 0"));
    }

    #[test]
    fn test_from_anyhow() {
        let err: FlowError = anyhow::anyhow!("something odd").into();
        assert!(matches!(err, FlowError::Unexpected(_)));
    }
}
