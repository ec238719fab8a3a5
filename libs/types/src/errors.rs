//! Error types for tick validation and granularity configuration
//!
//! Storage and ingest errors live with the engine; this module only holds
//! the failures that can be detected from the records themselves.

use thiserror::Error;

/// A tick failed validation and must not reach any store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TickError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid instrument code: {0:?}")]
    InvalidCode(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),

    #[error("Malformed formatted timestamp: {0:?}")]
    MalformedTime(String),

    #[error("Formatted timestamp {time:?} does not match epoch {timestamp}")]
    TimeMismatch { time: String, timestamp: i64 },

    #[error("Negative {field}: {value}")]
    Negative { field: &'static str, value: String },
}

/// A configured granularity value is not one of the supported periods.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsupported granularity: {value:?}")]
pub struct GranularityError {
    pub value: String,
}

impl GranularityError {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_error_display() {
        let err = TickError::MissingField("code");
        assert_eq!(err.to_string(), "Missing field: code");
    }

    #[test]
    fn test_time_mismatch_display() {
        let err = TickError::TimeMismatch {
            time: "2023-11-14 22:13:20".to_string(),
            timestamp: 1,
        };
        assert!(err.to_string().contains("2023-11-14 22:13:20"));
        assert!(err.to_string().contains("epoch 1"));
    }

    #[test]
    fn test_granularity_error_display() {
        let err = GranularityError::new("3");
        assert_eq!(err.to_string(), "Unsupported granularity: \"3\"");
    }
}
