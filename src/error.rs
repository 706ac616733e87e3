//! Crate-level error type.

use crate::capture::CaptureError;
use crate::collector::CollectorError;
use crate::config::ConfigError;
use crate::storage::StorageError;

/// Errors surfaced by the aggregator and observers.
#[derive(Debug)]
pub enum RecorderError {
    /// Invalid settings or registration; reported before a run starts
    Configuration(String),
    /// A capture failure that could not be recovered locally
    Capture(CaptureError),
    /// A durable write failed
    Storage(StorageError),
    /// An input source could not be started or was lost
    Collector(CollectorError),
}

impl RecorderError {
    /// Short, stable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            RecorderError::Configuration(_) => "configuration",
            RecorderError::Capture(_) => "capture",
            RecorderError::Storage(_) => "storage",
            RecorderError::Collector(_) => "collector",
        }
    }
}

impl std::fmt::Display for RecorderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecorderError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            RecorderError::Capture(e) => write!(f, "Capture error: {e}"),
            RecorderError::Storage(e) => write!(f, "Storage error: {e}"),
            RecorderError::Collector(e) => write!(f, "Collector error: {e}"),
        }
    }
}

impl std::error::Error for RecorderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RecorderError::Configuration(_) => None,
            RecorderError::Capture(e) => Some(e),
            RecorderError::Storage(e) => Some(e),
            RecorderError::Collector(e) => Some(e),
        }
    }
}

impl From<ConfigError> for RecorderError {
    fn from(e: ConfigError) -> Self {
        RecorderError::Configuration(e.to_string())
    }
}

impl From<CaptureError> for RecorderError {
    fn from(e: CaptureError) -> Self {
        RecorderError::Capture(e)
    }
}

impl From<StorageError> for RecorderError {
    fn from(e: StorageError) -> Self {
        RecorderError::Storage(e)
    }
}

impl From<CollectorError> for RecorderError {
    fn from(e: CollectorError) -> Self {
        RecorderError::Collector(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_becomes_configuration() {
        let err: RecorderError = ConfigError::Invalid("debounce gap".to_string()).into();
        assert_eq!(err.kind(), "configuration");
        assert!(err.to_string().contains("debounce gap"));
    }

    #[test]
    fn test_source_chain() {
        use std::error::Error;
        let err: RecorderError = CaptureError::NoDisplays.into();
        assert_eq!(err.kind(), "capture");
        assert!(err.source().is_some());
    }
}
