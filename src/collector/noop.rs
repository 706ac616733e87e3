//! Non-macOS (noop) input collection.
//!
//! Lets the crate build and run on targets without an event tap backend.
//! The collector starts and stops cleanly but never yields events.

use crate::collector::source::{CollectorConfig, CollectorError, InputSource};
use crate::collector::types::SensorEvent;

/// A noop collector that never emits events.
pub struct NoopCollector {
    _config: CollectorConfig,
    running: bool,
}

impl NoopCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            _config: config,
            running: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl InputSource for NoopCollector {
    fn start(&mut self) -> Result<(), CollectorError> {
        if self.running {
            return Err(CollectorError::AlreadyRunning);
        }
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn try_recv(&mut self) -> Result<Option<SensorEvent>, CollectorError> {
        Ok(None)
    }
}

/// There is no Input Monitoring permission gate on these platforms.
pub fn check_permission() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_collector_lifecycle() {
        let mut collector = NoopCollector::new(CollectorConfig::default());
        assert!(!collector.is_running());
        collector.start().unwrap();
        assert!(collector.is_running());
        assert!(collector.try_recv().unwrap().is_none());
        collector.stop();
        assert!(!collector.is_running());
    }
}
