//! Per-run context threaded through observer construction.

use crate::capture::SelectionScope;
use crate::config::{Config, ConfigError};
use crate::core::clock::{SharedClock, SystemClock};
use std::sync::Arc;
use uuid::Uuid;

/// Read-only state shared by everything taking part in one recording run.
///
/// Established before the run starts and never mutated afterwards.
#[derive(Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub config: Arc<Config>,
    pub selection_scope: Arc<SelectionScope>,
    pub clock: SharedClock,
    /// Machine the run was recorded on
    pub host: String,
}

impl RunContext {
    /// Build a context after validating the configuration.
    pub fn new(config: Config, selection_scope: SelectionScope) -> Result<Self, ConfigError> {
        Self::with_clock(config, selection_scope, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: Config,
        selection_scope: SelectionScope,
        clock: SharedClock,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Ok(Self {
            run_id: Uuid::new_v4(),
            config: Arc::new(config),
            selection_scope: Arc::new(selection_scope),
            clock,
            host,
        })
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("selection_scope", &self.selection_scope)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_context_rejects_invalid_config() {
        let config = Config {
            debounce_gap: Duration::ZERO,
            ..Config::default()
        };
        assert!(RunContext::new(config, SelectionScope::AllScreens).is_err());
    }

    #[test]
    fn test_each_context_gets_a_run_id() {
        let a = RunContext::new(Config::default(), SelectionScope::AllScreens).unwrap();
        let b = RunContext::new(Config::default(), SelectionScope::AllScreens).unwrap();
        assert_ne!(a.run_id, b.run_id);
        assert!(!a.host.is_empty());
    }
}
