//! In-memory observation log.

use super::{check_sequence, Observation, ObservationStore, StorageError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Inner {
    observations: Vec<Observation>,
    /// Observations covered by the last flush
    flushed: usize,
    flush_count: u64,
}

/// A store kept in memory. Clones share the same log, so a handle kept
/// outside the aggregator can inspect what was written.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Everything appended so far.
    pub fn observations(&self) -> Vec<Observation> {
        self.lock().observations.clone()
    }

    /// Observations made durable by a flush.
    pub fn flushed(&self) -> Vec<Observation> {
        let inner = self.lock();
        inner.observations[..inner.flushed].to_vec()
    }

    pub fn flush_count(&self) -> u64 {
        self.lock().flush_count
    }
}

#[async_trait]
impl ObservationStore for MemoryStore {
    async fn append(&mut self, observation: &Observation) -> Result<u64, StorageError> {
        let mut inner = self.lock();
        let last = inner.observations.last().map(|o| o.sequence).unwrap_or(0);
        check_sequence(last, observation.sequence)?;
        inner.observations.push(observation.clone());
        Ok(observation.sequence)
    }

    async fn flush(&mut self) -> Result<(), StorageError> {
        let mut inner = self.lock();
        inner.flushed = inner.observations.len();
        inner.flush_count += 1;
        Ok(())
    }

    fn last_sequence(&self) -> u64 {
        self.lock().observations.last().map(|o| o.sequence).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::update::{LifecyclePhase, Update, UpdatePayload};
    use chrono::Utc;
    use uuid::Uuid;

    fn observation(sequence: u64) -> Observation {
        let update = Update::new(
            "screen",
            Utc::now(),
            UpdatePayload::Lifecycle {
                phase: LifecyclePhase::Started,
                reason: None,
                detail: None,
            },
        );
        Observation::from_update(sequence, Uuid::nil(), update, Utc::now())
    }

    #[tokio::test]
    async fn test_clones_share_log() {
        let handle = MemoryStore::new();
        let mut store = handle.clone();

        store.append(&observation(1)).await.unwrap();
        store.append(&observation(2)).await.unwrap();
        assert_eq!(handle.observations().len(), 2);
        assert!(handle.flushed().is_empty());

        store.flush().await.unwrap();
        assert_eq!(handle.flushed().len(), 2);
        assert_eq!(handle.flush_count(), 1);
        assert_eq!(handle.last_sequence(), 2);
    }

    #[tokio::test]
    async fn test_rejects_out_of_order() {
        let mut store = MemoryStore::new();
        assert!(store.append(&observation(2)).await.is_err());
        assert!(store.observations().is_empty());
    }
}
