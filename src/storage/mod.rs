//! Durable observation log.
//!
//! The aggregator is the only writer. Every persisted [`Observation`] carries
//! a per-run sequence number that starts at 1 and never skips; stores reject
//! anything else.

pub mod jsonl;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use crate::observer::update::{Update, UpdateKind, UpdatePayload};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

pub use jsonl::JsonlStore;
pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// A persisted update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub sequence: u64,
    pub run_id: Uuid,
    pub source_id: String,
    pub kind: UpdateKind,
    pub occurred_at: DateTime<Utc>,
    /// When the aggregator handed the update to the store
    pub recorded_at: DateTime<Utc>,
    pub payload: UpdatePayload,
}

impl Observation {
    pub fn from_update(
        sequence: u64,
        run_id: Uuid,
        update: Update,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sequence,
            run_id,
            source_id: update.source_id,
            kind: update.kind,
            occurred_at: update.occurred_at,
            recorded_at,
            payload: update.payload,
        }
    }
}

/// Append-only storage for one run's observations.
#[async_trait]
pub trait ObservationStore: Send {
    /// Persist one observation and return its sequence.
    ///
    /// The sequence must be exactly one past the last one appended.
    async fn append(&mut self, observation: &Observation) -> Result<u64, StorageError>;

    /// Make everything appended so far durable.
    async fn flush(&mut self) -> Result<(), StorageError>;

    /// Sequence of the last appended observation, 0 if none.
    fn last_sequence(&self) -> u64;
}

/// Check that `got` directly follows `last`.
pub(crate) fn check_sequence(last: u64, got: u64) -> Result<(), StorageError> {
    let expected = last + 1;
    if got != expected {
        return Err(StorageError::SequenceMismatch { expected, got });
    }
    Ok(())
}

/// Errors from the observation log.
#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Serialization(String),
    /// A single write or flush took longer than allowed
    Timeout(Duration),
    SequenceMismatch {
        expected: u64,
        got: u64,
    },
    /// The store was already closed after an earlier failure
    Closed,
    #[cfg(feature = "sqlite")]
    Database(rusqlite::Error),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "IO error: {e}"),
            StorageError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            StorageError::Timeout(after) => {
                write!(f, "Write did not complete within {}ms", after.as_millis())
            }
            StorageError::SequenceMismatch { expected, got } => {
                write!(f, "Expected sequence {expected}, got {got}")
            }
            StorageError::Closed => write!(f, "Observation store is closed"),
            #[cfg(feature = "sqlite")]
            StorageError::Database(e) => write!(f, "Database error: {e}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(e) => Some(e),
            #[cfg(feature = "sqlite")]
            StorageError::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Database(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::update::LifecyclePhase;

    #[test]
    fn test_observation_keeps_update_fields() {
        let now = Utc::now();
        let update = Update::new(
            "screen",
            now,
            UpdatePayload::Lifecycle {
                phase: LifecyclePhase::Started,
                reason: None,
                detail: None,
            },
        );
        let run_id = Uuid::new_v4();
        let obs = Observation::from_update(7, run_id, update, now);
        assert_eq!(obs.sequence, 7);
        assert_eq!(obs.run_id, run_id);
        assert_eq!(obs.source_id, "screen");
        assert_eq!(obs.kind, UpdateKind::Lifecycle);
        assert_eq!(obs.occurred_at, now);
    }

    #[test]
    fn test_sequence_check() {
        assert!(check_sequence(0, 1).is_ok());
        assert!(check_sequence(4, 5).is_ok());
        match check_sequence(4, 6) {
            Err(StorageError::SequenceMismatch { expected, got }) => {
                assert_eq!(expected, 5);
                assert_eq!(got, 6);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
