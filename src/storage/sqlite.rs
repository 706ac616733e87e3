//! SQLite observation log.

use super::{check_sequence, Observation, ObservationStore, StorageError};
use crate::observer::update::UpdateKind;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS observations (
    id INTEGER PRIMARY KEY,
    run_id TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    source_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    occurred_at TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    payload TEXT NOT NULL,
    UNIQUE (run_id, sequence)
);

CREATE INDEX IF NOT EXISTS idx_observations_kind ON observations(kind);
CREATE INDEX IF NOT EXISTS idx_observations_occurred ON observations(occurred_at);
";

struct Session {
    conn: Connection,
    in_transaction: bool,
}

/// Observation log in a single SQLite file.
///
/// Appends are batched in a transaction that `flush` commits. Statements run
/// on the blocking pool, so a caller's timeout fires even while SQLite waits
/// on a lock.
pub struct SqliteStore {
    session: Arc<Mutex<Session>>,
    last_sequence: u64,
}

impl SqliteStore {
    /// Open the log. SQLite gives up on a locked database after `busy_timeout`.
    pub fn open(db_path: &Path, busy_timeout: Duration) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            session: Arc::new(Mutex::new(Session {
                conn,
                in_transaction: false,
            })),
            last_sequence: 0,
        })
    }

    async fn execute<F, T>(&self, task: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut Session) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let session = self.session.clone();
        tokio::task::spawn_blocking(move || {
            // A poisoned lock means an earlier statement panicked mid-transaction
            let mut guard = session.lock().map_err(|_| StorageError::Closed)?;
            task(&mut guard)
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e.to_string())))?
    }

    /// Read every committed observation, oldest run first.
    pub fn read_all(db_path: &Path) -> Result<Vec<Observation>, StorageError> {
        let conn = Connection::open(db_path)?;
        let mut stmt = conn.prepare(
            "SELECT run_id, sequence, source_id, kind, occurred_at, recorded_at, payload
             FROM observations ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(run_id, sequence, source_id, kind, occurred_at, recorded_at, payload)| {
                    let kind = UpdateKind::parse(&kind).ok_or_else(|| {
                        StorageError::Serialization(format!("unknown kind {kind}"))
                    })?;
                    Ok(Observation {
                        sequence: sequence as u64,
                        run_id: run_id
                            .parse()
                            .map_err(|e| StorageError::Serialization(format!("run id: {e}")))?,
                        source_id,
                        kind,
                        occurred_at: parse_time(&occurred_at)?,
                        recorded_at: parse_time(&recorded_at)?,
                        payload: serde_json::from_str(&payload)?,
                    })
                },
            )
            .collect()
    }
}

fn parse_time(s: &str) -> Result<chrono::DateTime<chrono::Utc>, StorageError> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&chrono::Utc))
        .map_err(|e| StorageError::Serialization(format!("timestamp {s}: {e}")))
}

#[async_trait]
impl ObservationStore for SqliteStore {
    async fn append(&mut self, observation: &Observation) -> Result<u64, StorageError> {
        check_sequence(self.last_sequence, observation.sequence)?;
        let payload = serde_json::to_string(&observation.payload)?;
        let row = (
            observation.run_id.to_string(),
            observation.sequence as i64,
            observation.source_id.clone(),
            observation.kind.as_str(),
            observation.occurred_at.to_rfc3339(),
            observation.recorded_at.to_rfc3339(),
            payload,
        );

        self.execute(move |session| {
            if !session.in_transaction {
                session.conn.execute_batch("BEGIN")?;
                session.in_transaction = true;
            }
            session.conn.execute(
                "INSERT INTO observations
                 (run_id, sequence, source_id, kind, occurred_at, recorded_at, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![row.0, row.1, row.2, row.3, row.4, row.5, row.6],
            )?;
            Ok(())
        })
        .await?;

        self.last_sequence = observation.sequence;
        Ok(observation.sequence)
    }

    async fn flush(&mut self) -> Result<(), StorageError> {
        self.execute(|session| {
            if session.in_transaction {
                session.conn.execute_batch("COMMIT")?;
                session.in_transaction = false;
            }
            Ok(())
        })
        .await
    }

    fn last_sequence(&self) -> u64 {
        self.last_sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::update::{LifecyclePhase, Update, UpdatePayload};
    use chrono::Utc;
    use uuid::Uuid;

    fn observation(sequence: u64, run_id: Uuid) -> Observation {
        let update = Update::new(
            "screen",
            Utc::now(),
            UpdatePayload::Lifecycle {
                phase: LifecyclePhase::Started,
                reason: None,
                detail: None,
            },
        );
        Observation::from_update(sequence, run_id, update, Utc::now())
    }

    #[tokio::test]
    async fn test_only_flushed_rows_are_visible() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("observations.db");
        let run_id = Uuid::new_v4();

        let mut store = SqliteStore::open(&path, Duration::from_secs(5)).unwrap();
        store.append(&observation(1, run_id)).await.unwrap();
        store.append(&observation(2, run_id)).await.unwrap();
        store.flush().await.unwrap();
        store.append(&observation(3, run_id)).await.unwrap();

        let read = SqliteStore::read_all(&path).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[1].sequence, 2);
        assert_eq!(read[0].run_id, run_id);

        store.flush().await.unwrap();
        assert_eq!(SqliteStore::read_all(&path).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_locked_database_does_not_block_past_caller_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("observations.db");
        let mut store = SqliteStore::open(&path, Duration::from_millis(500)).unwrap();

        let holder = Connection::open(&path).unwrap();
        holder.execute_batch("BEGIN IMMEDIATE").unwrap();

        let started = std::time::Instant::now();
        let result = tokio::time::timeout(
            Duration::from_millis(100),
            store.append(&observation(1, Uuid::new_v4())),
        )
        .await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_millis(400));

        // Once the busy timeout passes the statement itself fails
        let err = store
            .append(&observation(1, Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Database(_)));
        holder.execute_batch("ROLLBACK").unwrap();
    }
}
