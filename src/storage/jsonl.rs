//! JSON Lines observation log.

use super::{check_sequence, Observation, ObservationStore, StorageError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

/// Append-only file with one JSON observation per line.
///
/// Earlier runs in the same file are left untouched; sequences restart at 1
/// for every run and are unique per `run_id`.
pub struct JsonlStore {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    last_sequence: u64,
}

impl JsonlStore {
    /// Open (or create) the log for appending.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            last_sequence: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every observation in a log file.
    ///
    /// A torn final line from an interrupted write is skipped.
    pub fn read_all(path: &Path) -> Result<Vec<Observation>, StorageError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        let mut observations = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            match serde_json::from_str::<Observation>(line) {
                Ok(obs) => observations.push(obs),
                Err(e) if i + 1 == lines.len() => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping torn last line");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(observations)
    }

    /// Drop the writer so later calls fail with `Closed`.
    fn poison(&mut self) {
        self.writer = None;
    }
}

#[async_trait]
impl ObservationStore for JsonlStore {
    async fn append(&mut self, observation: &Observation) -> Result<u64, StorageError> {
        check_sequence(self.last_sequence, observation.sequence)?;
        let mut line = serde_json::to_vec(observation)?;
        line.push(b'\n');

        let writer = self.writer.as_mut().ok_or(StorageError::Closed)?;
        if let Err(e) = writer.write_all(&line).await {
            self.poison();
            return Err(e.into());
        }
        self.last_sequence = observation.sequence;
        Ok(observation.sequence)
    }

    async fn flush(&mut self) -> Result<(), StorageError> {
        let writer = self.writer.as_mut().ok_or(StorageError::Closed)?;
        let result = async {
            writer.flush().await?;
            writer.get_ref().sync_data().await
        }
        .await;
        if let Err(e) = result {
            self.poison();
            return Err(e.into());
        }
        Ok(())
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
                detail: Some(format!("n{sequence}")),
            },
        );
        Observation::from_update(sequence, run_id, update, Utc::now())
    }

    #[tokio::test]
    async fn test_append_flush_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("observations.jsonl");
        let run_id = Uuid::new_v4();

        let mut store = JsonlStore::open(&path).await.unwrap();
        for seq in 1..=3 {
            assert_eq!(store.append(&observation(seq, run_id)).await.unwrap(), seq);
        }
        store.flush().await.unwrap();
        assert_eq!(store.last_sequence(), 3);

        let read = JsonlStore::read_all(&path).unwrap();
        let sequences: Vec<u64> = read.iter().map(|o| o.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert!(read.iter().all(|o| o.run_id == run_id));
        assert!(matches!(
            &read[1].payload,
            UpdatePayload::Lifecycle { detail: Some(d), .. } if d == "n2"
        ));
    }

    #[tokio::test]
    async fn test_rejects_sequence_gap() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlStore::open(dir.path().join("o.jsonl")).await.unwrap();
        let run_id = Uuid::new_v4();

        store.append(&observation(1, run_id)).await.unwrap();
        let err = store.append(&observation(3, run_id)).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::SequenceMismatch {
                expected: 2,
                got: 3
            }
        ));
    }

    #[tokio::test]
    async fn test_reopen_appends_new_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("o.jsonl");

        for _ in 0..2 {
            let run_id = Uuid::new_v4();
            let mut store = JsonlStore::open(&path).await.unwrap();
            store.append(&observation(1, run_id)).await.unwrap();
            store.flush().await.unwrap();
        }

        let read = JsonlStore::read_all(&path).unwrap();
        assert_eq!(read.len(), 2);
        assert_ne!(read[0].run_id, read[1].run_id);
    }

    #[test]
    fn test_read_skips_torn_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("o.jsonl");
        let good = serde_json::to_string(&observation(1, Uuid::new_v4())).unwrap();
        std::fs::write(&path, format!("{good}\n{{\"sequence\":2,\"ru")).unwrap();

        let read = JsonlStore::read_all(&path).unwrap();
        assert_eq!(read.len(), 1);
        assert!(JsonlStore::read_all(&dir.path().join("missing.jsonl"))
            .unwrap()
            .is_empty());
    }
}
