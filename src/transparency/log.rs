//! Transparency log.
//!
//! Counts what the recorder has written, by update kind, so a participant
//! can see exactly how much was collected without opening the log itself.

use crate::observer::update::UpdateKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const KIND_COUNT: usize = 7;

fn kind_index(kind: UpdateKind) -> usize {
    match kind {
        UpdateKind::Screenshot => 0,
        UpdateKind::KeyboardSession => 1,
        UpdateKind::MouseSession => 2,
        UpdateKind::MouseEvent => 3,
        UpdateKind::ScrollEvent => 4,
        UpdateKind::CaptureError => 5,
        UpdateKind::Lifecycle => 6,
    }
}

/// Cumulative collection statistics.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Written observations, indexed by kind
    observations: [AtomicU64; KIND_COUNT],
    /// Screenshot image files written
    images_captured: AtomicU64,
    /// Screenshot files uploaded and removed locally
    images_uploaded: AtomicU64,
    runs_completed: AtomicU64,
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    pub fn new() -> Self {
        Self {
            observations: Default::default(),
            images_captured: AtomicU64::new(0),
            images_uploaded: AtomicU64::new(0),
            runs_completed: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that continues from, and saves to, `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!(error = %e, "could not load previous transparency stats");
        }

        log
    }

    /// Record one written observation.
    pub fn record_observation(&self, kind: UpdateKind) {
        self.observations[kind_index(kind)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_images(&self, count: u64) {
        self.images_captured.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_upload(&self) {
        self.images_uploaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_completed(&self) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self, kind: UpdateKind) -> u64 {
        self.observations[kind_index(kind)].load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            observations: UpdateKind::ALL
                .into_iter()
                .map(|kind| (kind, self.count(kind)))
                .collect(),
            images_captured: self.images_captured.load(Ordering::Relaxed),
            images_uploaded: self.images_uploaded.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Human-readable summary for the `status` command.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        let sessions =
            stats.count(UpdateKind::KeyboardSession) + stats.count(UpdateKind::MouseSession);
        format!(
            "Collection Statistics:\n\
             - Recording runs completed: {}\n\
             - Interaction sessions: {} (keyboard {}, mouse {})\n\
             - Clicks recorded: {}\n\
             - Scrolls recorded: {}\n\
             - Screenshots: {} ({} image files, {} uploaded)\n\
             - Capture failures: {}\n\
             - Tracking for: {} seconds\n\
             \n\
             Privacy Guarantee:\n\
             - No key content captured\n\
             - No cursor coordinates captured\n\
             - Screenshots limited to the selected windows or screens",
            stats.runs_completed,
            sessions,
            stats.count(UpdateKind::KeyboardSession),
            stats.count(UpdateKind::MouseSession),
            stats.count(UpdateKind::MouseEvent),
            stats.count(UpdateKind::ScrollEvent),
            stats.count(UpdateKind::Screenshot),
            stats.images_captured,
            stats.images_uploaded,
            stats.count(UpdateKind::CaptureError),
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                observations: stats.observations,
                images_captured: stats.images_captured,
                images_uploaded: stats.images_uploaded,
                runs_completed: stats.runs_completed,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                for (kind, count) in persisted.observations {
                    self.observations[kind_index(kind)].store(count, Ordering::Relaxed);
                }
                self.images_captured
                    .store(persisted.images_captured, Ordering::Relaxed);
                self.images_uploaded
                    .store(persisted.images_uploaded, Ordering::Relaxed);
                self.runs_completed
                    .store(persisted.runs_completed, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    pub fn reset(&self) {
        for counter in &self.observations {
            counter.store(0, Ordering::Relaxed);
        }
        self.images_captured.store(0, Ordering::Relaxed);
        self.images_uploaded.store(0, Ordering::Relaxed);
        self.runs_completed.store(0, Ordering::Relaxed);
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub observations: BTreeMap<UpdateKind, u64>,
    pub images_captured: u64,
    pub images_uploaded: u64,
    pub runs_completed: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

impl TransparencyStats {
    pub fn count(&self, kind: UpdateKind) -> u64 {
        self.observations.get(&kind).copied().unwrap_or(0)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    #[serde(default)]
    observations: BTreeMap<UpdateKind, u64>,
    #[serde(default)]
    images_captured: u64,
    #[serde(default)]
    images_uploaded: u64,
    #[serde(default)]
    runs_completed: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_kind() {
        let log = TransparencyLog::new();

        log.record_observation(UpdateKind::Screenshot);
        log.record_observation(UpdateKind::Screenshot);
        log.record_observation(UpdateKind::KeyboardSession);
        log.record_images(3);

        let stats = log.stats();
        assert_eq!(stats.count(UpdateKind::Screenshot), 2);
        assert_eq!(stats.count(UpdateKind::KeyboardSession), 1);
        assert_eq!(stats.count(UpdateKind::ScrollEvent), 0);
        assert_eq!(stats.images_captured, 3);
    }

    #[test]
    fn test_reset() {
        let log = TransparencyLog::new();
        log.record_observation(UpdateKind::MouseEvent);
        log.record_run_completed();
        log.reset();

        let stats = log.stats();
        assert_eq!(stats.count(UpdateKind::MouseEvent), 0);
        assert_eq!(stats.runs_completed, 0);
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transparency.json");

        let log = TransparencyLog::with_persistence(path.clone());
        log.record_observation(UpdateKind::CaptureError);
        log.record_run_completed();
        log.save().unwrap();

        let reloaded = TransparencyLog::with_persistence(path);
        assert_eq!(reloaded.count(UpdateKind::CaptureError), 1);
        assert_eq!(reloaded.stats().runs_completed, 1);
    }

    #[test]
    fn test_summary_format() {
        let log = TransparencyLog::new();
        let summary = log.summary();

        assert!(summary.contains("Interaction sessions"));
        assert!(summary.contains("Screenshots"));
        assert!(summary.contains("Privacy Guarantee"));
        assert!(summary.contains("No key content captured"));
    }
}
