//! Observers produce ordered streams of [`Update`]s for the aggregator.
//!
//! Each observer runs as its own task and owns one [`UpdateSink`], the
//! sending half of a bounded queue drained only by the aggregator.

pub mod screen;
pub mod update;

use crate::error::RecorderError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use screen::{ScreenObserver, ScreenObserverSettings};
pub use update::{LifecyclePhase, StopReason, Update, UpdateKind, UpdatePayload};

/// A component producing a stream of timestamped activity updates.
#[async_trait]
pub trait Observer: Send {
    /// Stable identifier stamped on every update from this observer.
    fn source_id(&self) -> &str;

    /// Produce updates until cancelled or until the observer decides to stop.
    ///
    /// On cancellation the observer must finish in-flight work (close open
    /// sessions) and return promptly.
    async fn run(self: Box<Self>, ctx: ObserverContext) -> Result<(), RecorderError>;
}

/// Everything an observer receives from the aggregator when its run starts.
pub struct ObserverContext {
    pub sink: UpdateSink,
    pub cancel: CancellationToken,
}

/// The aggregator sealed the queue; no further updates are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkClosed;

impl std::fmt::Display for SinkClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "update sink closed")
    }
}

impl std::error::Error for SinkClosed {}

/// Sending half of one observer's hand-off queue.
///
/// `send` waits while the queue is full, so a slow writer slows the
/// producer down instead of losing updates.
pub struct UpdateSink {
    source_id: String,
    tx: mpsc::Sender<Update>,
    last_occurred_at: Option<DateTime<Utc>>,
}

impl UpdateSink {
    /// Create a sink and the receiver the aggregator drains.
    pub fn channel(
        source_id: impl Into<String>,
        capacity: usize,
    ) -> (UpdateSink, mpsc::Receiver<Update>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            UpdateSink {
                source_id: source_id.into(),
                tx,
                last_occurred_at: None,
            },
            rx,
        )
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Queue one update.
    ///
    /// `occurred_at` is clamped so it never goes backwards within this source.
    pub async fn send(
        &mut self,
        occurred_at: DateTime<Utc>,
        payload: UpdatePayload,
    ) -> Result<(), SinkClosed> {
        let occurred_at = match self.last_occurred_at {
            Some(last) if occurred_at < last => {
                tracing::debug!(source = %self.source_id, "clock stepped back, clamping update time");
                last
            }
            _ => occurred_at,
        };
        self.last_occurred_at = Some(occurred_at);

        let update = Update::new(self.source_id.clone(), occurred_at, payload);
        self.tx.send(update).await.map_err(|_| SinkClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
