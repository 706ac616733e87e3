//! Fan-in of observer update streams into the durable log.
//!
//! The aggregator starts every registered observer on its own task, reads
//! whichever hand-off queue is ready, and writes each update as the next
//! observation before reading another. It is the only writer to the store.
//!
//! Every stop, whatever triggered it, goes through one [`StopHandle`]:
//!
//! 1. the first request fixes the stop reason
//! 2. observers are cancelled and get `drain_timeout` to close open sessions
//! 3. the queues are sealed and whatever is still buffered is written
//! 4. observer tasks are joined and the store is flushed once
//! 5. the [`RunSummary`] is published to every waiting `stop` caller

use crate::context::RunContext;
use crate::error::RecorderError;
use crate::observer::update::{StopReason, Update, UpdateKind, UpdatePayload};
use crate::observer::{Observer, ObserverContext, UpdateSink};
use crate::storage::{Observation, ObservationStore, StorageError};
use crate::transparency::SharedTransparencyLog;
use crate::upload::UploadQueue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::poll_fn;
use std::path::PathBuf;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outcome of a recording run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub host: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub stop_reason: StopReason,
    /// Written observations per kind
    pub counts: BTreeMap<UpdateKind, u64>,
    pub observations_written: u64,
    pub last_sequence: u64,
    /// Updates received but never written because the store had failed
    pub dropped_updates: u64,
    /// The error behind a fatal stop
    pub fatal_error: Option<String>,
}

impl RunSummary {
    pub fn count(&self, kind: UpdateKind) -> u64 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Run {} on {}", self.run_id, self.host)?;
        writeln!(f, "  Stopped: {}", self.stop_reason)?;
        writeln!(f, "  Duration: {:.1}s", self.duration_secs)?;
        writeln!(
            f,
            "  Observations written: {} (last sequence {})",
            self.observations_written, self.last_sequence
        )?;
        for (kind, count) in &self.counts {
            writeln!(f, "    {kind}: {count}")?;
        }
        if self.dropped_updates > 0 {
            writeln!(f, "  Updates not written: {}", self.dropped_updates)?;
        }
        if let Some(err) = &self.fatal_error {
            writeln!(f, "  Error: {err}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct StopRequest {
    reason: StopReason,
    detail: Option<String>,
}

struct StopShared {
    requested: watch::Sender<Option<StopRequest>>,
    summary: watch::Sender<Option<RunSummary>>,
}

/// Cloneable handle for stopping a run from anywhere.
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<StopShared>,
}

impl StopHandle {
    fn new() -> Self {
        let (requested, _) = watch::channel(None);
        let (summary, _) = watch::channel(None);
        Self {
            shared: Arc::new(StopShared { requested, summary }),
        }
    }

    /// Ask the run to stop. Only the first request sets the reason; returns
    /// whether this call was it.
    pub fn request(&self, reason: StopReason) -> bool {
        self.request_with_detail(reason, None)
    }

    fn request_with_detail(&self, reason: StopReason, detail: Option<String>) -> bool {
        let accepted = self.shared.requested.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(StopRequest {
                reason,
                detail: detail.clone(),
            });
            true
        });
        if accepted {
            info!(%reason, "stop requested");
        } else {
            debug!(%reason, "stop already requested");
        }
        accepted
    }

    /// Request a stop and wait for the run summary.
    ///
    /// Any number of callers may wait; all get the same summary.
    pub async fn stop(&self, reason: StopReason) -> RunSummary {
        self.request(reason);
        self.summary().await
    }

    /// Wait for the run to finish.
    pub async fn summary(&self) -> RunSummary {
        let mut rx = self.shared.summary.subscribe();
        loop {
            if let Some(summary) = rx.borrow_and_update().as_ref() {
                return summary.clone();
            }
            if rx.changed().await.is_err() {
                // The sender lives in `shared`, which this handle keeps alive
                std::future::pending::<()>().await;
            }
        }
    }

    pub fn reason(&self) -> Option<StopReason> {
        self.shared.requested.borrow().as_ref().map(|r| r.reason)
    }

    pub fn is_stopping(&self) -> bool {
        self.shared.requested.borrow().is_some()
    }

    fn detail(&self) -> Option<String> {
        self.shared
            .requested
            .borrow()
            .as_ref()
            .and_then(|r| r.detail.clone())
    }

    fn subscribe(&self) -> watch::Receiver<Option<StopRequest>> {
        self.shared.requested.subscribe()
    }

    fn publish(&self, summary: RunSummary) {
        self.shared.summary.send_replace(Some(summary));
    }
}

/// Round-robin reader over every observer's queue.
struct FanIn {
    sources: Vec<FanInSource>,
    next: usize,
}

struct FanInSource {
    source_id: String,
    rx: mpsc::Receiver<Update>,
    done: bool,
}

impl FanIn {
    fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Update>> {
        let n = self.sources.len();
        let mut pending = false;
        for offset in 0..n {
            let idx = (self.next + offset) % n;
            let source = &mut self.sources[idx];
            if source.done {
                continue;
            }
            match source.rx.poll_recv(cx) {
                Poll::Ready(Some(update)) => {
                    self.next = (idx + 1) % n;
                    return Poll::Ready(Some(update));
                }
                Poll::Ready(None) => {
                    debug!(source = %source.source_id, "update queue closed");
                    source.done = true;
                }
                Poll::Pending => pending = true,
            }
        }
        if pending {
            Poll::Pending
        } else {
            Poll::Ready(None)
        }
    }

    /// Next update from any source, or `None` once every queue is closed and empty.
    async fn recv(&mut self) -> Option<Update> {
        poll_fn(|cx| self.poll_recv(cx)).await
    }

    /// Refuse further sends; buffered updates stay readable.
    fn seal(&mut self) {
        for source in &mut self.sources {
            source.rx.close();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
    Finished,
}

/// The single writer of a run's observation log.
pub struct Aggregator {
    ctx: RunContext,
    store: Box<dyn ObservationStore>,
    observers: Vec<Box<dyn Observer>>,
    state: RunState,
    stop: StopHandle,
    uploads: Option<UploadQueue>,
    transparency: Option<SharedTransparencyLog>,

    next_sequence: u64,
    counts: BTreeMap<UpdateKind, u64>,
    written: u64,
    dropped: u64,
    dirty: bool,
    pending_uploads: Vec<PathBuf>,
    /// Set once a write or flush fails; nothing is written afterwards
    storage_error: Option<String>,
}

impl Aggregator {
    pub fn new(ctx: RunContext, store: Box<dyn ObservationStore>) -> Self {
        Self {
            ctx,
            store,
            observers: Vec::new(),
            state: RunState::Idle,
            stop: StopHandle::new(),
            uploads: None,
            transparency: None,
            next_sequence: 1,
            counts: BTreeMap::new(),
            written: 0,
            dropped: 0,
            dirty: false,
            pending_uploads: Vec::new(),
            storage_error: None,
        }
    }

    /// Hand flushed screenshot files to an upload dispatcher.
    pub fn with_uploads(mut self, queue: UploadQueue) -> Self {
        self.uploads = Some(queue);
        self
    }

    pub fn with_transparency(mut self, log: SharedTransparencyLog) -> Self {
        self.transparency = Some(log);
        self
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Add an observer. Only allowed before the run starts, and source ids
    /// must be unique.
    pub fn register(&mut self, observer: Box<dyn Observer>) -> Result<(), RecorderError> {
        if self.state != RunState::Idle {
            return Err(RecorderError::Configuration(format!(
                "cannot register observer '{}' after the run has started",
                observer.source_id()
            )));
        }
        if self
            .observers
            .iter()
            .any(|o| o.source_id() == observer.source_id())
        {
            return Err(RecorderError::Configuration(format!(
                "duplicate observer source id '{}'",
                observer.source_id()
            )));
        }
        debug!(source = %observer.source_id(), "observer registered");
        self.observers.push(observer);
        Ok(())
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Run until stopped and return the summary.
    ///
    /// Errors only when the run cannot start. Failures during the run end it
    /// with a fatal stop reason recorded in the summary.
    pub async fn run(&mut self) -> Result<RunSummary, RecorderError> {
        match self.state {
            RunState::Idle => {}
            RunState::Running | RunState::Finished => {
                return Err(RecorderError::Configuration(
                    "run already started".to_string(),
                ))
            }
        }
        if self.observers.is_empty() {
            return Err(RecorderError::Configuration(
                "no observers registered".to_string(),
            ));
        }
        self.state = RunState::Running;

        let config = self.ctx.config.clone();
        let started_at = self.ctx.clock.now();
        info!(
            run_id = %self.ctx.run_id,
            scope = %self.ctx.selection_scope,
            observers = self.observers.len(),
            "recording run started"
        );

        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let mut sources = Vec::with_capacity(self.observers.len());
        for observer in self.observers.drain(..) {
            let source_id = observer.source_id().to_string();
            let (sink, rx) = UpdateSink::channel(source_id.clone(), config.channel_capacity);
            let observer_ctx = ObserverContext {
                sink,
                cancel: cancel.child_token(),
            };
            let task_source = source_id.clone();
            tasks.spawn(async move { (task_source, observer.run(observer_ctx).await) });
            sources.push(FanInSource {
                source_id,
                rx,
                done: false,
            });
        }
        let mut fan_in = FanIn { sources, next: 0 };

        let mut requested = self.stop.subscribe();
        let mut flush_ticker = interval_at(
            Instant::now() + config.flush_interval,
            config.flush_interval,
        );
        flush_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.stop.is_stopping() {
            tokio::select! {
                changed = requested.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                next = fan_in.recv() => match next {
                    Some(update) => self.accept(update).await,
                    // Every observer has exited; join results decide the reason
                    None => break,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    self.observer_exited(joined);
                }
                _ = flush_ticker.tick(), if self.dirty => {
                    self.flush().await;
                }
            }
        }

        // Give observers the grace period to close sessions, writing as they go
        cancel.cancel();
        let drain_deadline = Instant::now() + config.drain_timeout;
        if self.storage_error.is_none() {
            loop {
                tokio::select! {
                    next = fan_in.recv() => match next {
                        Some(update) => self.accept(update).await,
                        None => break,
                    },
                    _ = tokio::time::sleep_until(drain_deadline) => {
                        warn!("drain timeout elapsed before all observers finished");
                        break;
                    }
                }
            }
        }

        // No update is accepted after this point, only what is already queued
        fan_in.seal();
        while let Some(update) = fan_in.recv().await {
            self.accept(update).await;
        }

        let join_deadline = drain_deadline.max(Instant::now() + config.poll_interval);
        loop {
            match tokio::time::timeout_at(join_deadline, tasks.join_next()).await {
                Ok(Some(joined)) => self.observer_exited(joined),
                Ok(None) => break,
                Err(_) => {
                    warn!(remaining = tasks.len(), "aborting observers that did not stop");
                    tasks.abort_all();
                    break;
                }
            }
        }
        self.stop.request(StopReason::Completed);

        if self.storage_error.is_none() {
            self.flush().await;
        }

        let ended_at = self.ctx.clock.now();
        let stop_reason = self.stop.reason().unwrap_or(StopReason::Completed);
        let fatal_error = match &self.storage_error {
            Some(e) => Some(e.clone()),
            None if stop_reason.is_fatal() => self.stop.detail(),
            None => None,
        };
        let summary = RunSummary {
            run_id: self.ctx.run_id,
            host: self.ctx.host.clone(),
            started_at,
            ended_at,
            duration_secs: (ended_at - started_at).num_milliseconds().max(0) as f64 / 1000.0,
            stop_reason,
            counts: self.counts.clone(),
            observations_written: self.written,
            last_sequence: self.next_sequence - 1,
            dropped_updates: self.dropped,
            fatal_error,
        };

        if let Some(log) = &self.transparency {
            log.record_run_completed();
        }
        info!(
            run_id = %summary.run_id,
            reason = %summary.stop_reason,
            written = summary.observations_written,
            "recording run finished"
        );

        self.state = RunState::Finished;
        self.uploads = None;
        self.stop.publish(summary.clone());
        Ok(summary)
    }

    /// Write one update as the next observation.
    async fn accept(&mut self, update: Update) {
        if self.storage_error.is_some() {
            self.dropped += 1;
            return;
        }

        let stop = update.stop_reason().map(|reason| {
            let detail = match &update.payload {
                UpdatePayload::Lifecycle { detail, .. } => detail.clone(),
                _ => None,
            };
            (reason, detail)
        });
        let kind = update.kind;
        let source_id = update.source_id.clone();
        let images = update.image_paths();

        let sequence = self.next_sequence;
        let observation =
            Observation::from_update(sequence, self.ctx.run_id, update, self.ctx.clock.now());
        let write_timeout = self.ctx.config.write_timeout;
        let result = match timeout(write_timeout, self.store.append(&observation)).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout(write_timeout)),
        };

        match result {
            Ok(_) => {
                self.next_sequence += 1;
                self.written += 1;
                self.dirty = true;
                *self.counts.entry(kind).or_insert(0) += 1;
                if let Some(log) = &self.transparency {
                    log.record_observation(kind);
                    log.record_images(images.len() as u64);
                }
                debug!(source = %source_id, sequence, %kind, "observation written");
                if self.uploads.is_some() {
                    self.pending_uploads.extend(images);
                }
            }
            Err(e) => {
                self.fail_storage(e, Some(sequence));
                self.dropped += 1;
                return;
            }
        }

        if let Some((reason, detail)) = stop {
            info!(source = %source_id, %reason, "observer requested stop");
            self.stop.request_with_detail(reason, detail);
        }
    }

    async fn flush(&mut self) {
        let write_timeout = self.ctx.config.write_timeout;
        let result = match timeout(write_timeout, self.store.flush()).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout(write_timeout)),
        };
        match result {
            Ok(()) => {
                self.dirty = false;
                debug!(last_sequence = self.store.last_sequence(), "observation log flushed");
                if let Some(queue) = &self.uploads {
                    for path in self.pending_uploads.drain(..) {
                        if !queue.submit(path) {
                            warn!("upload dispatcher is gone, keeping screenshots locally");
                            break;
                        }
                    }
                }
                self.pending_uploads.clear();
            }
            Err(e) => self.fail_storage(e, None),
        }
    }

    fn fail_storage(&mut self, e: StorageError, sequence: Option<u64>) {
        let err = RecorderError::Storage(e);
        error!(?sequence, error = %err, "observation log write failed");
        self.stop
            .request_with_detail(StopReason::StorageFailure, Some(err.to_string()));
        self.storage_error = Some(err.to_string());
    }

    fn observer_exited(&mut self, joined: Result<(String, Result<(), RecorderError>), JoinError>) {
        match joined {
            Ok((source, Ok(()))) => debug!(%source, "observer exited"),
            Ok((source, Err(e))) => {
                error!(%source, kind = e.kind(), error = %e, "observer failed");
                self.stop.request_with_detail(
                    StopReason::ObserverFailure,
                    Some(format!("{source}: {e}")),
                );
            }
            Err(e) if e.is_cancelled() => debug!("observer task aborted"),
            Err(e) => {
                error!(error = %e, "observer task panicked");
                self.stop.request_with_detail(
                    StopReason::ObserverFailure,
                    Some(format!("observer panicked: {e}")),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SelectionScope;
    use crate::config::Config;
    use crate::observer::update::LifecyclePhase;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;

    /// Emits `count` lifecycle updates then waits for cancellation.
    struct Counter {
        id: String,
        count: usize,
        then_stop: Option<StopReason>,
    }

    #[async_trait]
    impl Observer for Counter {
        fn source_id(&self) -> &str {
            &self.id
        }

        async fn run(self: Box<Self>, ctx: ObserverContext) -> Result<(), RecorderError> {
            let ObserverContext { mut sink, cancel } = ctx;
            for i in 0..self.count {
                let payload = UpdatePayload::Lifecycle {
                    phase: LifecyclePhase::Started,
                    reason: None,
                    detail: Some(format!("{}-{i}", self.id)),
                };
                if sink.send(Utc::now(), payload).await.is_err() {
                    return Ok(());
                }
            }
            if let Some(reason) = self.then_stop {
                let _ = sink
                    .send(
                        Utc::now(),
                        UpdatePayload::Lifecycle {
                            phase: LifecyclePhase::Stopped,
                            reason: Some(reason),
                            detail: None,
                        },
                    )
                    .await;
            }
            cancel.cancelled().await;
            Ok(())
        }
    }

    fn counter(id: &str, count: usize, then_stop: Option<StopReason>) -> Box<dyn Observer> {
        Box::new(Counter {
            id: id.to_string(),
            count,
            then_stop,
        })
    }

    fn test_config() -> Config {
        Config {
            poll_interval: std::time::Duration::from_millis(5),
            drain_timeout: std::time::Duration::from_millis(500),
            ..Config::default()
        }
    }

    fn aggregator_with(config: Config, store: Box<dyn ObservationStore>) -> Aggregator {
        let ctx = RunContext::new(config, SelectionScope::AllScreens).unwrap();
        Aggregator::new(ctx, store)
    }

    fn aggregator(store: MemoryStore) -> Aggregator {
        aggregator_with(test_config(), Box::new(store))
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut agg = aggregator(MemoryStore::new());
        agg.register(counter("a", 0, None)).unwrap();
        let err = agg.register(counter("a", 0, None)).unwrap_err();
        assert_eq!(err.kind(), "configuration");
    }

    #[tokio::test]
    async fn test_run_without_observers_fails() {
        let mut agg = aggregator(MemoryStore::new());
        assert!(agg.run().await.is_err());
    }

    #[tokio::test]
    async fn test_observer_stop_reason_ends_run() {
        let store = MemoryStore::new();
        let mut agg = aggregator(store.clone());
        agg.register(counter("a", 3, Some(StopReason::WindowClosed)))
            .unwrap();
        agg.register(counter("b", 2, None)).unwrap();

        let summary = agg.run().await.unwrap();
        assert_eq!(summary.stop_reason, StopReason::WindowClosed);
        assert!(summary.fatal_error.is_none());

        let sequences: Vec<u64> = store.observations().iter().map(|o| o.sequence).collect();
        let expected: Vec<u64> = (1..=summary.last_sequence).collect();
        assert_eq!(sequences, expected);
        assert_eq!(store.flushed().len(), store.observations().len());

        // Per-source order survives the interleaving
        let a_details: Vec<String> = store
            .observations()
            .iter()
            .filter(|o| o.source_id == "a")
            .filter_map(|o| match &o.payload {
                UpdatePayload::Lifecycle { detail, .. } => detail.clone(),
                _ => None,
            })
            .collect();
        assert_eq!(a_details, vec!["a-0", "a-1", "a-2"]);

        assert!(agg.register(counter("c", 0, None)).is_err());
        assert!(agg.run().await.is_err());
    }

    #[tokio::test]
    async fn test_all_observers_exiting_completes() {
        struct Once;

        #[async_trait]
        impl Observer for Once {
            fn source_id(&self) -> &str {
                "once"
            }

            async fn run(self: Box<Self>, mut ctx: ObserverContext) -> Result<(), RecorderError> {
                let _ = ctx
                    .sink
                    .send(
                        Utc::now(),
                        UpdatePayload::Lifecycle {
                            phase: LifecyclePhase::Started,
                            reason: None,
                            detail: None,
                        },
                    )
                    .await;
                Ok(())
            }
        }

        let store = MemoryStore::new();
        let mut agg = aggregator(store.clone());
        agg.register(Box::new(Once)).unwrap();
        let summary = agg.run().await.unwrap();
        assert_eq!(summary.stop_reason, StopReason::Completed);
        assert_eq!(summary.observations_written, 1);
    }

    #[tokio::test]
    async fn test_failed_observer_is_fatal() {
        struct Broken;

        #[async_trait]
        impl Observer for Broken {
            fn source_id(&self) -> &str {
                "broken"
            }

            async fn run(self: Box<Self>, _ctx: ObserverContext) -> Result<(), RecorderError> {
                Err(RecorderError::Collector(
                    crate::collector::CollectorError::PermissionDenied,
                ))
            }
        }

        let mut agg = aggregator(MemoryStore::new());
        agg.register(Box::new(Broken)).unwrap();
        agg.register(counter("ok", 1, None)).unwrap();
        let summary = agg.run().await.unwrap();
        assert_eq!(summary.stop_reason, StopReason::ObserverFailure);
        assert!(summary.fatal_error.unwrap().contains("broken"));
    }

    #[tokio::test]
    async fn test_sends_after_seal_are_refused() {
        use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

        /// Ignores cancellation and keeps sending until the queue is sealed.
        struct Stubborn {
            accepted: Arc<AtomicU64>,
            refused: Arc<AtomicBool>,
        }

        #[async_trait]
        impl Observer for Stubborn {
            fn source_id(&self) -> &str {
                "stubborn"
            }

            async fn run(self: Box<Self>, ctx: ObserverContext) -> Result<(), RecorderError> {
                let mut sink = ctx.sink;
                loop {
                    let payload = UpdatePayload::Lifecycle {
                        phase: LifecyclePhase::Started,
                        reason: None,
                        detail: None,
                    };
                    if sink.send(Utc::now(), payload).await.is_err() {
                        self.refused.store(true, Ordering::SeqCst);
                        return Ok(());
                    }
                    self.accepted.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                }
            }
        }

        let accepted = Arc::new(AtomicU64::new(0));
        let refused = Arc::new(AtomicBool::new(false));
        let store = MemoryStore::new();
        let config = Config {
            drain_timeout: std::time::Duration::from_millis(50),
            ..test_config()
        };
        let mut agg = aggregator_with(config, Box::new(store.clone()));
        agg.register(Box::new(Stubborn {
            accepted: accepted.clone(),
            refused: refused.clone(),
        }))
        .unwrap();
        let stop = agg.stop_handle();
        let run = tokio::spawn(async move { agg.run().await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let summary = stop.stop(StopReason::UserCancelled).await;
        run.await.unwrap().unwrap();

        assert!(refused.load(Ordering::SeqCst));
        // Everything queued before the seal is written, nothing after it
        assert_eq!(summary.observations_written, accepted.load(Ordering::SeqCst));
        assert_eq!(store.observations().len() as u64, summary.observations_written);
        assert_eq!(store.flushed().len() as u64, summary.observations_written);
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_locked_database_fails_run_within_write_timeout() {
        use crate::storage::SqliteStore;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("observations.db");
        let write_timeout = std::time::Duration::from_millis(200);
        let store = SqliteStore::open(&path, write_timeout).unwrap();

        let holder = rusqlite::Connection::open(&path).unwrap();
        holder.execute_batch("BEGIN IMMEDIATE").unwrap();

        let config = Config {
            write_timeout,
            ..test_config()
        };
        let mut agg = aggregator_with(config, Box::new(store));
        agg.register(counter("a", 1, None)).unwrap();

        let started = std::time::Instant::now();
        let summary = agg.run().await.unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
        assert_eq!(summary.stop_reason, StopReason::StorageFailure);
        assert_eq!(summary.observations_written, 0);
        assert!(summary.fatal_error.unwrap().contains("200ms"));
        holder.execute_batch("ROLLBACK").unwrap();
    }
}
