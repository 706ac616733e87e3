//! The screen capture observer.
//!
//! Turns raw keyboard and mouse input into sessions bracketed by "before"
//! and "after" screenshots of the selection scope, and ends the run when
//! the user goes idle, when the selected windows disappear, or when capture
//! keeps failing.
//!
//! Update order for one session is fixed:
//!
//! ```text
//! screenshot(before) → [mouse-event | scroll-event]* → session summary → screenshot(after)
//! ```

use crate::capture::{
    CaptureError, CapturePhase, CaptureTarget, ScreenCapturer, Screenshot, SelectionScope,
};
use crate::collector::{CollectorError, DeviceKind, InputSource, MouseEventType, SensorEvent};
use crate::config::{Config, ConfigError, SourceConfig};
use crate::context::RunContext;
use crate::core::clock::SharedClock;
use crate::core::segmenter::{Segmentation, Session, SessionSegmenter};
use crate::core::watchdog::InactivityWatchdog;
use crate::error::RecorderError;
use crate::observer::update::{LifecyclePhase, StopReason, UpdatePayload};
use crate::observer::{Observer, ObserverContext, SinkClosed, UpdateSink};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Upper bound on input events handled per poll, so cancellation stays responsive.
const MAX_EVENTS_PER_POLL: usize = 1024;

/// Tunables for one screen observer.
#[derive(Debug, Clone)]
pub struct ScreenObserverSettings {
    pub source_id: String,
    pub debounce_gap: Duration,
    pub inactivity_timeout: Duration,
    pub poll_interval: Duration,
    pub capture_failure_threshold: u32,
    pub window_check_interval: Duration,
    pub screenshots_dir: PathBuf,
    pub sources: SourceConfig,
}

impl ScreenObserverSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            source_id: "screen".to_string(),
            debounce_gap: config.debounce_gap,
            inactivity_timeout: config.inactivity_timeout(),
            poll_interval: config.poll_interval,
            capture_failure_threshold: config.capture_failure_threshold,
            window_check_interval: config.window_check_interval,
            screenshots_dir: config.screenshots_path.clone(),
            sources: config.sources.clone(),
        }
    }
}

/// How the polling loop ended.
enum Exit {
    Cancelled,
    InputEnded,
    Stop(StopReason, String),
    SinkClosed,
    Collector(CollectorError),
}

enum PollError {
    SinkClosed,
    Collector(CollectorError),
}

impl From<SinkClosed> for PollError {
    fn from(_: SinkClosed) -> Self {
        PollError::SinkClosed
    }
}

pub struct ScreenObserver {
    settings: ScreenObserverSettings,
    scope: Arc<SelectionScope>,
    clock: SharedClock,
    input: Box<dyn InputSource>,
    capturer: Arc<dyn ScreenCapturer>,
    segmenter: SessionSegmenter,
    consecutive_failures: u32,
    capture_disabled: bool,
}

impl ScreenObserver {
    /// Build an observer for a run. Fails fast on an invalid debounce gap
    /// or inactivity timeout.
    pub fn new(
        ctx: &RunContext,
        settings: ScreenObserverSettings,
        input: Box<dyn InputSource>,
        capturer: Arc<dyn ScreenCapturer>,
    ) -> Result<Self, ConfigError> {
        let segmenter = SessionSegmenter::new(settings.debounce_gap)?;
        // Validate the timeout now; the watchdog is re-armed when the run starts
        InactivityWatchdog::new(settings.inactivity_timeout, ctx.clock.now())?;
        if settings.capture_failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "capture failure threshold must be at least 1".to_string(),
            ));
        }
        if settings.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "poll interval must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            settings,
            scope: ctx.selection_scope.clone(),
            clock: ctx.clock.clone(),
            input,
            capturer,
            segmenter,
            consecutive_failures: 0,
            capture_disabled: false,
        })
    }

    fn accepts(&self, event: &SensorEvent) -> bool {
        match event.device_kind() {
            DeviceKind::Keyboard => self.settings.sources.keyboard,
            DeviceKind::Mouse => self.settings.sources.mouse,
        }
    }

    async fn poll(
        &mut self,
        sink: &mut UpdateSink,
        watchdog: &mut InactivityWatchdog,
        next_window_check: &mut Instant,
    ) -> Result<Option<Exit>, PollError> {
        for _ in 0..MAX_EVENTS_PER_POLL {
            let event = match self.input.try_recv() {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(CollectorError::Disconnected) => return Ok(Some(Exit::InputEnded)),
                Err(e) => return Err(PollError::Collector(e)),
            };

            // Any device counts as activity, even one we do not segment
            watchdog.reset(event.timestamp());
            if !self.accepts(&event) {
                continue;
            }
            self.handle_event(sink, event).await?;
            if self.capture_disabled {
                return Ok(Some(self.capture_failure_exit()));
            }
        }

        let now = self.clock.now();
        for session in self.segmenter.tick(now) {
            self.on_session_closed(sink, session).await?;
        }
        if self.capture_disabled {
            return Ok(Some(self.capture_failure_exit()));
        }

        if watchdog.check(now) {
            let idle = watchdog.idle_for(now);
            info!(
                source = %self.settings.source_id,
                idle_secs = idle.num_seconds(),
                "no activity within inactivity timeout"
            );
            return Ok(Some(Exit::Stop(
                StopReason::InactivityTimeout,
                format!("no input for {} seconds", idle.num_seconds()),
            )));
        }

        if self.scope.window_ids().is_some() && Instant::now() >= *next_window_check {
            *next_window_check = Instant::now() + self.settings.window_check_interval;
            let capturer = self.capturer.clone();
            let scope = self.scope.clone();
            let available = tokio::task::spawn_blocking(move || capturer.scope_available(&scope))
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "window check task failed");
                    true
                });
            if !available {
                info!(scope = %self.scope, "selected windows are gone");
                return Ok(Some(Exit::Stop(
                    StopReason::WindowClosed,
                    format!("{} no longer exist", self.scope),
                )));
            }
        }

        Ok(None)
    }

    fn capture_failure_exit(&self) -> Exit {
        Exit::Stop(
            StopReason::CaptureFailure,
            format!(
                "{} consecutive screenshot failures",
                self.consecutive_failures
            ),
        )
    }

    async fn handle_event(
        &mut self,
        sink: &mut UpdateSink,
        event: SensorEvent,
    ) -> Result<(), SinkClosed> {
        match self.segmenter.feed(&event, event.timestamp()) {
            Segmentation::NoOp | Segmentation::Extended(_) => {}
            Segmentation::Opened(session) => self.on_session_opened(sink, &session).await?,
            Segmentation::Rolled { closed, opened } => {
                self.on_session_closed(sink, closed).await?;
                self.on_session_opened(sink, &opened).await?;
            }
        }

        if let SensorEvent::Mouse(mouse) = &event {
            let session_id = self
                .segmenter
                .open_session(DeviceKind::Mouse)
                .map(|s| s.session_id);
            let payload = match mouse.event_type {
                MouseEventType::LeftClick | MouseEventType::RightClick => {
                    Some(UpdatePayload::Pointer {
                        session_id,
                        at: mouse.timestamp,
                        button: mouse.event_type,
                    })
                }
                MouseEventType::Scroll => Some(UpdatePayload::Scroll {
                    session_id,
                    at: mouse.timestamp,
                    direction: mouse.scroll_direction,
                    magnitude: mouse.scroll_magnitude,
                }),
                MouseEventType::Move => None,
            };
            if let Some(payload) = payload {
                sink.send(self.clock.now(), payload).await?;
            }
        }

        Ok(())
    }

    /// Capture and emit the "before" screenshot for a new session.
    async fn on_session_opened(
        &mut self,
        sink: &mut UpdateSink,
        session: &Session,
    ) -> Result<(), SinkClosed> {
        debug!(session_id = %session.session_id, device = %session.device_kind, "session opened");
        let capture = self.capture(session, CapturePhase::Before).await;
        self.emit_capture(sink, session, CapturePhase::Before, capture)
            .await
    }

    /// Capture "after", then emit the session summary followed by the screenshot.
    async fn on_session_closed(
        &mut self,
        sink: &mut UpdateSink,
        session: Session,
    ) -> Result<(), SinkClosed> {
        debug!(
            session_id = %session.session_id,
            device = %session.device_kind,
            events = session.event_count,
            "session closed"
        );
        let capture = self.capture(&session, CapturePhase::After).await;
        sink.send(self.clock.now(), UpdatePayload::Session(session.clone()))
            .await?;
        self.emit_capture(sink, &session, CapturePhase::After, capture)
            .await
    }

    async fn emit_capture(
        &mut self,
        sink: &mut UpdateSink,
        session: &Session,
        phase: CapturePhase,
        capture: Option<Result<Screenshot, CaptureError>>,
    ) -> Result<(), SinkClosed> {
        let payload = match capture {
            // Capture was shut off after repeated failures
            None => return Ok(()),
            Some(Ok(screenshot)) => UpdatePayload::Screenshot {
                session_id: session.session_id,
                device_kind: session.device_kind,
                phase,
                images: screenshot.images,
            },
            Some(Err(error)) => UpdatePayload::CaptureFailed {
                session_id: session.session_id,
                phase,
                error: error.to_string(),
                consecutive_failures: self.consecutive_failures,
            },
        };
        sink.send(self.clock.now(), payload).await
    }

    async fn capture(
        &mut self,
        session: &Session,
        phase: CapturePhase,
    ) -> Option<Result<Screenshot, CaptureError>> {
        if self.capture_disabled {
            return None;
        }

        let taken_at = self.clock.now();
        let target = CaptureTarget::new(
            self.settings.screenshots_dir.clone(),
            format!(
                "{}_{}_{}",
                taken_at.format("%Y%m%dT%H%M%S%3f"),
                session.session_id.simple(),
                phase
            ),
        );
        let capturer = self.capturer.clone();
        let scope = self.scope.clone();

        let result = tokio::task::spawn_blocking(move || capturer.capture(&scope, &target))
            .await
            .unwrap_or_else(|e| Err(CaptureError::Io(format!("capture task failed: {e}"))));

        match &result {
            Ok(_) => self.consecutive_failures = 0,
            Err(e) => {
                self.consecutive_failures += 1;
                warn!(
                    session_id = %session.session_id,
                    %phase,
                    failures = self.consecutive_failures,
                    error = %e,
                    "screenshot capture failed"
                );
                if self.consecutive_failures >= self.settings.capture_failure_threshold {
                    self.capture_disabled = true;
                }
            }
        }
        Some(result)
    }

    async fn finish(&mut self, sink: &mut UpdateSink, exit: Exit) -> Result<(), RecorderError> {
        let (reason, detail) = match &exit {
            Exit::SinkClosed => {
                self.segmenter.stop();
                return Ok(());
            }
            Exit::Cancelled => (None, "stop requested".to_string()),
            Exit::InputEnded => (None, "input source ended".to_string()),
            Exit::Stop(reason, detail) => (Some(*reason), detail.clone()),
            Exit::Collector(e) => (None, format!("input source failed: {e}")),
        };

        for session in self.segmenter.stop() {
            if self.on_session_closed(sink, session).await.is_err() {
                return Ok(());
            }
        }

        let stopped = UpdatePayload::Lifecycle {
            phase: LifecyclePhase::Stopped,
            reason,
            detail: Some(detail),
        };
        if sink.send(self.clock.now(), stopped).await.is_err() {
            debug!(source = %self.settings.source_id, "sink closed before final lifecycle update");
        }

        match exit {
            Exit::Collector(e) => Err(RecorderError::Collector(e)),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Observer for ScreenObserver {
    fn source_id(&self) -> &str {
        &self.settings.source_id
    }

    async fn run(mut self: Box<Self>, ctx: ObserverContext) -> Result<(), RecorderError> {
        let ObserverContext { mut sink, cancel } = ctx;

        self.input.start()?;
        let started_at = self.clock.now();
        let mut watchdog = InactivityWatchdog::new(self.settings.inactivity_timeout, started_at)?;
        info!(
            source = %self.settings.source_id,
            scope = %self.scope,
            "screen observer started"
        );

        let started = UpdatePayload::Lifecycle {
            phase: LifecyclePhase::Started,
            reason: None,
            detail: Some(format!("capturing {}", self.scope)),
        };
        if sink.send(started_at, started).await.is_err() {
            self.input.stop();
            return Ok(());
        }

        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut next_window_check = Instant::now() + self.settings.window_check_interval;

        let exit = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Exit::Cancelled,
                _ = ticker.tick() => {
                    match self.poll(&mut sink, &mut watchdog, &mut next_window_check).await {
                        Ok(None) => {}
                        Ok(Some(exit)) => break exit,
                        Err(PollError::SinkClosed) => break Exit::SinkClosed,
                        Err(PollError::Collector(e)) => break Exit::Collector(e),
                    }
                }
            }
        };

        self.input.stop();
        let result = self.finish(&mut sink, exit).await;
        info!(source = %self.settings.source_id, "screen observer stopped");
        result
    }
}
