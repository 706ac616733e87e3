//! Gap-based segmentation of raw input into interaction sessions.
//!
//! Each device kind has its own track. A session opens on the first event
//! after a quiet period, is extended by every event that arrives within the
//! debounce gap, and closes when the gap elapses (on the next event or on a
//! [`SessionSegmenter::tick`]) or when the segmenter is stopped.

use crate::collector::types::{DeviceKind, SensorEvent};
use crate::config::ConfigError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bounded burst of input activity on one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub device_kind: DeviceKind,
    pub start_time: DateTime<Utc>,
    /// `None` while the session is open
    pub end_time: Option<DateTime<Utc>>,
    pub event_count: u64,
}

impl Session {
    fn open(device_kind: DeviceKind, at: DateTime<Utc>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            device_kind,
            start_time: at,
            end_time: None,
            event_count: 1,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.end_time.is_some()
    }

    /// Length of a closed session.
    pub fn duration(&self) -> Option<Duration> {
        self.end_time.map(|end| end - self.start_time)
    }
}

/// Result of feeding one event into the segmenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segmentation {
    /// The segmenter is stopped and ignored the event.
    NoOp,
    Opened(Session),
    Extended(Session),
    /// The gap elapsed: the previous session closed and this event opened a new one.
    Rolled { closed: Session, opened: Session },
}

#[derive(Debug, Default)]
struct Track {
    open: Option<Session>,
    last_event_time: Option<DateTime<Utc>>,
}

impl Track {
    fn close(&mut self) -> Option<Session> {
        let mut session = self.open.take()?;
        session.end_time = Some(self.last_event_time.unwrap_or(session.start_time));
        Some(session)
    }
}

/// Per-device session state machine.
#[derive(Debug)]
pub struct SessionSegmenter {
    debounce_gap: Duration,
    keyboard: Track,
    mouse: Track,
    stopped: bool,
}

impl SessionSegmenter {
    /// Create a segmenter. The debounce gap must be strictly positive.
    pub fn new(debounce_gap: std::time::Duration) -> Result<Self, ConfigError> {
        if debounce_gap.is_zero() {
            return Err(ConfigError::Invalid(
                "debounce gap must be greater than zero".to_string(),
            ));
        }
        let debounce_gap = Duration::from_std(debounce_gap)
            .map_err(|e| ConfigError::Invalid(format!("debounce gap out of range: {e}")))?;

        Ok(Self {
            debounce_gap,
            keyboard: Track::default(),
            mouse: Track::default(),
            stopped: false,
        })
    }

    pub fn debounce_gap(&self) -> Duration {
        self.debounce_gap
    }

    fn track_mut(&mut self, device: DeviceKind) -> &mut Track {
        match device {
            DeviceKind::Keyboard => &mut self.keyboard,
            DeviceKind::Mouse => &mut self.mouse,
        }
    }

    /// The currently open session for a device, if any.
    pub fn open_session(&self, device: DeviceKind) -> Option<&Session> {
        match device {
            DeviceKind::Keyboard => self.keyboard.open.as_ref(),
            DeviceKind::Mouse => self.mouse.open.as_ref(),
        }
    }

    /// Feed one raw event observed at `now`.
    pub fn feed(&mut self, event: &SensorEvent, now: DateTime<Utc>) -> Segmentation {
        if self.stopped {
            return Segmentation::NoOp;
        }

        let gap = self.debounce_gap;
        let device = event.device_kind();
        let track = self.track_mut(device);

        // Sources are ordered, but clamp a backwards step rather than corrupt the session.
        let now = match track.last_event_time {
            Some(last) if now < last => last,
            _ => now,
        };
        let within_gap = matches!(track.last_event_time, Some(last) if now - last < gap);

        let segmentation = match track.open.take() {
            Some(mut session) if within_gap => {
                session.event_count += 1;
                track.open = Some(session.clone());
                Segmentation::Extended(session)
            }
            Some(mut closed) => {
                closed.end_time = Some(track.last_event_time.unwrap_or(closed.start_time));
                let opened = Session::open(device, now);
                track.open = Some(opened.clone());
                Segmentation::Rolled { closed, opened }
            }
            None => {
                let opened = Session::open(device, now);
                track.open = Some(opened.clone());
                Segmentation::Opened(opened)
            }
        };

        track.last_event_time = Some(now);
        segmentation
    }

    /// Close every open session whose debounce gap has elapsed by `now`.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<Session> {
        let gap = self.debounce_gap;
        let mut closed = Vec::new();
        for track in [&mut self.keyboard, &mut self.mouse] {
            let expired = matches!(
                (track.open.as_ref(), track.last_event_time),
                (Some(_), Some(last)) if now - last >= gap
            );
            if expired {
                closed.extend(track.close());
            }
        }
        closed
    }

    /// Force-close all open sessions and ignore further events.
    pub fn stop(&mut self) -> Vec<Session> {
        self.stopped = true;
        [&mut self.keyboard, &mut self.mouse]
            .into_iter()
            .filter_map(Track::close)
            .collect()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::{KeyboardEvent, MouseEvent};

    fn key_at(base: DateTime<Utc>, secs: i64) -> (SensorEvent, DateTime<Utc>) {
        let at = base + Duration::seconds(secs);
        (SensorEvent::Keyboard(KeyboardEvent::at(at, true)), at)
    }

    fn segmenter(gap_secs: u64) -> SessionSegmenter {
        SessionSegmenter::new(std::time::Duration::from_secs(gap_secs)).unwrap()
    }

    #[test]
    fn test_zero_gap_is_rejected() {
        let result = SessionSegmenter::new(std::time::Duration::ZERO);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_keyboard_bursts_split_on_gap() {
        // Events at t=0,1,3,10 with a 2s gap
        let base = Utc::now();
        let mut seg = segmenter(2);

        let (e, t) = key_at(base, 0);
        let first = match seg.feed(&e, t) {
            Segmentation::Opened(s) => s,
            other => panic!("expected open, got {other:?}"),
        };

        let (e, t) = key_at(base, 1);
        assert!(matches!(seg.feed(&e, t), Segmentation::Extended(ref s) if s.event_count == 2));

        let (e, t) = key_at(base, 3);
        let second = match seg.feed(&e, t) {
            Segmentation::Rolled { closed, opened } => {
                assert_eq!(closed.session_id, first.session_id);
                assert_eq!(closed.start_time, base);
                assert_eq!(closed.end_time, Some(base + Duration::seconds(1)));
                assert_eq!(closed.event_count, 2);
                assert_eq!(opened.start_time, base + Duration::seconds(3));
                opened
            }
            other => panic!("expected roll at t=3, got {other:?}"),
        };

        let (e, t) = key_at(base, 10);
        match seg.feed(&e, t) {
            Segmentation::Rolled { closed, .. } => {
                assert_eq!(closed.session_id, second.session_id);
                assert_eq!(closed.start_time, base + Duration::seconds(3));
                assert_eq!(closed.end_time, Some(base + Duration::seconds(3)));
                assert_eq!(closed.event_count, 1);
            }
            other => panic!("expected roll at t=10, got {other:?}"),
        }
    }

    #[test]
    fn test_gap_equal_to_threshold_closes() {
        let base = Utc::now();
        let mut seg = segmenter(2);
        let key = |at| SensorEvent::Keyboard(KeyboardEvent::at(at, true));

        seg.feed(&key(base), base);
        let just_under = base + Duration::milliseconds(1999);
        assert!(matches!(
            seg.feed(&key(just_under), just_under),
            Segmentation::Extended(_)
        ));

        assert!(seg.tick(just_under + Duration::milliseconds(1999)).is_empty());
        let closed = seg.tick(just_under + Duration::seconds(2));
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].end_time, Some(just_under));
    }

    #[test]
    fn test_one_open_and_close_per_burst() {
        let base = Utc::now();
        let mut seg = segmenter(2);
        let mut opens = 0;
        let mut closes = 0;

        // Two bursts separated by a long pause; intra-burst gaps stay under 2s
        for ms in [0, 500, 1900, 3000, 4500, 20_000, 21_000, 22_999] {
            let at = base + Duration::milliseconds(ms);
            match seg.feed(&SensorEvent::Keyboard(KeyboardEvent::at(at, true)), at) {
                Segmentation::Opened(_) => opens += 1,
                Segmentation::Rolled { .. } => {
                    opens += 1;
                    closes += 1;
                }
                Segmentation::Extended(_) => {}
                Segmentation::NoOp => panic!("segmenter is running"),
            }
        }
        closes += seg.stop().len();

        assert_eq!(opens, 2);
        assert_eq!(closes, 2);
    }

    #[test]
    fn test_tick_closes_isolated_event() {
        let base = Utc::now();
        let mut seg = segmenter(2);
        let (e, t) = key_at(base, 0);
        seg.feed(&e, t);

        assert!(seg.tick(base + Duration::seconds(1)).is_empty());
        let closed = seg.tick(base + Duration::seconds(2));
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].end_time, Some(base));
        assert!(seg.open_session(DeviceKind::Keyboard).is_none());

        // A later event opens a fresh session rather than rolling
        let (e, t) = key_at(base, 5);
        assert!(matches!(seg.feed(&e, t), Segmentation::Opened(_)));
    }

    #[test]
    fn test_devices_are_tracked_independently() {
        let base = Utc::now();
        let mut seg = segmenter(2);
        let (e, t) = key_at(base, 0);
        seg.feed(&e, t);

        let click = SensorEvent::Mouse(MouseEvent::click_at(base, true));
        assert!(matches!(seg.feed(&click, base), Segmentation::Opened(_)));
        assert!(seg.open_session(DeviceKind::Keyboard).is_some());
        assert!(seg.open_session(DeviceKind::Mouse).is_some());
    }

    #[test]
    fn test_stop_force_closes_and_ignores_events() {
        let base = Utc::now();
        let mut seg = segmenter(2);
        let (e, t) = key_at(base, 0);
        seg.feed(&e, t);
        let (e, t) = key_at(base, 1);
        seg.feed(&e, t);

        let closed = seg.stop();
        assert_eq!(closed.len(), 1);
        assert!(closed[0].is_closed());
        assert_eq!(closed[0].duration(), Some(Duration::seconds(1)));

        let (e, t) = key_at(base, 2);
        assert_eq!(seg.feed(&e, t), Segmentation::NoOp);
        assert!(seg.stop().is_empty());
    }

    #[test]
    fn test_backwards_timestamp_is_clamped() {
        let base = Utc::now();
        let mut seg = segmenter(2);
        let (e, t) = key_at(base, 5);
        seg.feed(&e, t);
        let (e, t) = key_at(base, 4);
        assert!(matches!(seg.feed(&e, t), Segmentation::Extended(_)));

        let closed = seg.stop();
        assert_eq!(closed[0].end_time, Some(base + Duration::seconds(5)));
    }
}
