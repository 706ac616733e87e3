//! The input-source seam between platform collectors and observers.

use crate::collector::types::SensorEvent;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};

/// Configuration for which event sources to capture.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub capture_keyboard: bool,
    pub capture_mouse: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            capture_keyboard: true,
            capture_mouse: true,
        }
    }
}

/// Errors that can occur during event collection.
#[derive(Debug)]
pub enum CollectorError {
    AlreadyRunning,
    PermissionDenied,
    TapCreationFailed,
    RunLoopSourceFailed,
    Disconnected,
}

impl std::fmt::Display for CollectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorError::AlreadyRunning => write!(f, "Collector is already running"),
            CollectorError::PermissionDenied => {
                write!(f, "Input Monitoring permission not granted")
            }
            CollectorError::TapCreationFailed => write!(f, "Failed to create CGEvent tap"),
            CollectorError::RunLoopSourceFailed => {
                write!(f, "Failed to create run loop source")
            }
            CollectorError::Disconnected => write!(f, "Input source disconnected"),
        }
    }
}

impl std::error::Error for CollectorError {}

/// A producer of raw input events polled by an observer.
///
/// Implementations buffer events internally; `try_recv` never blocks.
pub trait InputSource: Send {
    fn start(&mut self) -> Result<(), CollectorError>;

    fn stop(&mut self);

    /// Take the next buffered event, if any.
    ///
    /// Returns `Err(CollectorError::Disconnected)` once the source can no
    /// longer produce events.
    fn try_recv(&mut self) -> Result<Option<SensorEvent>, CollectorError>;
}

/// An input source fed through a crossbeam channel.
///
/// Used to replay recorded events and to drive observers in tests.
pub struct ChannelSource {
    receiver: Receiver<SensorEvent>,
    running: bool,
}

impl ChannelSource {
    /// Create a source together with the sender that feeds it.
    pub fn new(capacity: usize) -> (Sender<SensorEvent>, Self) {
        let (sender, receiver) = bounded(capacity);
        (
            sender,
            Self {
                receiver,
                running: false,
            },
        )
    }
}

impl InputSource for ChannelSource {
    fn start(&mut self) -> Result<(), CollectorError> {
        if self.running {
            return Err(CollectorError::AlreadyRunning);
        }
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn try_recv(&mut self) -> Result<Option<SensorEvent>, CollectorError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            // Buffered events are returned before Disconnected is reported.
            Err(TryRecvError::Disconnected) => Err(CollectorError::Disconnected),
        }
    }
}

/// Create the event buffer between a background capture thread and its collector.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub(crate) fn thread_feed(capacity: usize) -> (FeedWriter, ThreadFeed) {
    let (sender, receiver) = bounded(capacity);
    let failure = Arc::new(Mutex::new(None));
    (
        FeedWriter {
            sender,
            failure: failure.clone(),
        },
        ThreadFeed { receiver, failure },
    )
}

/// The capture thread's end of the buffer. Dropping every sender ends the feed.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub(crate) struct FeedWriter {
    sender: Sender<SensorEvent>,
    failure: Arc<Mutex<Option<CollectorError>>>,
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
impl FeedWriter {
    pub(crate) fn sender(&self) -> Sender<SensorEvent> {
        self.sender.clone()
    }

    /// Record why the thread stopped, then close the feed.
    pub(crate) fn fail(self, error: CollectorError) {
        if let Ok(mut slot) = self.failure.lock() {
            *slot = Some(error);
        }
    }
}

/// The collector's end of the buffer.
///
/// Once the thread has exited and the buffer is empty, `try_recv` reports
/// the thread's error if it had one, otherwise `Disconnected`.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub(crate) struct ThreadFeed {
    receiver: Receiver<SensorEvent>,
    failure: Arc<Mutex<Option<CollectorError>>>,
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
impl ThreadFeed {
    pub(crate) fn try_recv(&self) -> Result<Option<SensorEvent>, CollectorError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                let failure = self.failure.lock().ok().and_then(|mut slot| slot.take());
                Err(failure.unwrap_or(CollectorError::Disconnected))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::KeyboardEvent;

    #[test]
    fn test_collector_config_default() {
        let config = CollectorConfig::default();
        assert!(config.capture_keyboard);
        assert!(config.capture_mouse);
    }

    #[test]
    fn test_channel_source_delivers_in_order() {
        let (tx, mut source) = ChannelSource::new(8);
        source.start().unwrap();
        tx.send(SensorEvent::Keyboard(KeyboardEvent::new(true)))
            .unwrap();
        tx.send(SensorEvent::Keyboard(KeyboardEvent::new(false)))
            .unwrap();

        let first = source.try_recv().unwrap().unwrap();
        let second = source.try_recv().unwrap().unwrap();
        assert!(matches!(first, SensorEvent::Keyboard(ref k) if k.is_key_down));
        assert!(matches!(second, SensorEvent::Keyboard(ref k) if !k.is_key_down));
        assert!(source.try_recv().unwrap().is_none());

        drop(tx);
        assert!(matches!(
            source.try_recv(),
            Err(CollectorError::Disconnected)
        ));
    }

    #[test]
    fn test_channel_source_rejects_double_start() {
        let (_tx, mut source) = ChannelSource::new(1);
        source.start().unwrap();
        assert!(matches!(source.start(), Err(CollectorError::AlreadyRunning)));
        source.stop();
        assert!(source.start().is_ok());
    }

    #[test]
    fn test_thread_feed_reports_thread_failure_after_buffered_events() {
        let (writer, feed) = thread_feed(4);
        let tap = writer.sender();
        tap.send(SensorEvent::Keyboard(KeyboardEvent::new(true)))
            .unwrap();
        assert!(feed.try_recv().unwrap().is_some());
        assert!(feed.try_recv().unwrap().is_none());

        tap.send(SensorEvent::Keyboard(KeyboardEvent::new(false)))
            .unwrap();
        drop(tap);
        writer.fail(CollectorError::TapCreationFailed);

        assert!(feed.try_recv().unwrap().is_some());
        assert!(matches!(
            feed.try_recv(),
            Err(CollectorError::TapCreationFailed)
        ));
        assert!(matches!(
            feed.try_recv(),
            Err(CollectorError::Disconnected)
        ));
    }

    #[test]
    fn test_thread_feed_clean_exit_is_disconnect() {
        let (writer, feed) = thread_feed(1);
        drop(writer);
        assert!(matches!(
            feed.try_recv(),
            Err(CollectorError::Disconnected)
        ));
    }
}
