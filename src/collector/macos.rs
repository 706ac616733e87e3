//! macOS implementation of input collection using a CGEvent tap.
//!
//! Requires Input Monitoring permission. The tap is listen-only: events are
//! observed and passed through unchanged.

use crate::collector::source::{
    thread_feed, CollectorConfig, CollectorError, InputSource, ThreadFeed,
};
use crate::collector::types::{KeyboardEvent, MouseEvent, SensorEvent};
use core_foundation::runloop::{kCFRunLoopCommonModes, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement, CGEventType,
    CallbackResult, EventField,
};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// The macOS event collector using CGEvent tap.
pub struct MacOSCollector {
    config: CollectorConfig,
    feed: Option<ThreadFeed>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl MacOSCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            config,
            feed: None,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl InputSource for MacOSCollector {
    fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }
        if !check_permission() {
            return Err(CollectorError::PermissionDenied);
        }

        self.running.store(true, Ordering::SeqCst);

        // Bounded so a stalled observer cannot grow memory without limit
        let (writer, feed) = thread_feed(10_000);
        let running = self.running.clone();
        let config = self.config.clone();

        let handle = thread::Builder::new()
            .name("input-tap".into())
            .spawn(move || {
                let result = run_event_loop(writer.sender(), running.clone(), config);
                running.store(false, Ordering::SeqCst);
                match result {
                    Ok(()) => drop(writer),
                    Err(e) => {
                        tracing::error!(error = %e, "input event loop failed");
                        writer.fail(e);
                    }
                }
            })
            .map_err(|_| {
                self.running.store(false, Ordering::SeqCst);
                CollectorError::TapCreationFailed
            })?;

        self.feed = Some(feed);
        self.thread_handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            // The run loop wakes every 100ms and sees the flag
            let _ = handle.join();
        }
    }

    fn try_recv(&mut self) -> Result<Option<SensorEvent>, CollectorError> {
        match &self.feed {
            Some(feed) => feed.try_recv(),
            None => Ok(None),
        }
    }
}

impl Drop for MacOSCollector {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_event_types(config: &CollectorConfig) -> Vec<CGEventType> {
    let mut types = Vec::new();

    if config.capture_keyboard {
        types.push(CGEventType::KeyDown);
        types.push(CGEventType::KeyUp);
        types.push(CGEventType::FlagsChanged);
    }

    if config.capture_mouse {
        types.push(CGEventType::MouseMoved);
        types.push(CGEventType::LeftMouseDown);
        types.push(CGEventType::RightMouseDown);
        types.push(CGEventType::LeftMouseDragged);
        types.push(CGEventType::RightMouseDragged);
        types.push(CGEventType::ScrollWheel);
    }

    types
}

fn run_event_loop(
    sender: Sender<SensorEvent>,
    running: Arc<AtomicBool>,
    config: CollectorConfig,
) -> Result<(), CollectorError> {
    let event_types = build_event_types(&config);

    let tap = CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        event_types,
        move |_proxy, event_type, event: &CGEvent| {
            if let Some(sensor_event) = process_cg_event(event_type, event) {
                // Never block the tap callback; a full buffer drops the event
                if sender.try_send(sensor_event).is_err() {
                    tracing::debug!("input buffer full, event dropped");
                }
            }
            CallbackResult::Keep
        },
    )
    .map_err(|_| CollectorError::TapCreationFailed)?;

    let source = tap
        .mach_port()
        .create_runloop_source(0)
        .map_err(|_| CollectorError::RunLoopSourceFailed)?;

    let run_loop = CFRunLoop::get_current();
    unsafe {
        run_loop.add_source(&source, kCFRunLoopCommonModes);
    }

    tap.enable();

    while running.load(Ordering::SeqCst) {
        CFRunLoop::run_in_mode(
            unsafe { kCFRunLoopCommonModes },
            std::time::Duration::from_millis(100),
            false,
        );
    }

    Ok(())
}

/// Convert a CGEvent into a SensorEvent.
///
/// Key codes, characters and absolute coordinates are never read.
fn process_cg_event(event_type: CGEventType, event: &CGEvent) -> Option<SensorEvent> {
    use core_graphics::event::CGEventType::*;

    match event_type {
        KeyDown | FlagsChanged => Some(SensorEvent::Keyboard(KeyboardEvent::new(true))),
        KeyUp => Some(SensorEvent::Keyboard(KeyboardEvent::new(false))),

        MouseMoved | LeftMouseDragged | RightMouseDragged => {
            let delta_x = event.get_double_value_field(EventField::MOUSE_EVENT_DELTA_X);
            let delta_y = event.get_double_value_field(EventField::MOUSE_EVENT_DELTA_Y);
            Some(SensorEvent::Mouse(MouseEvent::movement(delta_x, delta_y)))
        }

        LeftMouseDown => Some(SensorEvent::Mouse(MouseEvent::click(true))),
        RightMouseDown => Some(SensorEvent::Mouse(MouseEvent::click(false))),

        ScrollWheel => {
            let delta_x = event
                .get_double_value_field(EventField::SCROLL_WHEEL_EVENT_POINT_DELTA_AXIS_2);
            let delta_y = event
                .get_double_value_field(EventField::SCROLL_WHEEL_EVENT_POINT_DELTA_AXIS_1);
            Some(SensorEvent::Mouse(MouseEvent::scroll(delta_x, delta_y)))
        }

        _ => None,
    }
}

/// Check if the application has Input Monitoring permission.
///
/// macOS has no direct query; creating a passive tap fails without it.
pub fn check_permission() -> bool {
    CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![CGEventType::KeyDown],
        |_proxy, _type, _event| CallbackResult::Keep,
    )
    .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_creation() {
        let collector = MacOSCollector::new(CollectorConfig::default());
        assert!(!collector.is_running());
    }

    #[test]
    fn test_event_types_follow_config() {
        let keyboard_only = CollectorConfig {
            capture_keyboard: true,
            capture_mouse: false,
        };
        assert_eq!(build_event_types(&keyboard_only).len(), 3);
    }
}
