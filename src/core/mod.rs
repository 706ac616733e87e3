//! Core state machines of a recording run.
//!
//! - Gap-based segmentation of raw input into sessions
//! - The inactivity watchdog
//! - The clock both of them read time from

pub mod clock;
pub mod segmenter;
pub mod watchdog;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use segmenter::{Segmentation, Session, SessionSegmenter};
pub use watchdog::{InactivityWatchdog, DEFAULT_INACTIVITY_MINUTES};
