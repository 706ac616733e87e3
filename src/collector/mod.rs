//! Input event collection.
//!
//! Platform collectors capture keyboard and mouse activity and expose it
//! through the [`InputSource`] trait polled by the screen observer.

pub mod source;
pub mod types;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(not(target_os = "macos"))]
pub mod noop;

pub use source::{ChannelSource, CollectorConfig, CollectorError, InputSource};
pub use types::{
    DeviceKind, KeyboardEvent, MouseEvent, MouseEventType, ScrollDirection, ScrollMagnitude,
    SensorEvent,
};

#[cfg(target_os = "macos")]
pub use macos::{check_permission, MacOSCollector};

/// Platform-agnostic collector type alias
#[cfg(target_os = "macos")]
pub type Collector = MacOSCollector;

#[cfg(not(target_os = "macos"))]
pub use noop::{check_permission, NoopCollector};

/// Platform-agnostic collector type alias
#[cfg(not(target_os = "macos"))]
pub type Collector = NoopCollector;
