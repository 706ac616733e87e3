//! Input event types consumed by the session segmenter.
//!
//! Keyboard events carry timing only. Mouse events carry the kind of
//! interaction plus movement and scroll magnitudes, never coordinates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which physical device produced an event. Sessions are tracked per device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Keyboard,
    Mouse,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Keyboard => write!(f, "keyboard"),
            DeviceKind::Mouse => write!(f, "mouse"),
        }
    }
}

/// A keyboard event capturing only timing information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyboardEvent {
    /// Timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
    /// Whether this is a key press (true) or release (false)
    pub is_key_down: bool,
}

impl KeyboardEvent {
    pub fn new(is_key_down: bool) -> Self {
        Self::at(Utc::now(), is_key_down)
    }

    /// Build an event with an explicit timestamp (replay and tests).
    pub fn at(timestamp: DateTime<Utc>, is_key_down: bool) -> Self {
        Self {
            timestamp,
            is_key_down,
        }
    }
}

/// Mouse event type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseEventType {
    /// Mouse movement
    Move,
    /// Left button click
    LeftClick,
    /// Right button click
    RightClick,
    /// Scroll event
    Scroll,
}

/// Scroll direction (no exact amounts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

/// Bucketed scroll magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollMagnitude {
    Small,  // < 3 lines
    Medium, // 3-10 lines
    Large,  // > 10 lines
}

/// A mouse event capturing timing and magnitude information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MouseEvent {
    /// Timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
    /// Type of mouse event
    pub event_type: MouseEventType,
    /// Movement magnitude, only set for Move events
    pub delta_magnitude: Option<f64>,
    /// Scroll direction, only set for Scroll events
    pub scroll_direction: Option<ScrollDirection>,
    /// Scroll magnitude bucket
    pub scroll_magnitude: Option<ScrollMagnitude>,
}

impl MouseEvent {
    /// Create a new mouse move event with delta magnitude.
    pub fn movement(delta_x: f64, delta_y: f64) -> Self {
        Self::movement_at(Utc::now(), delta_x, delta_y)
    }

    pub fn movement_at(timestamp: DateTime<Utc>, delta_x: f64, delta_y: f64) -> Self {
        let magnitude = (delta_x * delta_x + delta_y * delta_y).sqrt();
        Self {
            timestamp,
            event_type: MouseEventType::Move,
            delta_magnitude: Some(magnitude),
            scroll_direction: None,
            scroll_magnitude: None,
        }
    }

    /// Create a new click event.
    pub fn click(is_left: bool) -> Self {
        Self::click_at(Utc::now(), is_left)
    }

    pub fn click_at(timestamp: DateTime<Utc>, is_left: bool) -> Self {
        Self {
            timestamp,
            event_type: if is_left {
                MouseEventType::LeftClick
            } else {
                MouseEventType::RightClick
            },
            delta_magnitude: None,
            scroll_direction: None,
            scroll_magnitude: None,
        }
    }

    /// Create a new scroll event.
    pub fn scroll(delta_x: f64, delta_y: f64) -> Self {
        Self::scroll_at(Utc::now(), delta_x, delta_y)
    }

    pub fn scroll_at(timestamp: DateTime<Utc>, delta_x: f64, delta_y: f64) -> Self {
        let direction = if delta_y.abs() > delta_x.abs() {
            if delta_y > 0.0 {
                ScrollDirection::Down
            } else {
                ScrollDirection::Up
            }
        } else if delta_x > 0.0 {
            ScrollDirection::Right
        } else {
            ScrollDirection::Left
        };

        let total = (delta_x.abs() + delta_y.abs()) as i32;
        let magnitude = if total < 3 {
            ScrollMagnitude::Small
        } else if total <= 10 {
            ScrollMagnitude::Medium
        } else {
            ScrollMagnitude::Large
        };

        Self {
            timestamp,
            event_type: MouseEventType::Scroll,
            delta_magnitude: None,
            scroll_direction: Some(direction),
            scroll_magnitude: Some(magnitude),
        }
    }

    pub fn is_click(&self) -> bool {
        matches!(
            self.event_type,
            MouseEventType::LeftClick | MouseEventType::RightClick
        )
    }
}

/// Unified raw input event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SensorEvent {
    Keyboard(KeyboardEvent),
    Mouse(MouseEvent),
}

impl SensorEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            SensorEvent::Keyboard(e) => e.timestamp,
            SensorEvent::Mouse(e) => e.timestamp,
        }
    }

    pub fn device_kind(&self) -> DeviceKind {
        match self {
            SensorEvent::Keyboard(_) => DeviceKind::Keyboard,
            SensorEvent::Mouse(_) => DeviceKind::Mouse,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyboard_event_creation() {
        let event = KeyboardEvent::new(true);
        assert!(event.is_key_down);
        assert_eq!(
            SensorEvent::Keyboard(event).device_kind(),
            DeviceKind::Keyboard
        );
    }

    #[test]
    fn test_mouse_movement_magnitude() {
        let event = MouseEvent::movement(3.0, 4.0);
        assert_eq!(event.event_type, MouseEventType::Move);
        assert!((event.delta_magnitude.unwrap() - 5.0).abs() < 0.001);
        assert!(!event.is_click());
    }

    #[test]
    fn test_scroll_bucketing() {
        let small = MouseEvent::scroll(0.0, 2.0);
        assert_eq!(small.scroll_magnitude, Some(ScrollMagnitude::Small));
        assert_eq!(small.scroll_direction, Some(ScrollDirection::Down));

        let medium = MouseEvent::scroll(0.0, -5.0);
        assert_eq!(medium.scroll_magnitude, Some(ScrollMagnitude::Medium));
        assert_eq!(medium.scroll_direction, Some(ScrollDirection::Up));

        let large = MouseEvent::scroll(15.0, 0.0);
        assert_eq!(large.scroll_magnitude, Some(ScrollMagnitude::Large));
        assert_eq!(large.scroll_direction, Some(ScrollDirection::Right));
    }

    #[test]
    fn test_explicit_timestamps_are_kept() {
        let at = Utc::now() - chrono::Duration::seconds(30);
        let event = SensorEvent::Mouse(MouseEvent::click_at(at, false));
        assert_eq!(event.timestamp(), at);
        assert_eq!(event.device_kind(), DeviceKind::Mouse);
    }
}
