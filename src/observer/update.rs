//! Updates: the unit of data handed from an observer to the aggregator.

use crate::capture::{CapturePhase, CapturedImage};
use crate::collector::types::{DeviceKind, MouseEventType, ScrollDirection, ScrollMagnitude};
use crate::core::segmenter::Session;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tag distinguishing the kinds of update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateKind {
    Screenshot,
    KeyboardSession,
    MouseSession,
    MouseEvent,
    ScrollEvent,
    CaptureError,
    Lifecycle,
}

impl UpdateKind {
    pub const ALL: [UpdateKind; 7] = [
        UpdateKind::Screenshot,
        UpdateKind::KeyboardSession,
        UpdateKind::MouseSession,
        UpdateKind::MouseEvent,
        UpdateKind::ScrollEvent,
        UpdateKind::CaptureError,
        UpdateKind::Lifecycle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateKind::Screenshot => "screenshot",
            UpdateKind::KeyboardSession => "keyboard-session",
            UpdateKind::MouseSession => "mouse-session",
            UpdateKind::MouseEvent => "mouse-event",
            UpdateKind::ScrollEvent => "scroll-event",
            UpdateKind::CaptureError => "capture-error",
            UpdateKind::Lifecycle => "lifecycle",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a recording run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    UserCancelled,
    InactivityTimeout,
    WindowClosed,
    /// Every observer finished on its own
    Completed,
    CaptureFailure,
    StorageFailure,
    ObserverFailure,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::UserCancelled => "user-cancelled",
            StopReason::InactivityTimeout => "inactivity-timeout",
            StopReason::WindowClosed => "window-closed",
            StopReason::Completed => "completed",
            StopReason::CaptureFailure => "capture-failure",
            StopReason::StorageFailure => "storage-failure",
            StopReason::ObserverFailure => "observer-failure",
        }
    }

    /// Fatal stops end the run because something broke.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StopReason::CaptureFailure | StopReason::StorageFailure | StopReason::ObserverFailure
        )
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Started,
    Stopped,
}

/// Kind-specific update data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdatePayload {
    Screenshot {
        session_id: Uuid,
        device_kind: DeviceKind,
        phase: CapturePhase,
        images: Vec<CapturedImage>,
    },
    /// A closed session summary
    Session(Session),
    Pointer {
        session_id: Option<Uuid>,
        at: DateTime<Utc>,
        button: MouseEventType,
    },
    Scroll {
        session_id: Option<Uuid>,
        at: DateTime<Utc>,
        direction: Option<ScrollDirection>,
        magnitude: Option<ScrollMagnitude>,
    },
    CaptureFailed {
        session_id: Uuid,
        phase: CapturePhase,
        error: String,
        consecutive_failures: u32,
    },
    Lifecycle {
        phase: LifecyclePhase,
        reason: Option<StopReason>,
        detail: Option<String>,
    },
}

impl UpdatePayload {
    pub fn kind(&self) -> UpdateKind {
        match self {
            UpdatePayload::Screenshot { .. } => UpdateKind::Screenshot,
            UpdatePayload::Session(session) => match session.device_kind {
                DeviceKind::Keyboard => UpdateKind::KeyboardSession,
                DeviceKind::Mouse => UpdateKind::MouseSession,
            },
            UpdatePayload::Pointer { .. } => UpdateKind::MouseEvent,
            UpdatePayload::Scroll { .. } => UpdateKind::ScrollEvent,
            UpdatePayload::CaptureFailed { .. } => UpdateKind::CaptureError,
            UpdatePayload::Lifecycle { .. } => UpdateKind::Lifecycle,
        }
    }

    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            UpdatePayload::Screenshot { session_id, .. }
            | UpdatePayload::CaptureFailed { session_id, .. } => Some(*session_id),
            UpdatePayload::Session(session) => Some(session.session_id),
            UpdatePayload::Pointer { session_id, .. } | UpdatePayload::Scroll { session_id, .. } => {
                *session_id
            }
            UpdatePayload::Lifecycle { .. } => None,
        }
    }
}

/// One unit of observed activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub source_id: String,
    pub kind: UpdateKind,
    /// Emission time; non-decreasing within one source
    pub occurred_at: DateTime<Utc>,
    pub payload: UpdatePayload,
}

impl Update {
    pub fn new(
        source_id: impl Into<String>,
        occurred_at: DateTime<Utc>,
        payload: UpdatePayload,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            kind: payload.kind(),
            occurred_at,
            payload,
        }
    }

    /// The stop reason carried by a lifecycle stop update.
    pub fn stop_reason(&self) -> Option<StopReason> {
        match &self.payload {
            UpdatePayload::Lifecycle {
                phase: LifecyclePhase::Stopped,
                reason,
                ..
            } => *reason,
            _ => None,
        }
    }

    /// Image files referenced by a screenshot update.
    pub fn image_paths(&self) -> Vec<std::path::PathBuf> {
        match &self.payload {
            UpdatePayload::Screenshot { images, .. } => {
                images.iter().map(|i| i.path.clone()).collect()
            }
            _ => Vec::new(),
        }
    }
}
