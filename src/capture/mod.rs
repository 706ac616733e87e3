//! Screenshot capture.
//!
//! The screen observer asks a [`ScreenCapturer`] for "before" and "after"
//! images around each interaction session. Backends are blocking; the
//! observer runs them off the async executor.

pub mod types;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(not(target_os = "macos"))]
pub mod noop;

use std::path::{Path, PathBuf};

pub use types::{CaptureError, CapturePhase, CapturedImage, Region, Screenshot, SelectionScope};

#[cfg(target_os = "macos")]
pub use macos::QuartzCapturer;

/// Platform-agnostic capturer type alias
#[cfg(target_os = "macos")]
pub type PlatformCapturer = QuartzCapturer;

#[cfg(not(target_os = "macos"))]
pub use noop::UnsupportedCapturer;

/// Platform-agnostic capturer type alias
#[cfg(not(target_os = "macos"))]
pub type PlatformCapturer = UnsupportedCapturer;

/// A backend able to grab the selection scope as image files.
pub trait ScreenCapturer: Send + Sync {
    /// Capture `scope`, writing images under `target`.
    fn capture(
        &self,
        scope: &SelectionScope,
        target: &CaptureTarget,
    ) -> Result<Screenshot, CaptureError>;

    /// Whether anything in the scope can still be captured.
    ///
    /// Backends that cannot tell report `true`.
    fn scope_available(&self, _scope: &SelectionScope) -> bool {
        true
    }
}

/// Where a capture writes its image files.
#[derive(Debug, Clone)]
pub struct CaptureTarget {
    pub dir: PathBuf,
    pub stem: String,
}

impl CaptureTarget {
    pub fn new(dir: impl Into<PathBuf>, stem: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.into(),
        }
    }

    /// Path for the whole-scope image.
    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.png", self.stem))
    }

    /// Path for a single window's image.
    pub fn window_path(&self, window_id: u32) -> PathBuf {
        self.dir.join(format!("{}_w{window_id}.png", self.stem))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_target_paths() {
        let target = CaptureTarget::new("/tmp/shots", "20240101_abcd_before");
        assert_eq!(
            target.path(),
            PathBuf::from("/tmp/shots/20240101_abcd_before.png")
        );
        assert_eq!(
            target.window_path(12),
            PathBuf::from("/tmp/shots/20240101_abcd_before_w12.png")
        );
    }
}
