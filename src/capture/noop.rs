//! Capture backend for platforms without native screenshot support.
//!
//! Every request fails with [`CaptureError::Unsupported`], which the screen
//! observer records as a degraded update.

use crate::capture::types::{CaptureError, Screenshot, SelectionScope};
use crate::capture::{CaptureTarget, ScreenCapturer};

#[derive(Debug, Default)]
pub struct UnsupportedCapturer;

impl UnsupportedCapturer {
    pub fn new() -> Self {
        Self
    }
}

impl ScreenCapturer for UnsupportedCapturer {
    fn capture(
        &self,
        _scope: &SelectionScope,
        _target: &CaptureTarget,
    ) -> Result<Screenshot, CaptureError> {
        Err(CaptureError::Unsupported(std::env::consts::OS.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_capturer_reports_platform() {
        let capturer = UnsupportedCapturer::new();
        let target = CaptureTarget::new(std::env::temp_dir(), "noop");
        let err = capturer
            .capture(&SelectionScope::AllScreens, &target)
            .unwrap_err();
        assert!(err.to_string().contains(std::env::consts::OS));
        assert!(capturer.scope_available(&SelectionScope::AllScreens));
    }
}
