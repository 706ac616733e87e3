//! Screenshot capture types shared by every capture backend.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Which windows or screens are eligible for capture.
///
/// Produced once by the window-selection step before a run starts and
/// treated as read-only for the rest of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "ids", rename_all = "snake_case")]
pub enum SelectionScope {
    AllScreens,
    Windows(BTreeSet<u32>),
}

impl SelectionScope {
    /// Parse a comma-separated list of window ids; empty means all screens.
    pub fn from_csv(s: &str) -> Result<Self, CaptureError> {
        let ids = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|_| CaptureError::InvalidScope(format!("bad window id '{part}'")))
            })
            .collect::<Result<BTreeSet<u32>, _>>()?;

        if ids.is_empty() {
            Ok(SelectionScope::AllScreens)
        } else {
            Ok(SelectionScope::Windows(ids))
        }
    }

    pub fn window_ids(&self) -> Option<&BTreeSet<u32>> {
        match self {
            SelectionScope::AllScreens => None,
            SelectionScope::Windows(ids) => Some(ids),
        }
    }
}

impl std::fmt::Display for SelectionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionScope::AllScreens => write!(f, "all screens"),
            SelectionScope::Windows(ids) => {
                let ids: Vec<String> = ids.iter().map(u32::to_string).collect();
                write!(f, "windows [{}]", ids.join(", "))
            }
        }
    }
}

/// A rectangle in screen coordinates (origin top-left).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Region {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Smallest region enclosing both.
    pub fn union(&self, other: &Region) -> Region {
        let left = self.left.min(other.left);
        let top = self.top.min(other.top);
        Region::new(
            left,
            top,
            self.right().max(other.right()) - left,
            self.bottom().max(other.bottom()) - top,
        )
    }

    /// Intersection with `bounds`; empty when they do not overlap.
    pub fn clamp_to(&self, bounds: &Region) -> Region {
        let left = self.left.max(bounds.left);
        let top = self.top.max(bounds.top);
        let right = self.right().min(bounds.right());
        let bottom = self.bottom().min(bounds.bottom());
        Region::new(left, top, (right - left).max(0.0), (bottom - top).max(0.0))
    }

    /// Bounding box of all displays.
    pub fn enclosing<'a>(regions: impl IntoIterator<Item = &'a Region>) -> Option<Region> {
        regions.into_iter().fold(None, |acc, r| match acc {
            None => Some(*r),
            Some(acc) => Some(acc.union(r)),
        })
    }
}

/// Whether a screenshot opens or closes a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapturePhase {
    Before,
    After,
}

impl std::fmt::Display for CapturePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapturePhase::Before => write!(f, "before"),
            CapturePhase::After => write!(f, "after"),
        }
    }
}

/// One image written to disk by a capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedImage {
    pub path: PathBuf,
    pub region: Region,
    /// Set when the image is a single window
    pub window_id: Option<u32>,
}

/// The result of one capture request over the selection scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screenshot {
    pub images: Vec<CapturedImage>,
}

impl Screenshot {
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.images.iter().map(|i| i.path.as_path())
    }
}

/// Errors from a single capture attempt.
#[derive(Debug, Clone)]
pub enum CaptureError {
    PermissionDenied,
    Unsupported(String),
    NoDisplays,
    WindowUnavailable(u32),
    InvalidScope(String),
    Io(String),
    Encode(String),
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::PermissionDenied => {
                write!(f, "Screen Recording permission not granted")
            }
            CaptureError::Unsupported(msg) => write!(f, "Screen capture unsupported: {msg}"),
            CaptureError::NoDisplays => write!(f, "No active displays found"),
            CaptureError::WindowUnavailable(id) => write!(f, "Window {id} could not be captured"),
            CaptureError::InvalidScope(msg) => write!(f, "Invalid selection scope: {msg}"),
            CaptureError::Io(msg) => write!(f, "Screenshot IO error: {msg}"),
            CaptureError::Encode(msg) => write!(f, "Screenshot encoding error: {msg}"),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<std::io::Error> for CaptureError {
    fn from(e: std::io::Error) -> Self {
        CaptureError::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_parsing() {
        assert_eq!(
            SelectionScope::from_csv("").unwrap(),
            SelectionScope::AllScreens
        );
        let scope = SelectionScope::from_csv("42, 7,42").unwrap();
        assert_eq!(scope.window_ids().map(|ids| ids.len()), Some(2));
        assert_eq!(scope.to_string(), "windows [7, 42]");
        assert!(SelectionScope::from_csv("7,abc").is_err());
    }

    #[test]
    fn test_region_union_and_clamp() {
        let main = Region::new(0.0, 0.0, 1440.0, 900.0);
        let side = Region::new(1440.0, -200.0, 1920.0, 1080.0);
        let global = Region::enclosing([&main, &side]).unwrap();
        assert_eq!(global, Region::new(0.0, -200.0, 3360.0, 1100.0));

        let window = Region::new(-100.0, 50.0, 400.0, 300.0);
        let clamped = window.clamp_to(&main);
        assert_eq!(clamped, Region::new(0.0, 50.0, 300.0, 300.0));

        let off_screen = Region::new(5000.0, 5000.0, 10.0, 10.0);
        assert!(off_screen.clamp_to(&main).is_empty());
        assert!(Region::enclosing(std::iter::empty()).is_none());
    }

    #[test]
    fn test_scope_serializes_tagged() {
        let json = serde_json::to_value(SelectionScope::AllScreens).unwrap();
        assert_eq!(json["type"], "all_screens");
    }
}
