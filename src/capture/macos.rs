//! macOS screenshot capture using Quartz window-list images.
//!
//! Requires Screen Recording permission. Without it Quartz returns no
//! image (or only the desktop), which is reported as a capture error.

use crate::capture::types::{CaptureError, CapturedImage, Region, Screenshot, SelectionScope};
use crate::capture::{CaptureTarget, ScreenCapturer};
use core_graphics::display::CGDisplay;
use core_graphics::geometry::{CGPoint, CGRect, CGSize};
use core_graphics::image::CGImage;
use core_graphics::window::{
    copy_window_info, create_image, kCGNullWindowID, kCGWindowImageBoundsIgnoreFraming,
    kCGWindowImageDefault, kCGWindowListOptionIncludingWindow, kCGWindowListOptionOnScreenOnly,
};
use std::path::Path;

/// Captures displays and windows through CGWindowListCreateImage.
#[derive(Debug, Default)]
pub struct QuartzCapturer;

impl QuartzCapturer {
    pub fn new() -> Self {
        Self
    }

    fn display_regions() -> Result<Vec<Region>, CaptureError> {
        let ids = CGDisplay::active_displays().map_err(|_| CaptureError::NoDisplays)?;
        let regions: Vec<Region> = ids
            .into_iter()
            .map(|id| {
                let bounds = CGDisplay::new(id).bounds();
                Region::new(
                    bounds.origin.x,
                    bounds.origin.y,
                    bounds.size.width,
                    bounds.size.height,
                )
            })
            .collect();

        if regions.is_empty() {
            return Err(CaptureError::NoDisplays);
        }
        Ok(regions)
    }

    fn capture_all_screens(&self, target: &CaptureTarget) -> Result<CapturedImage, CaptureError> {
        let regions = Self::display_regions()?;
        let global = Region::enclosing(&regions).ok_or(CaptureError::NoDisplays)?;

        let rect = CGRect::new(
            &CGPoint::new(global.left, global.top),
            &CGSize::new(global.width, global.height),
        );
        let image = create_image(
            rect,
            kCGWindowListOptionOnScreenOnly,
            kCGNullWindowID,
            kCGWindowImageDefault,
        )
        .ok_or(CaptureError::PermissionDenied)?;

        let path = target.path();
        write_png(&image, &path)?;
        Ok(CapturedImage {
            path,
            region: global,
            window_id: None,
        })
    }

    fn capture_window(
        &self,
        window_id: u32,
        target: &CaptureTarget,
    ) -> Result<CapturedImage, CaptureError> {
        // CGRectNull asks Quartz for the window's own bounds
        let null_rect = CGRect::new(
            &CGPoint::new(f64::INFINITY, f64::INFINITY),
            &CGSize::new(0.0, 0.0),
        );
        let image = create_image(
            null_rect,
            kCGWindowListOptionIncludingWindow,
            window_id,
            kCGWindowImageBoundsIgnoreFraming,
        )
        .ok_or(CaptureError::WindowUnavailable(window_id))?;

        let region = Region::new(0.0, 0.0, image.width() as f64, image.height() as f64);
        let path = target.window_path(window_id);
        write_png(&image, &path)?;
        Ok(CapturedImage {
            path,
            region,
            window_id: Some(window_id),
        })
    }
}

impl ScreenCapturer for QuartzCapturer {
    fn capture(
        &self,
        scope: &SelectionScope,
        target: &CaptureTarget,
    ) -> Result<Screenshot, CaptureError> {
        std::fs::create_dir_all(target.dir())?;

        let images = match scope {
            SelectionScope::AllScreens => vec![self.capture_all_screens(target)?],
            SelectionScope::Windows(ids) => {
                let mut images = Vec::with_capacity(ids.len());
                let mut last_error = None;
                for &id in ids {
                    match self.capture_window(id, target) {
                        Ok(image) => images.push(image),
                        Err(e) => {
                            tracing::debug!(window_id = id, error = %e, "window capture failed");
                            last_error = Some(e);
                        }
                    }
                }
                // Partial success is still a usable screenshot
                if images.is_empty() {
                    return Err(last_error.unwrap_or(CaptureError::NoDisplays));
                }
                images
            }
        };

        Ok(Screenshot { images })
    }

    fn scope_available(&self, scope: &SelectionScope) -> bool {
        match scope {
            SelectionScope::AllScreens => true,
            SelectionScope::Windows(ids) => ids.iter().any(|&id| window_exists(id)),
        }
    }
}

/// Whether a window exists at all (visible, minimized, or on another Space).
pub fn window_exists(window_id: u32) -> bool {
    copy_window_info(kCGWindowListOptionIncludingWindow, window_id)
        .map(|windows| windows.len() > 0)
        .unwrap_or(true)
}

/// Encode a BGRA Quartz image as PNG.
fn write_png(image: &CGImage, path: &Path) -> Result<(), CaptureError> {
    let width = image.width();
    let height = image.height();
    let bytes_per_row = image.bytes_per_row();
    let data = image.data();
    let bytes = data.bytes();

    let mut rgba = Vec::with_capacity(width * height * 4);
    for row in 0..height {
        let start = row * bytes_per_row;
        let line = bytes
            .get(start..start + width * 4)
            .ok_or_else(|| CaptureError::Encode("short image buffer".to_string()))?;
        for px in line.chunks_exact(4) {
            rgba.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
        }
    }

    let buffer = image::RgbaImage::from_raw(width as u32, height as u32, rgba)
        .ok_or_else(|| CaptureError::Encode("buffer size mismatch".to_string()))?;
    buffer
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| CaptureError::Encode(e.to_string()))
}
