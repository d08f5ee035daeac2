//! Capture backends
//!
//! Frame capture (accelerated duplication with a screenshot fallback),
//! microphone capture, and the monitor enumeration contract used by the
//! control surface.

pub mod accelerated;
pub mod audio;
pub mod fallback;
pub mod traits;

pub use fallback::monitors;
pub use traits::{CaptureError, CaptureRegion, FrameSource, MonitorInfo, PixelLayout, RawFrame};

use accelerated::AcceleratedSource;
use fallback::ScreenshotSource;

/// Frame backend selected once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameBackend {
    /// Display-duplication capture, cropped to the region.
    Accelerated,
    /// Whole-monitor screenshots, cropped client-side.
    Fallback,
}

/// Probe which frame backend can attach to the display.
pub fn detect_frame_backend() -> FrameBackend {
    match scrap::Display::primary() {
        Ok(_) => FrameBackend::Accelerated,
        Err(e) => {
            tracing::warn!("accelerated capture unavailable ({e}); using screenshot fallback");
            FrameBackend::Fallback
        }
    }
}

/// Open a frame source for `region`.
///
/// An accelerated backend that cannot attach degrades to the screenshot
/// backend; only a region no backend can serve is an error.
pub fn open_frame_source(
    region: CaptureRegion,
    backend: FrameBackend,
) -> Result<Box<dyn FrameSource>, CaptureError> {
    if backend == FrameBackend::Accelerated {
        match AcceleratedSource::open(region) {
            Ok(source) => return Ok(Box::new(source)),
            Err(e) => {
                tracing::warn!("accelerated capture failed to open ({e}); falling back to screenshots");
            }
        }
    }
    Ok(Box::new(ScreenshotSource::open(region)?))
}

/// Full bounds of the primary monitor, for sessions started without a region.
pub fn primary_region() -> Result<CaptureRegion, CaptureError> {
    let all = monitors()?;
    all.iter()
        .find(|m| m.is_primary)
        .or_else(|| all.first())
        .map(MonitorInfo::region)
        .ok_or_else(|| CaptureError::Unavailable("no monitors found".to_string()))
}
