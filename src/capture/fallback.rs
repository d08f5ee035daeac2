//! Whole-monitor screenshot capture
//!
//! Slow path used when display duplication cannot attach: shoot the monitor
//! hosting the region and crop client-side. One screenshot is one bounded
//! synchronous call, so stop checks run between grabs.

use super::traits::{
    crop_packed, CaptureError, CaptureRegion, FrameSource, MonitorInfo, PixelLayout, RawFrame,
};
use xcap::Monitor;

/// Enumerate the available monitors.
pub fn monitors() -> Result<Vec<MonitorInfo>, CaptureError> {
    let monitors = Monitor::all()
        .map_err(|e| CaptureError::Unavailable(format!("cannot enumerate monitors: {e}")))?;
    Ok(monitors
        .iter()
        .map(|m| MonitorInfo {
            id: m.id(),
            name: m.name().to_string(),
            left: m.x(),
            top: m.y(),
            width: m.width(),
            height: m.height(),
            is_primary: m.is_primary(),
        })
        .collect())
}

/// Screenshot-based frame source.
pub struct ScreenshotSource {
    monitor_id: u32,
    monitor_origin: (i32, i32),
    region: CaptureRegion,
}

impl ScreenshotSource {
    /// Resolve the monitor hosting the region's origin.
    ///
    /// Only the monitor id is kept; the handle is re-resolved per grab so a
    /// display reconfiguration surfaces as a grab error instead of a stale
    /// handle.
    pub fn open(region: CaptureRegion) -> Result<Self, CaptureError> {
        let all = monitors()?;
        let monitor = all
            .iter()
            .find(|m| {
                m.left <= region.left
                    && (region.left as i64) < m.left as i64 + m.width as i64
                    && m.top <= region.top
                    && (region.top as i64) < m.top as i64 + m.height as i64
            })
            .or_else(|| all.iter().find(|m| m.is_primary))
            .or_else(|| all.first())
            .ok_or_else(|| CaptureError::Unavailable("no monitors found".to_string()))?;
        if region.left < monitor.left
            || region.top < monitor.top
            || region.right() > monitor.left as i64 + monitor.width as i64
            || region.bottom() > monitor.top as i64 + monitor.height as i64
        {
            return Err(CaptureError::InvalidRegion(format!(
                "region {}x{} at ({},{}) extends past monitor \"{}\"",
                region.width, region.height, region.left, region.top, monitor.name
            )));
        }
        tracing::debug!(
            "screenshot capture bound to monitor \"{}\" ({}x{})",
            monitor.name,
            monitor.width,
            monitor.height
        );
        Ok(Self {
            monitor_id: monitor.id,
            monitor_origin: (monitor.left, monitor.top),
            region,
        })
    }
}

impl FrameSource for ScreenshotSource {
    fn grab(&mut self) -> Result<Option<RawFrame>, CaptureError> {
        let monitor = Monitor::all()
            .map_err(|e| CaptureError::Backend(e.to_string()))?
            .into_iter()
            .find(|m| m.id() == self.monitor_id)
            .ok_or_else(|| {
                CaptureError::Backend(format!("monitor {} disappeared", self.monitor_id))
            })?;
        let image = monitor
            .capture_image()
            .map_err(|e| CaptureError::Backend(e.to_string()))?;
        let img_w = image.width() as usize;
        let img_h = image.height() as usize;
        let x = (self.region.left - self.monitor_origin.0) as usize;
        let y = (self.region.top - self.monitor_origin.1) as usize;
        let width = self.region.width as usize;
        let height = self.region.height as usize;
        if x + width > img_w || y + height > img_h {
            return Err(CaptureError::Backend(format!(
                "screenshot is {img_w}x{img_h}, too small for the requested region"
            )));
        }
        let data = crop_packed(&image.into_raw(), img_w * 4, x, y, width, height);
        Ok(Some(RawFrame {
            width: self.region.width,
            height: self.region.height,
            layout: PixelLayout::Rgba,
            data,
        }))
    }

    fn region(&self) -> CaptureRegion {
        self.region
    }
}
