//! Capture trait definitions
//!
//! Backend-agnostic types for frame capture sources.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the frame capture backends.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The backend cannot attach to the display.
    #[error("capture unavailable: {0}")]
    Unavailable(String),

    #[error("invalid capture region: {0}")]
    InvalidRegion(String),

    /// A backend that was attached stopped producing frames.
    #[error("capture backend error: {0}")]
    Backend(String),
}

/// A rectangular pixel area of the display to capture.
///
/// Coordinates are global screen pixels; the origin may be negative on
/// multi-monitor setups. Immutable once a recording starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRegion {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRegion {
    /// Validate and build a region. Width and height must be non-zero.
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Result<Self, CaptureError> {
        if width == 0 || height == 0 {
            return Err(CaptureError::InvalidRegion(format!(
                "region must have non-zero size, got {width}x{height}"
            )));
        }
        Ok(Self {
            left,
            top,
            width,
            height,
        })
    }

    /// Exclusive right edge in screen coordinates.
    pub fn right(&self) -> i64 {
        self.left as i64 + self.width as i64
    }

    /// Exclusive bottom edge in screen coordinates.
    pub fn bottom(&self) -> i64 {
        self.top as i64 + self.height as i64
    }

    /// Byte length of one frame of this region in a 4-byte-per-pixel layout.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Information about a display/monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorInfo {
    /// Unique monitor ID
    pub id: u32,

    /// Monitor name
    pub name: String,

    /// Left edge in screen coordinates
    pub left: i32,

    /// Top edge in screen coordinates
    pub top: i32,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Whether this is the primary monitor
    pub is_primary: bool,
}

impl MonitorInfo {
    /// The full bounds of this monitor as a capture region.
    pub fn region(&self) -> CaptureRegion {
        CaptureRegion {
            left: self.left,
            top: self.top,
            width: self.width,
            height: self.height,
        }
    }
}

/// Pixel layout of a captured frame. Four bytes per pixel either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Bgra,
    Rgba,
}

/// One captured image of the target region.
#[derive(Debug)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Consume the frame, returning packed BGRA bytes.
    pub fn into_bgra(self) -> Vec<u8> {
        match self.layout {
            PixelLayout::Bgra => self.data,
            PixelLayout::Rgba => {
                let mut data = self.data;
                for px in data.chunks_exact_mut(4) {
                    px.swap(0, 2);
                }
                data
            }
        }
    }
}

/// A source of frames for one capture region.
///
/// `grab` must never block longer than a bounded interval; `None` means the
/// wait expired without a new frame, letting the caller re-check its stop
/// flag. The underlying display handle is released on drop.
pub trait FrameSource {
    fn grab(&mut self) -> Result<Option<RawFrame>, CaptureError>;

    fn region(&self) -> CaptureRegion;
}

/// Copy a `width`x`height` rectangle at (`x`, `y`) out of a packed
/// 4-byte-per-pixel buffer. `stride` is the source row length in bytes,
/// which may exceed `row width * 4` when the backend pads rows.
pub(crate) fn crop_packed(
    src: &[u8],
    stride: usize,
    x: usize,
    y: usize,
    width: usize,
    height: usize,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(width * height * 4);
    for row in y..y + height {
        let start = row * stride + x * 4;
        out.extend_from_slice(&src[start..start + width * 4]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_rejects_zero_size() {
        assert!(CaptureRegion::new(0, 0, 0, 480).is_err());
        assert!(CaptureRegion::new(0, 0, 640, 0).is_err());
        assert!(CaptureRegion::new(-100, -100, 640, 480).is_ok());
    }

    #[test]
    fn region_edges_and_frame_len() {
        let region = CaptureRegion::new(10, 20, 640, 480).unwrap();
        assert_eq!(region.right(), 650);
        assert_eq!(region.bottom(), 500);
        assert_eq!(region.frame_len(), 640 * 480 * 4);
    }

    #[test]
    fn rgba_frame_converts_to_bgra() {
        let frame = RawFrame {
            width: 2,
            height: 1,
            layout: PixelLayout::Rgba,
            data: vec![1, 2, 3, 4, 5, 6, 7, 8],
        };
        assert_eq!(frame.into_bgra(), vec![3, 2, 1, 4, 7, 6, 5, 8]);
    }

    #[test]
    fn bgra_frame_passes_through() {
        let data = vec![9, 8, 7, 6];
        let frame = RawFrame {
            width: 1,
            height: 1,
            layout: PixelLayout::Bgra,
            data: data.clone(),
        };
        assert_eq!(frame.into_bgra(), data);
    }

    #[test]
    fn crop_extracts_the_requested_rectangle() {
        // 3x2 pixels, bytes counting up.
        let src: Vec<u8> = (0..24).collect();
        let cropped = crop_packed(&src, 12, 1, 0, 2, 2);
        assert_eq!(
            cropped,
            vec![4, 5, 6, 7, 8, 9, 10, 11, 16, 17, 18, 19, 20, 21, 22, 23]
        );
    }

    #[test]
    fn crop_honors_padded_stride() {
        // One 2-pixel row padded to 12 bytes.
        let src: Vec<u8> = (0..12).collect();
        let cropped = crop_packed(&src, 12, 1, 0, 1, 1);
        assert_eq!(cropped, vec![4, 5, 6, 7]);
    }
}
