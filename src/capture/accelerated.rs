//! Accelerated region capture backed by display duplication
//!
//! Wraps `scrap`'s capturer for the primary display and crops each frame to
//! the requested region. The backend hands frames back without blocking, so
//! a grab polls for a new frame up to a bounded wait and returns `None` when
//! it expires.

use super::traits::{crop_packed, CaptureError, CaptureRegion, FrameSource, PixelLayout, RawFrame};
use scrap::{Capturer, Display};
use std::io::ErrorKind;
use std::time::{Duration, Instant};

/// Upper bound on one grab call.
const GRAB_WAIT: Duration = Duration::from_millis(100);

/// Poll interval while waiting for the backend to publish a frame.
const FRAME_POLL: Duration = Duration::from_millis(5);

/// Display-duplication frame source.
pub struct AcceleratedSource {
    capturer: Capturer,
    region: CaptureRegion,
    display_height: usize,
}

impl AcceleratedSource {
    /// Attach to the primary display.
    ///
    /// The duplication backend only exposes the primary display surface, so
    /// a region outside it reports `Unavailable` and the caller degrades to
    /// screenshot capture.
    pub fn open(region: CaptureRegion) -> Result<Self, CaptureError> {
        let display = Display::primary()
            .map_err(|e| CaptureError::Unavailable(format!("no primary display: {e}")))?;
        let display_w = display.width() as i64;
        let display_h = display.height() as i64;
        if region.left < 0
            || region.top < 0
            || region.right() > display_w
            || region.bottom() > display_h
        {
            return Err(CaptureError::Unavailable(format!(
                "region {}x{} at ({},{}) outside primary display {display_w}x{display_h}",
                region.width, region.height, region.left, region.top
            )));
        }
        let capturer = Capturer::new(display)
            .map_err(|e| CaptureError::Unavailable(format!("cannot attach capturer: {e}")))?;
        tracing::debug!(
            "accelerated capture attached to primary display ({display_w}x{display_h})"
        );
        Ok(Self {
            capturer,
            region,
            display_height: display_h as usize,
        })
    }
}

impl FrameSource for AcceleratedSource {
    fn grab(&mut self) -> Result<Option<RawFrame>, CaptureError> {
        let height = self.display_height;
        let region = self.region;
        let deadline = Instant::now() + GRAB_WAIT;
        loop {
            match self.capturer.frame() {
                Ok(frame) => {
                    // Rows may carry padding; derive the real stride.
                    let stride = frame.len() / height;
                    let data = crop_packed(
                        &frame,
                        stride,
                        region.left as usize,
                        region.top as usize,
                        region.width as usize,
                        region.height as usize,
                    );
                    return Ok(Some(RawFrame {
                        width: region.width,
                        height: region.height,
                        layout: PixelLayout::Bgra,
                        data,
                    }));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    std::thread::sleep(FRAME_POLL);
                }
                Err(e) => return Err(CaptureError::Backend(e.to_string())),
            }
        }
    }

    fn region(&self) -> CaptureRegion {
        self.region
    }
}
