//! Meeting Recorder - capture screen + microphone into a single MP4 file.
//!
//! The crate is sequencing and glue around three external subsystems:
//! screen capture (`scrap`, with an `xcap` screenshot fallback), microphone
//! capture (`cpal`), and container muxing (an `ffmpeg` subprocess). The part
//! with real coordination content is the session lifecycle in [`recorder`].

pub mod capture;
pub mod mux;
pub mod recorder;

use capture::audio::AudioBackend;
use capture::FrameBackend;
use mux::MuxBackend;

/// Which backends are usable, probed once at startup and injected into each
/// session so optional-dependency checks do not scatter through the code.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub frame: FrameBackend,
    pub audio: AudioBackend,
    pub mux: MuxBackend,
}

impl Capabilities {
    /// Probe the display, audio, and mux backends.
    pub fn detect() -> Self {
        let caps = Self {
            frame: capture::detect_frame_backend(),
            audio: capture::audio::detect_backend(),
            mux: mux::detect_backend(),
        };
        tracing::info!(
            "capabilities: frame={:?} audio={:?} mux={:?}",
            caps.frame,
            caps.audio,
            caps.mux
        );
        caps
    }
}
