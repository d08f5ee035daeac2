//! Recording state management
//!
//! The session state machine, status events, and artifact path layout.

use crate::capture::CaptureRegion;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Lifecycle state of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No recording in progress
    #[default]
    Idle,
    /// Currently recording
    Recording,
    /// Stop signalled; the capture loops are winding down
    Stopping,
    /// Loops stopped; muxing the intermediates
    Finalizing,
    /// Recording delivered
    Done,
    /// No output could be produced
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Asynchronous status messages from a session to its control surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum StatusEvent {
    /// Capture is under way
    Started,
    /// Capture finished; finalization running
    Processing,
    /// Terminal: recording delivered at `path` (the muxed MP4, or the raw
    /// video intermediate when muxing was skipped or failed)
    Succeeded { path: PathBuf },
    /// Terminal: nothing could be delivered
    Failed { reason: String },
}

/// Configuration for one recording session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Region to capture; `None` records the primary monitor.
    pub region: Option<CaptureRegion>,

    /// Directory for intermediates and the final artifact; created if absent.
    pub output_dir: PathBuf,

    /// Base name for the artifacts; defaults to a start timestamp.
    pub base_name: Option<String>,

    /// Microphone sample rate in Hz.
    pub sample_rate: u32,

    /// Requested microphone channel count.
    pub channels: u16,
}

impl SessionConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            region: None,
            output_dir: output_dir.into(),
            base_name: None,
            sample_rate: crate::capture::audio::DEFAULT_SAMPLE_RATE,
            channels: 1,
        }
    }
}

/// The up-to-three artifacts of one recording.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    /// Raw BGRA video sink
    pub video: PathBuf,
    /// PCM s16le audio sink
    pub audio: PathBuf,
    /// Final muxed artifact
    pub muxed: PathBuf,
}

impl OutputPaths {
    /// Lay out artifact paths for `base_name` under `dir`.
    pub fn for_base_name(dir: &Path, base_name: &str) -> Self {
        Self {
            video: dir.join(format!("{base_name}.bgra")),
            audio: dir.join(format!("{base_name}.wav")),
            muxed: dir.join(format!("{base_name}.mp4")),
        }
    }

    /// Artifact paths named after the recording start time.
    pub fn timestamped(dir: &Path) -> Self {
        let base_name = Local::now()
            .format("Recording_%Y-%m-%d_%H-%M-%S")
            .to_string();
        Self::for_base_name(dir, &base_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(SessionState::Done.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Idle.is_terminal());
        assert!(!SessionState::Recording.is_terminal());
        assert!(!SessionState::Stopping.is_terminal());
        assert!(!SessionState::Finalizing.is_terminal());
    }

    #[test]
    fn default_state_is_idle() {
        assert_eq!(SessionState::default(), SessionState::Idle);
    }

    #[test]
    fn artifacts_share_a_base_name() {
        let paths = OutputPaths::for_base_name(Path::new("recordings"), "meeting");
        assert_eq!(paths.video, Path::new("recordings/meeting.bgra"));
        assert_eq!(paths.audio, Path::new("recordings/meeting.wav"));
        assert_eq!(paths.muxed, Path::new("recordings/meeting.mp4"));
    }

    #[test]
    fn timestamped_names_carry_the_prefix() {
        let paths = OutputPaths::timestamped(Path::new("recordings"));
        let name = paths.muxed.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("Recording_"));
        assert!(name.ends_with(".mp4"));
    }
}
