//! Muxing via an external `ffmpeg` process
//!
//! Combines the raw BGRA video sink and the WAV audio sink into one MP4.
//! The encoder is an opaque collaborator: one invocation is built, fed the
//! intermediate files, and its exit status surfaced.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use thiserror::Error;

const FFMPEG: &str = "ffmpeg";

#[derive(Error, Debug)]
pub enum MuxError {
    /// No encoder binary on PATH.
    #[error("ffmpeg not available: {0}")]
    Unavailable(String),

    /// The encoder ran and failed.
    #[error("ffmpeg failed: {0}")]
    Failed(String),
}

/// Whether an encoder binary is present, probed once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxBackend {
    Present,
    Absent,
}

/// Probe for the encoder binary.
pub fn detect_backend() -> MuxBackend {
    let probe = Command::new(FFMPEG)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match probe {
        Ok(status) if status.success() => MuxBackend::Present,
        _ => {
            tracing::warn!("ffmpeg not found on PATH; recordings will keep raw intermediates");
            MuxBackend::Absent
        }
    }
}

/// Shape of the raw video intermediate, as measured by the capture loop.
#[derive(Debug, Clone)]
pub struct RawVideo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Effective capture rate in frames per wall-clock second.
    pub fps: f64,
    /// Wall-clock capture duration; the muxed output is clamped to it.
    pub duration: Duration,
}

/// Combine video and optional audio into `output`.
///
/// Audio longer than the video is truncated to the video duration, never
/// left to play past end-of-video. Runs to completion or failure; there is
/// no cancellation once started.
pub fn combine(video: &RawVideo, audio: Option<&Path>, output: &Path) -> Result<(), MuxError> {
    let args = build_combine_args(video, audio, output);
    tracing::info!("running ffmpeg {}", args.join(" "));

    let result = Command::new(FFMPEG)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| MuxError::Unavailable(format!("failed to launch ffmpeg: {e}")))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        let reason = stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("unknown error")
            .to_string();
        return Err(MuxError::Failed(format!("{}: {reason}", result.status)));
    }
    Ok(())
}

fn build_combine_args(video: &RawVideo, audio: Option<&Path>, output: &Path) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "bgra".to_string(),
        "-video_size".to_string(),
        format!("{}x{}", video.width, video.height),
        "-framerate".to_string(),
        format!("{:.3}", video.fps),
        "-i".to_string(),
        video.path.to_string_lossy().to_string(),
    ];
    if let Some(audio) = audio {
        args.extend(["-i".to_string(), audio.to_string_lossy().to_string()]);
    }
    // yuv420p needs even dimensions; trim an odd edge row/column.
    let even_w = video.width & !1;
    let even_h = video.height & !1;
    if even_w != video.width || even_h != video.height {
        args.extend(["-vf".to_string(), format!("crop={even_w}:{even_h}:0:0")]);
    }
    args.extend([
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-crf".to_string(),
        "18".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
    ]);
    if audio.is_some() {
        args.extend([
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "192k".to_string(),
        ]);
    }
    // Clamp the output to the video duration so excess audio is dropped.
    args.extend([
        "-t".to_string(),
        format!("{:.3}", video.duration.as_secs_f64()),
    ]);
    args.push(output.to_string_lossy().to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_video() -> RawVideo {
        RawVideo {
            path: PathBuf::from("/tmp/rec.bgra"),
            width: 640,
            height: 480,
            fps: 20.0,
            duration: Duration::from_secs(10),
        }
    }

    #[test]
    fn args_with_audio_clamp_to_video_duration() {
        let args = build_combine_args(
            &test_video(),
            Some(Path::new("/tmp/rec.wav")),
            Path::new("/tmp/rec.mp4"),
        );
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 2);
        assert!(args.contains(&"aac".to_string()));
        let t = args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(args[t + 1], "10.000");
        // The clamp must come after the inputs, as an output option.
        assert!(t > args.iter().rposition(|a| a == "-i").unwrap());
    }

    #[test]
    fn args_without_audio_skip_the_audio_codec() {
        let args = build_combine_args(&test_video(), None, Path::new("/tmp/rec.mp4"));
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 1);
        assert!(!args.contains(&"aac".to_string()));
    }

    #[test]
    fn odd_dimensions_are_cropped_even() {
        let mut video = test_video();
        video.width = 641;
        video.height = 479;
        let args = build_combine_args(&video, None, Path::new("/tmp/rec.mp4"));
        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert_eq!(args[vf + 1], "crop=640:478:0:0");

        let args = build_combine_args(&test_video(), None, Path::new("/tmp/rec.mp4"));
        assert!(!args.contains(&"-vf".to_string()));
    }

    #[test]
    fn args_describe_the_raw_video_layout() {
        let args = build_combine_args(&test_video(), None, Path::new("/tmp/rec.mp4"));
        assert!(args.contains(&"640x480".to_string()));
        assert!(args.contains(&"20.000".to_string()));
        assert!(args.contains(&"bgra".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/rec.mp4");
    }
}
