//! Microphone capture
//!
//! Streams PCM from the default input device to a WAV sink on a dedicated
//! thread. The device callback feeds fixed-size sample blocks into a bounded
//! queue; the writer side appends each block to the sink as it arrives, so
//! nothing is held in memory for the whole recording. A rejected channel
//! count is retried once with mono.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, StreamConfig};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use hound::{WavSpec, WavWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Default microphone sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// How many callback blocks may queue before new ones are dropped.
const QUEUE_BLOCKS: usize = 64;

/// Bounded wait on the queue, so the stop flag is observed sub-second.
const DRAIN_WAIT: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("no audio input device available")]
    NoDevice,

    #[error("audio device error: {0}")]
    Device(String),

    #[error("audio sink error: {0}")]
    Sink(#[from] hound::Error),
}

/// Whether an input device is present, probed once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioBackend {
    Present,
    Absent,
}

/// Probe for a usable input device.
pub fn detect_backend() -> AudioBackend {
    match cpal::default_host().default_input_device() {
        Some(_) => AudioBackend::Present,
        None => {
            tracing::warn!("no audio input device found; recordings will be video-only");
            AudioBackend::Absent
        }
    }
}

/// Totals reported by a finished audio task.
#[derive(Debug, Clone, Copy)]
pub struct AudioStats {
    /// Samples written across all channels.
    pub samples: u64,
    pub channels: u16,
    pub sample_rate: u32,
}

impl AudioStats {
    pub fn duration_secs(&self) -> f64 {
        let frames = self.samples as f64 / self.channels.max(1) as f64;
        frames / self.sample_rate.max(1) as f64
    }
}

/// Handle to the microphone thread.
pub struct AudioTask {
    done: mpsc::Receiver<Result<AudioStats, AudioError>>,
    handle: thread::JoinHandle<()>,
}

impl AudioTask {
    /// Launch capture on a dedicated thread; it runs until `stop` is set.
    pub fn spawn(
        stop: Arc<AtomicBool>,
        wav_path: PathBuf,
        sample_rate: u32,
        channels: u16,
    ) -> Self {
        let (done_tx, done) = mpsc::channel();
        let handle = thread::spawn(move || {
            let result = record_to_wav(&stop, &wav_path, sample_rate, channels);
            let _ = done_tx.send(result);
        });
        Self { done, handle }
    }

    /// Wait for the thread to finish, up to `timeout`.
    ///
    /// `None` means the thread failed to stop in time; the caller proceeds
    /// without it and the thread is left to wind down on its own.
    pub fn join_timeout(self, timeout: Duration) -> Option<Result<AudioStats, AudioError>> {
        match self.done.recv_timeout(timeout) {
            Ok(result) => {
                let _ = self.handle.join();
                Some(result)
            }
            Err(_) => None,
        }
    }
}

fn record_to_wav(
    stop: &AtomicBool,
    path: &Path,
    sample_rate: u32,
    channels: u16,
) -> Result<AudioStats, AudioError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(AudioError::NoDevice)?;
    let name = device.name().unwrap_or_else(|_| "unknown".to_string());
    let format = device
        .default_input_config()
        .map_err(|e| AudioError::Device(e.to_string()))?
        .sample_format();

    let (tx, rx) = crossbeam_channel::bounded::<Vec<i16>>(QUEUE_BLOCKS);
    let (stream, channels) = match build_stream(&device, format, channels, sample_rate, tx.clone())
    {
        Ok(stream) => (stream, channels),
        Err(err) if channels != 1 => {
            tracing::warn!(
                "input stream with {channels} channels rejected ({err}); retrying with mono"
            );
            (build_stream(&device, format, 1, sample_rate, tx.clone())?, 1)
        }
        Err(err) => return Err(err),
    };
    drop(tx);
    stream
        .play()
        .map_err(|e| AudioError::Device(e.to_string()))?;
    tracing::info!(
        "audio capture started on \"{name}\" ({sample_rate}Hz, {channels}ch, {format:?})"
    );

    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    let mut samples = drain_queue(&rx, &mut writer, Some(stop))?;
    // Dropping the stream releases the callback's sender and disconnects the
    // queue; flush whatever arrived before that.
    drop(stream);
    samples += drain_queue(&rx, &mut writer, None)?;
    writer.finalize()?;

    let stats = AudioStats {
        samples,
        channels,
        sample_rate,
    };
    tracing::info!("audio capture stopped after {:.1}s", stats.duration_secs());
    Ok(stats)
}

fn build_stream(
    device: &Device,
    format: SampleFormat,
    channels: u16,
    sample_rate: u32,
    tx: Sender<Vec<i16>>,
) -> Result<cpal::Stream, AudioError> {
    let config = StreamConfig {
        channels,
        sample_rate: SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    fn log_stream_error(err: cpal::StreamError) {
        tracing::error!("audio stream error: {err}");
    }

    let stream = match format {
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if tx.try_send(data.to_vec()).is_err() {
                    tracing::warn!("audio queue full; dropping a block");
                }
            },
            log_stream_error,
            None,
        ),
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let block: Vec<i16> = data.iter().map(|&s| f32_to_i16(s)).collect();
                if tx.try_send(block).is_err() {
                    tracing::warn!("audio queue full; dropping a block");
                }
            },
            log_stream_error,
            None,
        ),
        other => return Err(AudioError::Device(format!("unsupported sample format {other:?}"))),
    };
    stream.map_err(|e| AudioError::Device(e.to_string()))
}

/// Drain queued blocks into the WAV sink until `stop` is set (or, with no
/// stop flag, until the queue disconnects). Returns the samples written.
fn drain_queue<W: std::io::Write + std::io::Seek>(
    rx: &Receiver<Vec<i16>>,
    writer: &mut WavWriter<W>,
    stop: Option<&AtomicBool>,
) -> Result<u64, AudioError> {
    let mut samples = 0u64;
    loop {
        if let Some(stop) = stop {
            if stop.load(Ordering::Relaxed) {
                break;
            }
        }
        match rx.recv_timeout(DRAIN_WAIT) {
            Ok(block) => {
                for sample in block {
                    writer.write_sample(sample)?;
                    samples += 1;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if stop.is_none() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(samples)
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavReader;

    #[test]
    fn f32_samples_clamp_to_i16_range() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(-1.0), -i16::MAX);
        assert_eq!(f32_to_i16(-3.0), -i16::MAX);
    }

    fn test_writer(path: &Path) -> WavWriter<std::io::BufWriter<std::fs::File>> {
        WavWriter::create(
            path,
            WavSpec {
                channels: 1,
                sample_rate: 8_000,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            },
        )
        .unwrap()
    }

    #[test]
    fn drain_writes_queued_blocks_until_disconnect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drain.wav");
        let mut writer = test_writer(&path);

        let (tx, rx) = crossbeam_channel::bounded::<Vec<i16>>(4);
        tx.send(vec![1, 2, 3, 4]).unwrap();
        tx.send(vec![5, 6]).unwrap();
        drop(tx);

        let samples = drain_queue(&rx, &mut writer, None).unwrap();
        writer.finalize().unwrap();
        assert_eq!(samples, 6);

        let reader = WavReader::open(&path).unwrap();
        assert_eq!(reader.len(), 6);
    }

    #[test]
    fn drain_stops_when_the_flag_is_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stopped.wav");
        let mut writer = test_writer(&path);

        let (tx, rx) = crossbeam_channel::bounded::<Vec<i16>>(4);
        tx.send(vec![1, 2]).unwrap();

        let stop = AtomicBool::new(true);
        let samples = drain_queue(&rx, &mut writer, Some(&stop)).unwrap();
        assert_eq!(samples, 0);
    }

    #[test]
    fn stats_report_wall_clock_duration() {
        let stats = AudioStats {
            samples: 88_200,
            channels: 2,
            sample_rate: 44_100,
        };
        assert!((stats.duration_secs() - 1.0).abs() < 1e-9);
    }
}
