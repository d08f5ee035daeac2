//! Recording session
//!
//! Coordinates the capture loop, the audio task, the shared stop signal,
//! and the finalize step that muxes the intermediates into the deliverable.

use super::sink::FrameSink;
use super::state::{OutputPaths, SessionConfig, SessionState, StatusEvent};
use crate::capture::audio::{AudioBackend, AudioTask};
use crate::capture::{self, CaptureError, CaptureRegion, FrameSource};
use crate::mux::{self, MuxBackend, RawVideo};
use crate::Capabilities;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::broadcast;

/// Bound on waiting for the audio thread after the stop signal.
const AUDIO_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Progress log cadence in frames.
const FRAME_LOG_EVERY: u64 = 60;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session already started")]
    AlreadyStarted,

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("sink I/O error: {0}")]
    SinkIo(#[from] std::io::Error),
}

type SourceFactory =
    Box<dyn FnOnce(CaptureRegion) -> Result<Box<dyn FrameSource>, CaptureError> + Send>;

/// One screen + microphone recording, from `start()` to a terminal state.
///
/// `Done` and `Failed` are terminal; record again with a fresh session.
/// The stop flag is the only state shared with the capture loops, and they
/// only ever read it.
pub struct RecordingSession {
    config: SessionConfig,
    capabilities: Capabilities,
    paths: OutputPaths,
    state: Arc<RwLock<SessionState>>,
    stop: Arc<AtomicBool>,
    event_tx: broadcast::Sender<StatusEvent>,
    source_factory: Option<SourceFactory>,
    worker: Option<tokio::task::JoinHandle<()>>,
    started_at: Option<Instant>,
}

impl RecordingSession {
    pub fn new(config: SessionConfig, capabilities: Capabilities) -> Self {
        let backend = capabilities.frame;
        Self::with_source_factory(
            config,
            capabilities,
            Box::new(move |region| capture::open_frame_source(region, backend)),
        )
    }

    fn with_source_factory(
        config: SessionConfig,
        capabilities: Capabilities,
        source_factory: SourceFactory,
    ) -> Self {
        let paths = match &config.base_name {
            Some(name) => OutputPaths::for_base_name(&config.output_dir, name),
            None => OutputPaths::timestamped(&config.output_dir),
        };
        let (event_tx, _) = broadcast::channel(16);
        Self {
            config,
            capabilities,
            paths,
            state: Arc::new(RwLock::new(SessionState::Idle)),
            stop: Arc::new(AtomicBool::new(false)),
            event_tx,
            source_factory: Some(source_factory),
            worker: None,
            started_at: None,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn paths(&self) -> &OutputPaths {
        &self.paths
    }

    /// Subscribe to status events. Subscribe before `start()` to observe
    /// `Started`.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.event_tx.subscribe()
    }

    /// Elapsed time since `start()`, `None` before it.
    pub fn duration(&self) -> Option<Duration> {
        self.started_at.map(|t| t.elapsed())
    }

    /// Begin recording: `Idle → Recording`.
    ///
    /// Opens the capture backends and launches the loops on a dedicated
    /// worker; returns once they are under way. Failures past this point
    /// surface as a `Failed` status event, not a return value.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.state() != SessionState::Idle {
            return Err(SessionError::AlreadyStarted);
        }
        let Some(factory) = self.source_factory.take() else {
            return Err(SessionError::AlreadyStarted);
        };

        if let Err(e) = std::fs::create_dir_all(&self.config.output_dir) {
            self.fail(format!(
                "cannot create output directory {}: {e}",
                self.config.output_dir.display()
            ));
            return Err(e.into());
        }

        let region = match self.config.region {
            Some(region) => region,
            None => match capture::primary_region() {
                Ok(region) => region,
                Err(e) => {
                    self.fail(e.to_string());
                    return Err(e.into());
                }
            },
        };

        *self.state.write() = SessionState::Recording;
        self.started_at = Some(Instant::now());
        let _ = self.event_tx.send(StatusEvent::Started);
        tracing::info!(
            "recording started: {}x{} at ({},{}), artifacts under {}",
            region.width,
            region.height,
            region.left,
            region.top,
            self.config.output_dir.display()
        );

        let ctx = WorkerCtx {
            paths: self.paths.clone(),
            state: self.state.clone(),
            stop: self.stop.clone(),
            event_tx: self.event_tx.clone(),
            audio_backend: self.capabilities.audio,
            mux_backend: self.capabilities.mux,
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
        };
        self.worker = Some(tokio::task::spawn_blocking(move || {
            run_worker(ctx, factory, region)
        }));
        Ok(())
    }

    /// Request a stop: `Recording → Stopping`.
    ///
    /// Safe to call at any time: before `start()` it is a no-op, and after a
    /// terminal state it does nothing. Setting the shared flag is the only
    /// way the capture loops end.
    pub fn stop(&self) {
        let mut state = self.state.write();
        match *state {
            SessionState::Recording => {
                *state = SessionState::Stopping;
                self.stop.store(true, Ordering::SeqCst);
                tracing::info!("stop requested");
            }
            SessionState::Idle => {
                tracing::debug!("stop requested before start; ignoring");
            }
            _ => {}
        }
    }

    /// Wait for the session to reach a terminal state.
    pub async fn wait(&mut self) -> SessionState {
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                tracing::error!("recording worker panicked: {e}");
                *self.state.write() = SessionState::Failed;
            }
        }
        self.state()
    }

    fn fail(&self, reason: String) {
        tracing::error!("{reason}");
        *self.state.write() = SessionState::Failed;
        let _ = self.event_tx.send(StatusEvent::Failed { reason });
    }
}

/// Everything the worker needs, detached from the session handle.
struct WorkerCtx {
    paths: OutputPaths,
    state: Arc<RwLock<SessionState>>,
    stop: Arc<AtomicBool>,
    event_tx: broadcast::Sender<StatusEvent>,
    audio_backend: AudioBackend,
    mux_backend: MuxBackend,
    sample_rate: u32,
    channels: u16,
}

struct CaptureStats {
    frames: u64,
    elapsed: Duration,
    audio_ok: bool,
}

fn run_worker(ctx: WorkerCtx, factory: SourceFactory, region: CaptureRegion) {
    match record(&ctx, factory, region) {
        Ok(stats) => finalize(&ctx, region, stats),
        Err(e) => fail_worker(&ctx, format!("recording failed: {e}")),
    }
}

/// Drive the capture loop and the audio task until the stop signal, then
/// release both sinks. Resources are released on the fault paths too, before
/// the error is reported.
fn record(
    ctx: &WorkerCtx,
    factory: SourceFactory,
    region: CaptureRegion,
) -> Result<CaptureStats, SessionError> {
    let mut source = factory(region)?;
    let mut sink = match FrameSink::create(&ctx.paths.video, region.width, region.height) {
        Ok(sink) => sink,
        Err(e) => {
            drop(source);
            return Err(e.into());
        }
    };

    let audio = match ctx.audio_backend {
        AudioBackend::Present => Some(AudioTask::spawn(
            ctx.stop.clone(),
            ctx.paths.audio.clone(),
            ctx.sample_rate,
            ctx.channels,
        )),
        AudioBackend::Absent => {
            tracing::info!("no audio backend; recording video-only");
            None
        }
    };

    let loop_result = run_capture_loop(source.as_mut(), &mut sink, &ctx.stop);

    // The loop is done, by stop request or by fault; either way wind the
    // audio task down and release the capture handle and sinks before
    // deciding the outcome.
    ctx.stop.store(true, Ordering::SeqCst);
    {
        let mut state = ctx.state.write();
        if !state.is_terminal() {
            *state = SessionState::Stopping;
        }
    }

    let audio_ok = join_audio(audio);
    drop(source);
    let frames_result = sink.finish();

    let elapsed = loop_result?;
    let frames = frames_result?;
    Ok(CaptureStats {
        frames,
        elapsed,
        audio_ok,
    })
}

fn run_capture_loop(
    source: &mut dyn FrameSource,
    sink: &mut FrameSink,
    stop: &AtomicBool,
) -> Result<Duration, SessionError> {
    let started = Instant::now();
    while !stop.load(Ordering::SeqCst) {
        match source.grab()? {
            Some(frame) => {
                sink.append(&frame.into_bgra())?;
                if sink.frames() % FRAME_LOG_EVERY == 0 {
                    tracing::debug!(
                        "captured {} frames in {:.1}s",
                        sink.frames(),
                        started.elapsed().as_secs_f64()
                    );
                }
            }
            // Bounded wait expired with no frame; loop around to the stop check.
            None => {}
        }
    }
    Ok(started.elapsed())
}

fn join_audio(audio: Option<AudioTask>) -> bool {
    let Some(task) = audio else {
        return false;
    };
    match task.join_timeout(AUDIO_JOIN_TIMEOUT) {
        Some(Ok(stats)) => {
            tracing::debug!("audio task finished: {:.1}s captured", stats.duration_secs());
            true
        }
        Some(Err(e)) => {
            tracing::warn!("audio capture failed ({e}); continuing video-only");
            false
        }
        None => {
            tracing::warn!(
                "audio task did not stop within {AUDIO_JOIN_TIMEOUT:?}; continuing without it"
            );
            false
        }
    }
}

/// `Stopping → Finalizing → Done` (or `Failed` when there is no video to
/// deliver). Mux errors degrade to a partial success that keeps the raw
/// intermediates on disk.
fn finalize(ctx: &WorkerCtx, region: CaptureRegion, stats: CaptureStats) {
    *ctx.state.write() = SessionState::Finalizing;
    let _ = ctx.event_tx.send(StatusEvent::Processing);

    if stats.frames == 0 {
        fail_worker(ctx, "no video frames captured".to_string());
        return;
    }
    if !ctx.paths.video.exists() {
        fail_worker(
            ctx,
            format!("video intermediate missing: {}", ctx.paths.video.display()),
        );
        return;
    }

    if ctx.mux_backend == MuxBackend::Absent {
        tracing::warn!(
            "no mux backend; raw video kept at {}",
            ctx.paths.video.display()
        );
        succeed(ctx, ctx.paths.video.clone());
        return;
    }

    let elapsed_secs = stats.elapsed.as_secs_f64().max(0.001);
    let fps = (stats.frames as f64 / elapsed_secs).clamp(0.5, 240.0);
    let video = RawVideo {
        path: ctx.paths.video.clone(),
        width: region.width,
        height: region.height,
        fps,
        duration: Duration::from_secs_f64(stats.frames as f64 / fps),
    };
    let audio = (stats.audio_ok && ctx.paths.audio.exists()).then(|| ctx.paths.audio.as_path());
    if audio.is_none() {
        tracing::info!("no audio intermediate; muxing video-only");
    }

    match mux::combine(&video, audio, &ctx.paths.muxed) {
        Ok(()) => {
            remove_intermediates(&ctx.paths);
            tracing::info!("recording saved: {}", ctx.paths.muxed.display());
            succeed(ctx, ctx.paths.muxed.clone());
        }
        Err(e) => {
            tracing::warn!(
                "mux failed ({e}); raw intermediates kept at {}",
                ctx.paths.video.display()
            );
            succeed(ctx, ctx.paths.video.clone());
        }
    }
}

fn succeed(ctx: &WorkerCtx, path: PathBuf) {
    *ctx.state.write() = SessionState::Done;
    let _ = ctx.event_tx.send(StatusEvent::Succeeded { path });
}

fn fail_worker(ctx: &WorkerCtx, reason: String) {
    tracing::error!("{reason}");
    *ctx.state.write() = SessionState::Failed;
    let _ = ctx.event_tx.send(StatusEvent::Failed { reason });
}

fn remove_intermediates(paths: &OutputPaths) {
    for path in [&paths.video, &paths.audio] {
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!("could not remove intermediate {}: {e}", path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{FrameBackend, PixelLayout, RawFrame};
    use std::path::Path;

    fn test_capabilities() -> Capabilities {
        Capabilities {
            frame: FrameBackend::Fallback,
            audio: AudioBackend::Absent,
            mux: MuxBackend::Absent,
        }
    }

    /// Frame source producing solid frames, with an optional injected fault.
    struct SolidSource {
        region: CaptureRegion,
        grab_wait: Duration,
        fail_after: Option<u64>,
        grabs: u64,
    }

    impl FrameSource for SolidSource {
        fn grab(&mut self) -> Result<Option<RawFrame>, CaptureError> {
            std::thread::sleep(self.grab_wait);
            self.grabs += 1;
            if let Some(n) = self.fail_after {
                if self.grabs > n {
                    return Err(CaptureError::Backend("synthetic fault".to_string()));
                }
            }
            Ok(Some(RawFrame {
                width: self.region.width,
                height: self.region.height,
                layout: PixelLayout::Bgra,
                data: vec![0x40; self.region.frame_len()],
            }))
        }

        fn region(&self) -> CaptureRegion {
            self.region
        }
    }

    fn session_with(
        dir: &Path,
        fail_after: Option<u64>,
        grab_wait: Duration,
    ) -> RecordingSession {
        let mut config = SessionConfig::new(dir);
        config.region = Some(CaptureRegion::new(0, 0, 64, 48).unwrap());
        config.base_name = Some("test-recording".to_string());
        RecordingSession::with_source_factory(
            config,
            test_capabilities(),
            Box::new(move |region| {
                Ok(Box::new(SolidSource {
                    region,
                    grab_wait,
                    fail_after,
                    grabs: 0,
                }) as Box<dyn FrameSource>)
            }),
        )
    }

    #[tokio::test]
    async fn video_only_session_reaches_done() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_with(dir.path(), None, Duration::from_millis(1));
        let mut events = session.subscribe();

        session.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        session.stop();
        assert_eq!(session.wait().await, SessionState::Done);

        let video = session.paths().video.clone();
        assert!(video.exists());
        assert!(std::fs::metadata(&video).unwrap().len() > 0);

        assert!(matches!(events.try_recv(), Ok(StatusEvent::Started)));
        assert!(matches!(events.try_recv(), Ok(StatusEvent::Processing)));
        match events.try_recv() {
            Ok(StatusEvent::Succeeded { path }) => assert_eq!(path, video),
            other => panic!("expected Succeeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stop_before_start_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_with(dir.path(), None, Duration::from_millis(1));

        session.stop();
        assert_eq!(session.state(), SessionState::Idle);

        session.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.stop();
        assert_eq!(session.wait().await, SessionState::Done);
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_with(dir.path(), None, Duration::from_millis(1));

        session.start().await.unwrap();
        assert!(matches!(
            session.start().await,
            Err(SessionError::AlreadyStarted)
        ));

        session.stop();
        assert_eq!(session.wait().await, SessionState::Done);
    }

    #[tokio::test]
    async fn capture_fault_fails_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_with(dir.path(), Some(3), Duration::from_millis(1));
        let mut events = session.subscribe();

        session.start().await.unwrap();
        assert_eq!(session.wait().await, SessionState::Failed);

        // The frames written before the fault stay on disk.
        assert!(session.paths().video.exists());

        assert!(matches!(events.try_recv(), Ok(StatusEvent::Started)));
        assert!(matches!(events.try_recv(), Ok(StatusEvent::Failed { .. })));
    }

    #[tokio::test]
    async fn stop_is_observed_within_the_bounded_wait() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_with(dir.path(), None, Duration::from_millis(100));

        session.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let requested = Instant::now();
        session.stop();
        assert_eq!(session.wait().await, SessionState::Done);
        // One bounded grab plus finalization, with generous headroom.
        assert!(requested.elapsed() < Duration::from_secs(2));
    }
}
