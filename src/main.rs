//! Command-line control surface for the recorder.

use anyhow::{bail, Context};
use clap::Parser;
use meeting_recorder::capture::{self, CaptureRegion};
use meeting_recorder::recorder::{RecordingSession, SessionConfig, SessionState, StatusEvent};
use meeting_recorder::Capabilities;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(version, about = "Capture screen + microphone into a single MP4 file.")]
struct Cli {
    /// Directory for recordings; created if absent.
    #[arg(long, default_value = "recordings")]
    output_dir: PathBuf,

    /// Monitor index to record (see --list-monitors); defaults to primary.
    #[arg(long, conflicts_with = "region")]
    monitor: Option<usize>,

    /// Region to record, as LEFT,TOP,WIDTHxHEIGHT (e.g. 0,0,1280x720).
    #[arg(long, value_parser = parse_region)]
    region: Option<CaptureRegion>,

    /// Stop automatically after this many seconds; otherwise Ctrl+C stops.
    #[arg(long)]
    duration: Option<u64>,

    /// Base name for the artifacts; defaults to a start timestamp.
    #[arg(long)]
    name: Option<String>,

    /// Requested microphone channel count.
    #[arg(long, default_value_t = 1)]
    channels: u16,

    /// List monitors and exit.
    #[arg(long)]
    list_monitors: bool,

    /// Print status events as JSON lines.
    #[arg(long)]
    json: bool,
}

fn parse_region(value: &str) -> Result<CaptureRegion, String> {
    const USAGE: &str = "expected LEFT,TOP,WIDTHxHEIGHT";
    let (origin, size) = value.rsplit_once(',').ok_or_else(|| USAGE.to_string())?;
    let (left, top) = origin.split_once(',').ok_or_else(|| USAGE.to_string())?;
    let (width, height) = size.split_once('x').ok_or_else(|| USAGE.to_string())?;
    let left: i32 = left.trim().parse().map_err(|e| format!("bad left: {e}"))?;
    let top: i32 = top.trim().parse().map_err(|e| format!("bad top: {e}"))?;
    let width: u32 = width.trim().parse().map_err(|e| format!("bad width: {e}"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|e| format!("bad height: {e}"))?;
    CaptureRegion::new(left, top, width, height).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meeting_recorder=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if cli.list_monitors {
        for m in capture::monitors().context("cannot enumerate monitors")? {
            println!(
                "{}: {} {}x{} at ({},{}){}",
                m.id,
                m.name,
                m.width,
                m.height,
                m.left,
                m.top,
                if m.is_primary { " [primary]" } else { "" }
            );
        }
        return Ok(());
    }

    let capabilities = Capabilities::detect();

    let region = match (cli.region, cli.monitor) {
        (Some(region), _) => Some(region),
        (None, Some(index)) => {
            let monitors = capture::monitors().context("cannot enumerate monitors")?;
            let monitor = monitors
                .get(index)
                .with_context(|| format!("no monitor {index}; {} available", monitors.len()))?;
            Some(monitor.region())
        }
        (None, None) => None,
    };

    let mut config = SessionConfig::new(&cli.output_dir);
    config.region = region;
    config.base_name = cli.name.clone();
    config.channels = cli.channels;

    let mut session = RecordingSession::new(config, capabilities);
    let mut events = session.subscribe();
    let json = cli.json;
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if json {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::error!("cannot encode event: {e}"),
                }
            } else {
                match &event {
                    StatusEvent::Started => println!("Recording started. Press Ctrl+C to stop."),
                    StatusEvent::Processing => println!("Processing video..."),
                    StatusEvent::Succeeded { path } => println!("Success! Saved: {}", path.display()),
                    StatusEvent::Failed { reason } => println!("Failed: {reason}"),
                }
            }
            if matches!(
                event,
                StatusEvent::Succeeded { .. } | StatusEvent::Failed { .. }
            ) {
                break;
            }
        }
    });

    session.start().await?;

    wait_for_stop(cli.duration.map(Duration::from_secs)).await;
    session.stop();

    let final_state = session.wait().await;
    let _ = printer.await;

    if final_state != SessionState::Done {
        bail!("recording did not complete");
    }
    Ok(())
}

/// Block until Ctrl+C or the optional deadline, logging elapsed time along
/// the way.
async fn wait_for_stop(deadline: Option<Duration>) {
    let started = Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_secs(10));
    ticker.tick().await;
    loop {
        let timeout = async {
            match deadline {
                Some(d) => tokio::time::sleep(d.saturating_sub(started.elapsed())).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!("cannot listen for Ctrl+C: {e}");
                }
                break;
            }
            _ = timeout => break,
            _ = ticker.tick() => {
                tracing::info!("recording... {:.0}s elapsed", started.elapsed().as_secs_f64());
            }
        }
    }
}
