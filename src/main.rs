use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use crossbeam_channel::{Receiver, tick};
use tracing::{info, warn};

use slam_bridge::bridge::{Bridge, FanoutSink, IncomingFrame, LogSink, PublishSink, RawImage};
use slam_bridge::config::Settings;
use slam_bridge::io::euroc::EurocMonoDataset;
use slam_bridge::io::export::export_map;
use slam_bridge::io::point_log::PointLogSink;
use slam_bridge::system::{SimulatedSlam, SlamEngine};

/// Size of frames produced when no dataset is configured.
const SYNTHETIC_WIDTH: u32 = 752;
const SYNTHETIC_HEIGHT: u32 = 480;

/// Publish SLAM keyframes, keyframe images and colored landmarks.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the vocabulary file.
    vocabulary: PathBuf,

    /// Path to the YAML settings file.
    settings: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if !args.vocabulary.is_file() {
        bail!("Vocabulary file not found: {}", args.vocabulary.display());
    }
    let settings = Settings::load(&args.settings)
        .with_context(|| format!("Failed to load settings from {}", args.settings.display()))?;
    info!("Loaded settings from {}", args.settings.display());

    let engine: Arc<SimulatedSlam> = Arc::new(SimulatedSlam::new(&settings.simulation)?);
    let sink = build_sinks(&settings)?;
    let bridge = Bridge::start(engine.clone(), sink, &settings.bridge)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl-C handler")?;

    let pacer = settings.dataset.playback_period()?.map(tick);

    let submitted = match &settings.dataset.path {
        Some(path) => {
            let dataset = EurocMonoDataset::new(path)
                .with_context(|| format!("Failed to open dataset {}", path.display()))?;
            info!("Loaded {} frames from {}", dataset.len(), path.display());
            feed(&bridge, dataset.frames(), pacer.as_ref(), &running)?
        }
        None => {
            let count = settings.simulation.frames_per_revolution;
            let period_ns = (1e9 / settings.dataset.playback_rate_hz.max(1.0)) as u64;
            info!("No dataset configured; feeding {} synthetic frames", count);
            let frames = (0..count as u64).map(|i| synthetic_frame(i * period_ns));
            feed(&bridge, frames, pacer.as_ref(), &running)?
        }
    };
    info!("Submitted {} frames", submitted);

    // Let ingestion drain and the publisher catch up on the last keyframe.
    let sender = bridge.frame_sender();
    while sender.pending() > 0 && running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(10));
    }
    drop(sender);
    thread::sleep(settings.bridge.publish_period()? * 4);

    let report = bridge.shutdown()?;
    info!(
        "Published {} poses, {} images, {} landmarks",
        report.scheduler.stats.poses_published,
        report.scheduler.stats.images_published,
        report.scheduler.stats.landmarks_published
    );

    if settings.export.enabled {
        let dir = export_map(
            engine.shared_state(),
            &report.scheduler.landmarks,
            &settings.export.output_root,
        )?;
        info!("Map saved to {}", dir.display());
    }

    Ok(())
}

/// Push frames into the bridge until exhausted or interrupted.
fn feed<I>(
    bridge: &Bridge,
    frames: I,
    pacer: Option<&Receiver<std::time::Instant>>,
    running: &AtomicBool,
) -> Result<usize>
where
    I: Iterator<Item = Result<IncomingFrame>>,
{
    let mut submitted = 0;
    for frame in frames {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        if let Some(pacer) = pacer {
            pacer.recv().ok();
        }
        match frame {
            Ok(frame) => {
                bridge.submit(frame)?;
                submitted += 1;
            }
            Err(e) => warn!("Skipping frame: {:#}", e),
        }
    }
    Ok(submitted)
}

/// A color gradient that shifts over time, so sampled landmark colors vary.
fn synthetic_frame(timestamp_ns: u64) -> Result<IncomingFrame> {
    let shift = (timestamp_ns / 10_000_000) as u32;
    let mut data = Vec::with_capacity((SYNTHETIC_WIDTH * SYNTHETIC_HEIGHT * 3) as usize);
    for v in 0..SYNTHETIC_HEIGHT {
        for u in 0..SYNTHETIC_WIDTH {
            data.push(((u + shift) % 256) as u8);
            data.push((v % 256) as u8);
            data.push(((u + v) / 5 % 256) as u8);
        }
    }
    let image = RawImage::from_rgb8(timestamp_ns, SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT, data)?;
    Ok(IncomingFrame::decoded(image))
}

fn build_sinks(settings: &Settings) -> Result<Box<dyn PublishSink>> {
    let config = &settings.sinks;
    let mut sinks: Vec<Box<dyn PublishSink>> = Vec::new();

    if config.log {
        sinks.push(Box::new(LogSink::new(settings.bridge.topics.clone())));
    }
    if let Some(path) = &config.point_log {
        sinks.push(Box::new(PointLogSink::create(path)?));
        info!("Logging published points to {}", path.display());
    }
    if config.rerun {
        #[cfg(feature = "rerun")]
        sinks.push(Box::new(slam_bridge::viz::RerunSink::spawn("slam-bridge")?));
        #[cfg(not(feature = "rerun"))]
        warn!("sinks.rerun is set but this build lacks the `rerun` feature");
    }

    Ok(Box::new(FanoutSink::new(sinks)))
}
