// Runs a directory of still images through the tracking service as if they were
// a live stream, then prints the resulting track.

use anyhow::{Context, bail};
use clap::Parser;
use laser_painter::core_modules::utils::image_helper::image_helper::save_diagnostics;
use laser_painter::{Frame, FrameReport, Settings, TrackSnapshot, TrackingService};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const FRAME_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

#[derive(Debug, Parser)]
#[command(name = "laser_painter", version, about = "Track a laser dot through an image sequence")]
struct Cli {
    /// Settings file (TOML). Built-in defaults are used when omitted.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Directory of frames, processed in file name order.
    #[arg(long)]
    frames: PathBuf,

    /// Frames per second to replay at.
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// Write the diagnostic masks of every frame into this directory.
    #[arg(long)]
    dump_masks: Option<PathBuf>,

    /// Seconds to keep the clock running after the last frame, so timeouts and
    /// fades can play out.
    #[arg(long, default_value_t = 0.0)]
    linger: f64,

    /// Print the effective settings as TOML and exit.
    #[arg(long)]
    print_settings: bool,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Default)]
struct ReplayStats {
    frames: u64,
    located: u64,
    warnings: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    if !(cli.fps > 0.0 && cli.fps.is_finite()) {
        bail!("--fps must be a positive number, got {}", cli.fps);
    }

    let mut settings = match &cli.settings {
        Some(path) => Settings::load(path).with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };

    let frames = list_frames(&cli.frames)?;
    let Some(first) = frames.first() else {
        bail!("no frames found in {}", cli.frames.display());
    };
    let (width, height) =
        image::image_dimensions(first).with_context(|| format!("reading frame size of {}", first.display()))?;
    settings.capture.frame_width = width;
    settings.capture.frame_height = height;

    if cli.print_settings {
        println!("{}", toml::to_string_pretty(&settings)?);
        return Ok(());
    }

    let mut config = settings.into_pipeline_config().context("invalid settings")?;
    if cli.dump_masks.is_some() {
        config.detector.emit_diagnostics = true;
    }
    info!(frames = frames.len(), width, height, fps = cli.fps, "replaying");

    let service = TrackingService::spawn(config, frames.len().max(16));
    let consumer = tokio::spawn(consume_reports(service.subscribe_reports(), cli.dump_masks.clone()));

    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / cli.fps));
    for path in &frames {
        ticker.tick().await;
        let image = image::open(path).with_context(|| format!("decoding {}", path.display()))?;
        service.submit_frame(Frame::from(image))?;
    }

    if cli.linger > 0.0 {
        tokio::time::sleep(Duration::from_secs_f64(cli.linger)).await;
    }

    let snapshot = service.shutdown().await?;
    let stats = consumer.await.context("report consumer failed")?;
    print_summary(&stats, &snapshot);
    Ok(())
}

fn list_frames(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        let is_frame = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if is_frame {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}

async fn consume_reports(mut reports: broadcast::Receiver<FrameReport>, dump_masks: Option<PathBuf>) -> ReplayStats {
    let mut stats = ReplayStats::default();
    loop {
        let report = match reports.recv().await {
            Ok(report) => report,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "report consumer fell behind");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        stats.frames += 1;
        if let Some(warning) = &report.warning {
            stats.warnings += 1;
            warn!(frame = report.frame_index, %warning, "frame warning");
        }
        if let Some((x, y)) = report.corrected.position() {
            stats.located += 1;
            debug!(frame = report.frame_index, x, y, "laser");
        }

        if let (Some(dir), Some(diagnostics)) = (&dump_masks, &report.diagnostics) {
            if let Err(error) = save_diagnostics(dir, report.frame_index, diagnostics) {
                warn!(frame = report.frame_index, %error, "could not dump masks");
            }
        }
    }
    stats
}

fn print_summary(stats: &ReplayStats, snapshot: &TrackSnapshot) {
    println!(
        "frames: {}  located: {}  warnings: {}",
        stats.frames, stats.located, stats.warnings
    );
    println!("canvas: {}x{}", snapshot.canvas_size.0, snapshot.canvas_size.1);
    println!("track ({} points):", snapshot.track.len());
    for (x, y) in &snapshot.track {
        println!("  {x:.2}, {y:.2}");
    }
    let old = &snapshot.old_track;
    println!(
        "old track ({} points, opacity {}, {}):",
        old.points.len(),
        old.opacity,
        if old.showing { "showing" } else { "hidden" }
    );
    for (x, y) in &old.points {
        println!("  {x:.2}, {y:.2}");
    }
}
