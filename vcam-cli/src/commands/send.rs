//! Send command - create the camera and stream a test pattern

use anyhow::{Context, Result, bail};
use clap::Args;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::signal;
use tracing::{info, warn};
use vcam_core::{FrameBuffer, Preset, VirtualCamera};

use super::Settings;
use crate::pattern::Pattern;

/// Arguments for the send command
#[derive(Args)]
pub struct SendArgs {
    /// Stream preset (qvga30, vga30, 720p30, 720p60, 1080p30, 1080p60)
    #[arg(short, long, conflicts_with_all = ["width", "height"])]
    preset: Option<String>,

    /// Width in pixels (requires --height)
    #[arg(long, requires = "height")]
    width: Option<i64>,

    /// Height in pixels (requires --width)
    #[arg(long, requires = "width")]
    height: Option<i64>,

    /// Frames per second (0 = unpaced)
    #[arg(short, long)]
    fps: Option<f32>,

    /// Test pattern to draw
    #[arg(long, value_enum, default_value_t = Pattern::Bars)]
    pattern: Pattern,

    /// Seconds to wait for a consumer before streaming
    #[arg(short, long)]
    wait: Option<f64>,

    /// Stop after this many frames
    #[arg(short = 'n', long)]
    frames: Option<u64>,
}

/// Stream a test pattern until interrupted
pub async fn send(args: SendArgs, settings: Settings) -> Result<()> {
    println!("vcam - Starting Camera\n");

    let mut config = settings
        .file
        .camera_config()
        .context("Invalid [stream] configuration")?;

    if let Some(ref preset) = args.preset {
        let preset: Preset = preset.parse().map_err(|e: String| {
            anyhow::anyhow!(
                "{}. Valid options: qvga30, vga30, 720p30, 720p60, 1080p30, 1080p60",
                e
            )
        })?;
        if preset == Preset::Custom {
            bail!("Use --width and --height for a custom size");
        }
        config = config.with_preset(preset);
    }
    if let (Some(width), Some(height)) = (args.width, args.height) {
        config.width = width;
        config.height = height;
        config = config.with_preset(Preset::Custom);
    }
    if let Some(fps) = args.fps {
        config = config.with_framerate(fps);
    }

    for warning in config.warnings() {
        warn!("{}", warning);
    }

    let camera =
        Arc::new(VirtualCamera::from_config(&config).context("Failed to create virtual camera")?);

    println!("Configuration:");
    println!("  Device:      {}", camera.identity());
    println!("  Resolution:  {}x{}", camera.width(), camera.height());
    if camera.framerate() > 0.0 {
        println!("  Framerate:   {} fps", camera.framerate());
    } else {
        println!("  Framerate:   unpaced");
    }
    println!("  Pattern:     {}", args.pattern);
    println!("  Buffer:      {}", camera.runtime_dir().display());
    println!();

    if let Some(secs) = args.wait {
        let timeout = wait_timeout(secs)?;
        println!("Waiting up to {}s for a consumer...", secs);
        let waiter = Arc::clone(&camera);
        let connected =
            tokio::task::spawn_blocking(move || waiter.wait_for_connection(Some(timeout)))
                .await
                .context("Wait task failed")??;
        if connected {
            println!("Consumer attached.\n");
        } else {
            println!("No consumer yet, streaming anyway.\n");
        }
    }

    println!("Press Ctrl+C to stop...\n");

    let stop = Arc::new(AtomicBool::new(false));
    let mut worker = {
        let camera = Arc::clone(&camera);
        let stop = Arc::clone(&stop);
        let pattern = args.pattern;
        let frames = args.frames;
        tokio::task::spawn_blocking(move || stream(&camera, pattern, frames, &stop))
    };

    let finished = tokio::select! {
        res = signal::ctrl_c() => {
            res.context("Failed to listen for Ctrl+C")?;
            println!("\nReceived interrupt signal...");
            None
        }
        res = &mut worker => Some(res),
    };
    let result = match finished {
        Some(res) => res,
        None => {
            stop.store(true, Ordering::Relaxed);
            worker.await
        }
    };
    let sent = result.context("Frame loop failed")??;

    println!("Stopping camera...");
    let stats = camera.stats();
    camera.delete();

    println!("Sent {} frames ({}).", sent, stats.format_line());
    Ok(())
}

/// Negative waits poll once; values too large for a `Duration` are rejected
fn wait_timeout(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs.max(0.0))
        .with_context(|| format!("Invalid --wait value: {}", secs))
}

fn stream(
    camera: &VirtualCamera,
    pattern: Pattern,
    frames: Option<u64>,
    stop: &AtomicBool,
) -> vcam_core::Result<u64> {
    let mut image = FrameBuffer::new(camera.width(), camera.height())?;
    let mut sent = 0u64;
    let mut last_report = Instant::now();

    while !stop.load(Ordering::Relaxed) && frames.is_none_or(|max| sent < max) {
        pattern.render(&mut image, sent);
        camera.send_frame(image.as_frame())?;
        sent += 1;

        if last_report.elapsed() >= Duration::from_secs(1) {
            let connected = camera.is_connected()?;
            info!(
                "{} consumer={}",
                camera.stats().format_line(),
                if connected { "attached" } else { "none" }
            );
            last_report = Instant::now();
        }
    }

    Ok(sent)
}
