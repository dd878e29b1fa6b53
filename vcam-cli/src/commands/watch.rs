//! Watch command - attach as a consumer and report what arrives

use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::signal;
use vcam_core::{CameraReceiver, ReceiveStats, RowLayout};

use super::Settings;

/// Arguments for the watch command
#[derive(Args)]
pub struct WatchArgs {
    /// Stop after this many fresh frames
    #[arg(short = 'n', long)]
    frames: Option<u64>,

    /// Milliseconds to wait for a new frame before repeating the last one
    #[arg(short, long)]
    timeout_ms: Option<u64>,

    /// Copy frames bottom-up with rows padded to 4 bytes
    #[arg(long)]
    bottom_up: bool,
}

/// Attach to the device and print per-second statistics
pub async fn watch(args: WatchArgs, settings: Settings) -> Result<()> {
    let receiver = CameraReceiver::open(&settings.runtime_dir, &settings.identity)
        .with_context(|| format!("Failed to attach to '{}'", settings.identity))?;

    let layout = if args.bottom_up {
        RowLayout::BottomUpPadded
    } else {
        settings.file.receiver.layout
    };
    let timeout = args
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| settings.file.frame_timeout());

    println!("vcam - Watching '{}'\n", settings.identity);
    println!("  Resolution:  {}x{}", receiver.width(), receiver.height());
    println!("  Framerate:   {} fps", receiver.framerate());
    println!("  Layout:      {:?}", layout);
    println!();
    println!("Press Ctrl+C to stop...\n");

    let stop = Arc::new(AtomicBool::new(false));
    let mut worker = {
        let stop = Arc::clone(&stop);
        let frames = args.frames;
        tokio::task::spawn_blocking(move || receive(receiver, layout, timeout, frames, &stop))
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
    let (stats, source_lost) = result.context("Receive loop failed")??;

    if source_lost {
        println!("Source went inactive.");
    }
    println!("Received: {}", stats.format_line());
    Ok(())
}

fn receive(
    mut receiver: CameraReceiver,
    layout: RowLayout,
    timeout: Duration,
    frames: Option<u64>,
    stop: &AtomicBool,
) -> vcam_core::Result<(ReceiveStats, bool)> {
    let mut out = vec![0u8; layout.buffer_size(receiver.width() as usize, receiver.height() as usize)];
    let mut last_report = Instant::now();

    while !stop.load(Ordering::Relaxed) {
        if frames.is_some_and(|max| receiver.stats().frames_fresh >= max) {
            break;
        }
        if !receiver.wait_for_new_frame(Some(timeout))? {
            return Ok((receiver.stats(), true));
        }
        receiver.read_frame(&mut out, layout)?;

        if last_report.elapsed() >= Duration::from_secs(1) {
            println!("  {}", receiver.stats().format_line());
            last_report = Instant::now();
        }
    }

    Ok((receiver.stats(), false))
}
