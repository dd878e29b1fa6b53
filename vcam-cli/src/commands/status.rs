//! Status command - show whether the device is claimed

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use vcam_core::{BufferInfo, CameraReceiver, DeviceRegistry};

use super::Settings;

/// Arguments for the status command
#[derive(Args)]
pub struct StatusArgs {
    /// Print machine-readable JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct StatusReport {
    device: String,
    runtime_dir: PathBuf,
    claimed: bool,
    buffer: Option<BufferInfo>,
}

/// Show device and buffer state
pub async fn status(args: StatusArgs, settings: Settings) -> Result<()> {
    let registry = DeviceRegistry::shared_memory(&settings.runtime_dir);
    let claimed = registry
        .is_claimed(&settings.identity)
        .context("Failed to check device lock")?;
    let buffer = CameraReceiver::inspect(&settings.runtime_dir, &settings.identity)
        .context("Failed to read frame buffer")?;

    let report = StatusReport {
        device: settings.identity.to_string(),
        runtime_dir: settings.runtime_dir,
        claimed,
        buffer,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("vcam - Status\n");
    println!("  Device:      {}", report.device);
    println!("  Runtime dir: {}", report.runtime_dir.display());
    println!(
        "  State:       {}",
        if report.claimed { "claimed" } else { "free" }
    );

    match &report.buffer {
        Some(info) => {
            println!();
            println!("Frame buffer: {}", info.path.display());
            println!("  Resolution:  {}x{}", info.width, info.height);
            println!("  Framerate:   {} fps", info.framerate);
            println!("  Active:      {}", info.active);
            println!("  Consumer:    {}", if info.connected { "attached" } else { "none" });
            println!("  Producer:    pid {}", info.producer_pid);
            println!("  Frames:      {}", info.sequence);
            if info.timestamp_ns > 0 {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_nanos() as u64)
                    .unwrap_or(0);
                let age_ms = now.saturating_sub(info.timestamp_ns) / 1_000_000;
                println!("  Last frame:  {} ms ago", age_ms);
            }
            if !report.claimed {
                println!();
                println!("Note: no producer holds the device; this buffer is stale.");
            }
        }
        None => {
            println!();
            println!("No frame buffer. Start a producer with:");
            println!("  vcam send");
        }
    }

    Ok(())
}
