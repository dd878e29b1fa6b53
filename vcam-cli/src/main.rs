//! vcam CLI
//!
//! Feed and inspect the virtual camera.
//!
//! # Usage
//!
//! ```bash
//! # Stream a test pattern, waiting up to 10s for a consumer
//! vcam send --preset 720p30 --pattern bars --wait 10
//!
//! # Attach as a consumer and print receive statistics
//! vcam watch
//!
//! # Show whether the device is claimed
//! vcam status --json
//! ```

mod commands;
mod pattern;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use vcam_core::VcamError;

/// vcam - publish synthetic frames as a system webcam
#[derive(Parser)]
#[command(name = "vcam")]
#[command(author = "GhostKellz")]
#[command(version)]
#[command(about = "Feed and inspect the vcam virtual camera", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Device name (overrides [device] name)
    #[arg(long, global = true)]
    device: Option<String>,

    /// Runtime directory (overrides [device] runtime_dir)
    #[arg(long, global = true)]
    runtime_dir: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the camera and stream a test pattern
    Send(commands::SendArgs),

    /// Attach as a consumer and report received frames
    Watch(commands::WatchArgs),

    /// Show whether the device is claimed and its buffer state
    Status(commands::StatusArgs),

    /// Manage the configuration file
    Config(commands::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("vcam={}", level).parse()?)
                .add_directive(format!("vcam_core={}", level).parse()?),
        )
        .with_target(false)
        .init();

    let result = run(cli).await;
    if let Err(e) = &result {
        if let Some(hint) = e
            .chain()
            .find_map(|cause| cause.downcast_ref::<VcamError>())
            .and_then(VcamError::user_hint)
        {
            eprintln!("hint: {}", hint);
        }
    }
    result
}

async fn run(cli: Cli) -> Result<()> {
    let Cli {
        device,
        runtime_dir,
        command,
        ..
    } = cli;
    // Config subcommands work even when the file does not parse
    let settings = || commands::Settings::resolve(device.clone(), runtime_dir.clone());

    match command {
        Commands::Send(args) => commands::send(args, settings()?).await?,
        Commands::Watch(args) => commands::watch(args, settings()?).await?,
        Commands::Status(args) => commands::status(args, settings()?).await?,
        Commands::Config(args) => commands::config(args, settings).await?,
    }

    Ok(())
}
