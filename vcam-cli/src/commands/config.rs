//! Config command - manage configuration files

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use vcam_core::config::{ConfigFile, sample_config};

use super::Settings;

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show where the config file and device files live
    Path,

    /// Show the current configuration
    Show,

    /// Generate a default config file
    Init {
        /// Force overwrite if file exists
        #[arg(short, long)]
        force: bool,
    },

    /// Print a sample configuration to stdout
    Sample,
}

/// Run config subcommand
///
/// `settings` is resolved lazily so that a broken config file can still be
/// inspected and regenerated.
pub async fn config(args: ConfigArgs, settings: impl Fn() -> Result<Settings>) -> Result<()> {
    match args.command {
        ConfigCommand::Path => {
            let path = ConfigFile::default_path();
            let state = if path.exists() { "exists" } else { "missing" };
            println!("Config file: {} ({})", path.display(), state);

            // Device files follow the config plus any --device/--runtime-dir overrides
            match settings() {
                Ok(settings) => {
                    let dir = &settings.runtime_dir;
                    println!("Runtime dir: {}", dir.display());
                    println!("Lock file:   {}", settings.identity.lock_path(dir).display());
                    println!("Frames file: {}", settings.identity.frames_path(dir).display());
                }
                Err(e) => println!("Device files unavailable: {:#}", e),
            }
        }
        ConfigCommand::Show => {
            let path = ConfigFile::default_path();
            if path.exists() {
                println!("Settings from {}\n", path.display());
            } else {
                println!("Built-in defaults ({} not found)\n", path.display());
            }

            let settings = settings()?;
            let file = &settings.file;
            println!("  Device:      {}", settings.identity);
            println!("  Runtime dir: {}", settings.runtime_dir.display());
            println!("  Preset:      {}", file.stream.preset);
            match file.camera_config().and_then(|c| c.validate()) {
                Ok(format) => println!("  Stream:      {}", format),
                Err(e) => println!("  Stream:      invalid ({})", e),
            }
            println!("  Timeout:     {:?}", file.frame_timeout());
            println!("  Layout:      {:?}", file.receiver.layout);
        }
        ConfigCommand::Init { force } => {
            let path = ConfigFile::default_path();

            if !ConfigFile::write_sample(path.clone(), force)
                .context("Failed to write config file")?
            {
                println!("Configuration file already exists: {}", path.display());
                println!();
                println!("Use --force to overwrite, or edit the existing file.");
                return Ok(());
            }

            println!("Created configuration file: {}", path.display());
            println!();
            println!("Edit this file to customize vcam settings.");
        }
        ConfigCommand::Sample => {
            print!("{}", sample_config());
        }
    }

    Ok(())
}
