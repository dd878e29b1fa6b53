//! CLI command implementations

mod config;
mod send;
mod status;
mod watch;

pub use config::{ConfigArgs, config};
pub use send::{SendArgs, send};
pub use status::{StatusArgs, status};
pub use watch::{WatchArgs, watch};

use anyhow::{Context, Result};
use std::path::PathBuf;
use vcam_core::{ConfigFile, DeviceIdentity};

/// Config file merged with command-line overrides
pub struct Settings {
    pub file: ConfigFile,
    pub identity: DeviceIdentity,
    pub runtime_dir: PathBuf,
}

impl Settings {
    pub fn resolve(device: Option<String>, runtime_dir: Option<PathBuf>) -> Result<Self> {
        let mut file = ConfigFile::load().context("Failed to load configuration")?;
        if let Some(device) = device {
            file.device.name = device;
        }
        if let Some(dir) = runtime_dir {
            file.device.runtime_dir = Some(dir);
        }

        let identity = file.identity().context("Invalid device name")?;
        let runtime_dir = file.runtime_dir();
        Ok(Self {
            file,
            identity,
            runtime_dir,
        })
    }
}
