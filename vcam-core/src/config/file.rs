//! Configuration file loading and saving
//!
//! Loads user configuration from `~/.config/vcam/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{CameraConfig, Preset};
use crate::error::{Result, VcamError};
use crate::frame::RowLayout;
use crate::receiver::DEFAULT_FRAME_TIMEOUT;
use crate::types::{DEFAULT_DEVICE_NAME, DeviceIdentity, default_runtime_dir};

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Device identity and location
    #[serde(default)]
    pub device: DeviceSection,

    /// Stream geometry
    #[serde(default)]
    pub stream: StreamSection,

    /// Consumer-side settings
    #[serde(default)]
    pub receiver: ReceiverSection,
}

/// Device settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSection {
    /// Device name, also the file name stem in the runtime directory
    #[serde(default = "default_device_name")]
    pub name: String,

    /// Override for the runtime directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_dir: Option<PathBuf>,
}

/// Stream settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSection {
    /// Preset name, or "custom" to use the fields below
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Width in pixels (custom preset only)
    #[serde(default = "default_width")]
    pub width: i64,

    /// Height in pixels (custom preset only)
    #[serde(default = "default_height")]
    pub height: i64,

    /// Frame rate, 0 = unpaced (custom preset only)
    #[serde(default = "default_framerate")]
    pub framerate: f32,
}

/// Receiver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiverSection {
    /// How long to wait for a new frame before re-delivering the last one
    #[serde(default = "default_frame_timeout_ms")]
    pub frame_timeout_ms: u64,

    /// Row layout of copied frames: top-down or bottom-up-padded
    #[serde(default)]
    pub layout: RowLayout,
}

// Default value functions
fn default_device_name() -> String {
    DEFAULT_DEVICE_NAME.to_string()
}

fn default_preset() -> String {
    Preset::default().to_string()
}

fn default_width() -> i64 {
    1280
}

fn default_height() -> i64 {
    720
}

fn default_framerate() -> f32 {
    30.0
}

fn default_frame_timeout_ms() -> u64 {
    DEFAULT_FRAME_TIMEOUT.as_millis() as u64
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            name: default_device_name(),
            runtime_dir: None,
        }
    }
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            preset: default_preset(),
            width: default_width(),
            height: default_height(),
            framerate: default_framerate(),
        }
    }
}

impl Default for ReceiverSection {
    fn default() -> Self {
        Self {
            frame_timeout_ms: default_frame_timeout_ms(),
            layout: RowLayout::default(),
        }
    }
}

impl ConfigFile {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("vcam").join("config.toml")
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("vcam")
                .join("config.toml")
        } else {
            PathBuf::from("/etc/vcam/config.toml")
        }
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| VcamError::config(format!("Failed to read config file: {}", e)))?;

        let config: ConfigFile = toml::from_str(&content)
            .map_err(|e| VcamError::config(format!("Failed to parse config file: {}", e)))?;

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load configuration, logging warnings but returning defaults on error
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(Self::default_path())
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    VcamError::config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| VcamError::config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&path, content)
            .map_err(|e| VcamError::config(format!("Failed to write config file: {}", e)))?;

        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Write the commented sample to `path` unless a file is already there
    ///
    /// Returns whether a file was written.
    pub fn write_sample(path: PathBuf, force: bool) -> Result<bool> {
        if path.exists() && !force {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                VcamError::config(format!("Failed to create config directory: {}", e))
            })?;
        }
        std::fs::write(&path, sample_config())
            .map_err(|e| VcamError::config(format!("Failed to write config file: {}", e)))?;
        info!("Wrote sample configuration to {:?}", path);
        Ok(true)
    }

    /// Configured runtime directory, or the per-user default
    pub fn runtime_dir(&self) -> PathBuf {
        self.device
            .runtime_dir
            .clone()
            .unwrap_or_else(default_runtime_dir)
    }

    /// Configured device identity
    pub fn identity(&self) -> Result<DeviceIdentity> {
        DeviceIdentity::new(self.device.name.clone())
            .map_err(|e| VcamError::config(format!("[device] name: {}", e)))
    }

    /// Configured stream preset
    pub fn preset(&self) -> Result<Preset> {
        self.stream
            .preset
            .parse()
            .map_err(|e: String| VcamError::config(format!("[stream] preset: {}", e)))
    }

    /// How long a receiver waits for a fresh frame
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.receiver.frame_timeout_ms)
    }

    /// Camera configuration described by this file
    ///
    /// The geometry is not validated here; see [`CameraConfig::validate`].
    pub fn camera_config(&self) -> Result<CameraConfig> {
        let config = CameraConfig::new(self.stream.width, self.stream.height)
            .with_framerate(self.stream.framerate)
            .with_identity(self.identity()?)
            .with_runtime_dir(self.runtime_dir())
            .with_preset(self.preset()?);
        Ok(config)
    }
}

/// Generate a sample configuration file
pub fn sample_config() -> String {
    r#"# vcam Configuration

[device]
# Device name; lock and frame buffer files are named after it
name = "vcam0"

# Directory for <name>.lock and <name>.frames
# (default: $XDG_RUNTIME_DIR/vcam, or /tmp/vcam-<uid>)
# runtime_dir = "/run/user/1000/vcam"

[stream]
# Preset: qvga30, vga30, 720p30, 720p60, 1080p30, 1080p60, custom
preset = "720p30"

# Used only when preset = "custom"
# Width and height: 1 to 16384 pixels
width = 1280
height = 720

# Frames per second, 0 to 1000 (0 = deliver frames as they are sent)
framerate = 30.0

[receiver]
# Milliseconds to wait for a new frame before repeating the last one
frame_timeout_ms = 500

# Row layout of copied frames: "top-down" or "bottom-up-padded"
layout = "top-down"
"#
    .to_string()
}
