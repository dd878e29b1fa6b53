//! Configuration types for vcam
//!
//! Provides stream presets and the runtime configuration a camera is
//! created from.

mod file;

pub use file::{ConfigFile, DeviceSection, ReceiverSection, StreamSection, sample_config};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::types::{DeviceIdentity, StreamFormat, default_runtime_dir};

/// Stream resolution/framerate preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// 320x240 @ 30fps
    #[serde(rename = "qvga30")]
    Qvga30,
    /// 640x480 @ 30fps
    #[serde(rename = "vga30")]
    Vga30,
    /// 1280x720 @ 30fps (default)
    #[default]
    #[serde(rename = "720p30")]
    P720_30,
    /// 1280x720 @ 60fps
    #[serde(rename = "720p60")]
    P720_60,
    /// 1920x1080 @ 30fps
    #[serde(rename = "1080p30")]
    P1080_30,
    /// 1920x1080 @ 60fps
    #[serde(rename = "1080p60")]
    P1080_60,
    /// Explicit width/height/framerate
    Custom,
}

impl Preset {
    /// Every named preset
    pub const ALL: [Preset; 6] = [
        Self::Qvga30,
        Self::Vga30,
        Self::P720_30,
        Self::P720_60,
        Self::P1080_30,
        Self::P1080_60,
    ];

    /// (width, height, fps), or `None` for [`Preset::Custom`]
    pub fn geometry(&self) -> Option<(u32, u32, f32)> {
        match self {
            Self::Qvga30 => Some((320, 240, 30.0)),
            Self::Vga30 => Some((640, 480, 30.0)),
            Self::P720_30 => Some((1280, 720, 30.0)),
            Self::P720_60 => Some((1280, 720, 60.0)),
            Self::P1080_30 => Some((1920, 1080, 30.0)),
            Self::P1080_60 => Some((1920, 1080, 60.0)),
            Self::Custom => None,
        }
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Qvga30 => "qvga30",
            Self::Vga30 => "vga30",
            Self::P720_30 => "720p30",
            Self::P720_60 => "720p60",
            Self::P1080_30 => "1080p30",
            Self::P1080_60 => "1080p60",
            Self::Custom => "custom",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "qvga30" | "qvga" | "240p30" => Ok(Self::Qvga30),
            "vga30" | "vga" | "480p30" => Ok(Self::Vga30),
            "720p30" => Ok(Self::P720_30),
            "720p60" => Ok(Self::P720_60),
            "1080p30" => Ok(Self::P1080_30),
            "1080p60" => Ok(Self::P1080_60),
            "custom" => Ok(Self::Custom),
            _ => Err(format!("Unknown preset: {}", s)),
        }
    }
}

/// Everything needed to create a camera
///
/// Dimensions stay signed until [`validate`](Self::validate) so that bad
/// values from a config file or command line reach the same checks as any
/// other caller.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraConfig {
    /// Device the camera claims
    pub identity: DeviceIdentity,
    /// Directory holding lock and frame buffer files
    pub runtime_dir: PathBuf,
    /// Preset the geometry came from
    pub preset: Preset,
    /// Width in pixels
    pub width: i64,
    /// Height in pixels
    pub height: i64,
    /// Frame rate (0 = unpaced)
    pub framerate: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self::from_preset(Preset::default())
    }
}

impl CameraConfig {
    /// Custom geometry, unpaced, on the default device
    pub fn new(width: i64, height: i64) -> Self {
        Self {
            identity: DeviceIdentity::default(),
            runtime_dir: default_runtime_dir(),
            preset: Preset::Custom,
            width,
            height,
            framerate: 0.0,
        }
    }

    /// Geometry of a named preset on the default device
    pub fn from_preset(preset: Preset) -> Self {
        Self::new(0, 0).with_preset(preset)
    }

    /// Set the frame rate
    pub fn with_framerate(mut self, framerate: f32) -> Self {
        self.framerate = framerate;
        self
    }

    /// Set the device identity
    pub fn with_identity(mut self, identity: DeviceIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Set the runtime directory
    pub fn with_runtime_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runtime_dir = dir.into();
        self
    }

    /// Apply a preset; [`Preset::Custom`] keeps the current geometry
    pub fn with_preset(mut self, preset: Preset) -> Self {
        self.preset = preset;
        if let Some((width, height, fps)) = preset.geometry() {
            self.width = width as i64;
            self.height = height as i64;
            self.framerate = fps;
        }
        self
    }

    /// Validate the geometry and frame rate
    pub fn validate(&self) -> Result<StreamFormat> {
        StreamFormat::new(self.width, self.height, self.framerate)
    }

    /// Validated stream format
    pub fn format(&self) -> Result<StreamFormat> {
        self.validate()
    }

    /// Settings that work but may surprise
    ///
    /// Returns an empty list when nothing looks off.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.width % 4 != 0 || self.height % 4 != 0 {
            warnings.push(format!(
                "{}x{} is not a multiple of 4; some consumers only accept such sizes",
                self.width, self.height
            ));
        }

        if self.framerate == 0.0 {
            warnings.push(
                "Framerate 0 disables pacing; frames are delivered as fast as they are sent"
                    .to_string(),
            );
        }

        let bytes_per_second =
            self.width.max(0) as f64 * self.height.max(0) as f64 * 3.0 * self.framerate as f64;
        if bytes_per_second > 1_000_000_000.0 {
            warnings.push(format!(
                "{}x{} @ {}fps copies over 1 GB/s through shared memory",
                self.width, self.height, self.framerate
            ));
        }

        warnings
    }
}
