//! Core types for vcam
//!
//! These types describe the device a producer claims and the fixed stream
//! format every frame pushed through it must match.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, VcamError};

/// Largest accepted width or height, in pixels
pub const MAX_DIMENSION: i64 = 16384;

/// Largest accepted frame rate, in frames per second
pub const MAX_FRAMERATE: f32 = 1000.0;

/// Bytes per pixel (B, G, R)
pub const CHANNELS: usize = 3;

/// Name of the system-wide virtual camera endpoint
pub const DEFAULT_DEVICE_NAME: &str = "vcam0";

/// Global handle counter for unique device claims
static HANDLE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque handle for a device claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    /// Create a new unique handle
    pub fn new() -> Self {
        Self(HANDLE_COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handle({})", self.0)
    }
}

/// Stable key of the virtual camera endpoint exposed to the host
///
/// Names are restricted to ASCII alphanumerics, `-` and `_` because they end
/// up as file names in the runtime directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Create an identity, rejecting names that are not file-name safe
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.len() > 64 {
            return Err(VcamError::invalid_argument(format!(
                "device name must be 1-64 characters, got {:?}",
                name
            )));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(VcamError::invalid_argument(format!(
                "device name may only contain [A-Za-z0-9_-], got {:?}",
                name
            )));
        }
        Ok(Self(name))
    }

    /// The identity name
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Lock file that carries the exclusive claim
    pub fn lock_path(&self, runtime_dir: &std::path::Path) -> PathBuf {
        runtime_dir.join(format!("{}.lock", self.0))
    }

    /// Shared frame buffer consumers attach to
    pub fn frames_path(&self, runtime_dir: &std::path::Path) -> PathBuf {
        runtime_dir.join(format!("{}.frames", self.0))
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self(DEFAULT_DEVICE_NAME.to_string())
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for DeviceIdentity {
    type Error = VcamError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<DeviceIdentity> for String {
    fn from(value: DeviceIdentity) -> Self {
        value.0
    }
}

impl std::str::FromStr for DeviceIdentity {
    type Err = VcamError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Validated stream geometry and reference frame rate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamFormat {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Reference frame rate (0 = frames are delivered as submitted)
    pub framerate: f32,
}

impl StreamFormat {
    /// Validate raw construction arguments
    ///
    /// Dimensions are taken as `i64` so that negative values coming from a
    /// binding layer are reported as `InvalidArgument` instead of wrapping.
    pub fn new(width: i64, height: i64, framerate: f32) -> Result<Self> {
        validate_dimensions(width, height)?;
        validate_framerate(framerate)?;
        Ok(Self {
            width: width as u32,
            height: height as u32,
            framerate,
        })
    }

    /// Bytes in one row of a BGR image
    pub fn row_bytes(&self) -> usize {
        self.width as usize * CHANNELS
    }

    /// Bytes in one BGR image
    pub fn image_size(&self) -> usize {
        self.row_bytes() * self.height as usize
    }

    /// Shape a submitted frame must have: (height, width, channels)
    pub fn shape(&self) -> [usize; 3] {
        [self.height as usize, self.width as usize, CHANNELS]
    }

    /// Interval between frames, if a frame rate is set
    pub fn frame_interval(&self) -> Option<std::time::Duration> {
        if self.framerate > 0.0 {
            Some(std::time::Duration::from_secs_f64(1.0 / self.framerate as f64))
        } else {
            None
        }
    }
}

impl std::fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.framerate > 0.0 {
            write!(f, "{}x{} @ {}fps", self.width, self.height, self.framerate)
        } else {
            write!(f, "{}x{} @ unpaced", self.width, self.height)
        }
    }
}

/// Check width and height against `1..=MAX_DIMENSION`
pub fn validate_dimensions(width: i64, height: i64) -> Result<()> {
    for (name, value) in [("width", width), ("height", height)] {
        if value < 1 {
            return Err(VcamError::invalid_argument(format!(
                "{} must be positive, got {}",
                name, value
            )));
        }
        if value > MAX_DIMENSION {
            return Err(VcamError::invalid_argument(format!(
                "{} must not exceed {}, got {}",
                name, MAX_DIMENSION, value
            )));
        }
    }
    Ok(())
}

/// Check a frame rate against `0..=MAX_FRAMERATE`
pub fn validate_framerate(framerate: f32) -> Result<()> {
    if !framerate.is_finite() || framerate < 0.0 {
        return Err(VcamError::invalid_argument(format!(
            "framerate must be a non-negative number, got {}",
            framerate
        )));
    }
    if framerate > MAX_FRAMERATE {
        return Err(VcamError::invalid_argument(format!(
            "framerate must not exceed {}, got {}",
            MAX_FRAMERATE, framerate
        )));
    }
    Ok(())
}

/// Directory holding device lock and frame files
///
/// Uses XDG_RUNTIME_DIR if available, otherwise a per-user directory in /tmp
pub fn default_runtime_dir() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join("vcam")
    } else {
        // SAFETY: libc::getuid() is a simple syscall that returns the real user ID.
        // It has no preconditions and cannot fail (always returns a valid uid_t).
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/tmp/vcam-{}", uid))
    }
}
