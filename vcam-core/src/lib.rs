//! vcam Core Library
//!
//! Publish synthetic frames as a system webcam.
//!
//! This library provides:
//! - A device registry that allows one producer per virtual camera
//! - A camera session with frame validation, pacing and teardown
//! - A shared-memory transport with latest-frame-wins delivery
//! - A receiver that consumers use to attach and pull frames
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────────┐    ┌─────────────────┐
//! │ VirtualCamera   │───▶│ <name>.frames (shm) │───▶│ CameraReceiver  │
//! │ (producer)      │    │ header + BGR image  │    │ (consumer)      │
//! └─────────────────┘    └─────────────────────┘    └─────────────────┘
//!         │ acquire/release        ▲ heartbeat / connected
//!         ▼                        │
//! ┌─────────────────┐    ┌─────────────────────┐
//! │ DeviceRegistry  │    │ Watchdog thread     │
//! │ (<name>.lock)   │    │ → ConnectionState   │
//! └─────────────────┘    └─────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use vcam_core::{FrameBuffer, VirtualCamera};
//!
//! let camera = VirtualCamera::create(320, 240, 30.0)?;
//! camera.wait_for_connection(Some(Duration::from_secs(5)))?;
//! let mut image = FrameBuffer::new(320, 240)?;
//! image.fill([255, 0, 0]);
//! camera.send_frame(image.as_frame())?;
//! camera.delete();
//! # Ok::<(), vcam_core::VcamError>(())
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod lockfile;
pub mod output;
pub mod performance;
pub mod receiver;
pub mod registry;
pub mod transport;
pub mod types;

pub use config::{CameraConfig, ConfigFile, Preset};
pub use connection::{ConnectionState, WaitOutcome};
pub use error::{Result, ResultExt, VcamError};
pub use frame::{Frame, FrameBuffer, RowLayout};
pub use output::{FramePacer, VirtualCamera};
pub use performance::{ReceiveStats, SendStats};
pub use receiver::{CameraReceiver, DEFAULT_FRAME_TIMEOUT, FrameInfo, Pulled};
pub use registry::{DeviceHandle, DeviceRegistry};
pub use transport::{BufferInfo, DeviceBackend, FrameTransport, SharedMemoryBackend};
pub use types::{
    CHANNELS, DEFAULT_DEVICE_NAME, DeviceIdentity, Handle, MAX_DIMENSION, MAX_FRAMERATE,
    StreamFormat, default_runtime_dir,
};
