//! Frame transport between a producer and its consumers
//!
//! A [`DeviceBackend`] performs the host-side registration of a device and
//! hands back a [`FrameTransport`], through which the camera publishes
//! frames. The default backend exposes every device as a shared-memory frame
//! buffer in the runtime directory:
//!
//! ```text
//! ┌───────────────┐            ┌─────────────────────────┐            ┌────────────────┐
//! │ VirtualCamera │──publish──▶│ <runtime>/<name>.frames │◀───read────│ CameraReceiver │
//! │  + watchdog   │◀─connected─│ header | latest image   │───attach──▶│  (consumer)    │
//! └───────────────┘            └─────────────────────────┘            └────────────────┘
//! ```
//!
//! Delivery is latest-frame-wins: there is a single image slot and a
//! sequence counter, so a slow consumer skips frames and a fast one re-reads
//! the last image.

mod shm;
mod watchdog;

use std::sync::Arc;

use crate::error::Result;
use crate::types::{DeviceIdentity, StreamFormat};

pub use shm::{BufferHeader, BufferInfo, IMAGE_OFFSET, LAYOUT_VERSION, MAGIC, SharedMemoryBackend};
pub(crate) use shm::SharedBuffer;
pub use watchdog::{HEARTBEAT_INTERVAL, HEARTBEAT_TIMEOUT, HeartbeatMonitor, Watchdog};

/// Registers devices with the host video subsystem
pub trait DeviceBackend: Send + Sync {
    /// Declare the device and open its delivery path
    fn register(
        &self,
        identity: &DeviceIdentity,
        format: &StreamFormat,
    ) -> Result<Arc<dyn FrameTransport>>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Delivery path of one registered device
pub trait FrameTransport: Send + Sync {
    /// Copy a packed BGR image into the delivery path
    ///
    /// Returns the sequence number assigned to the frame. The caller's
    /// buffer is no longer referenced once this returns.
    fn publish(&self, image: &[u8]) -> Result<u64>;

    /// Whether a consumer currently reports itself attached
    fn consumer_attached(&self) -> Result<bool>;

    /// Signal producer liveness to consumers
    fn heartbeat(&self) -> Result<()>;

    /// Withdraw the device from the host; consumers see it go inactive
    fn unregister(&self) -> Result<()>;
}
