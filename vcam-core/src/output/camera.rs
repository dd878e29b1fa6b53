//! Virtual camera session
//!
//! The object a producer holds. It owns the device claim, the consumer
//! connection state and the transport frames are published through.
//!
//! Every operation first checks a single `deleted` flag. [`VirtualCamera::delete`]
//! flips it before tearing anything down, so concurrent calls either finish
//! against the live transport or fail with `InvalidState("deleted")`.

use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use super::pacing::FramePacer;
use crate::config::CameraConfig;
use crate::connection::{ConnectionState, WaitOutcome};
use crate::error::{Result, VcamError};
use crate::frame::Frame;
use crate::performance::{SendMetrics, SendStats};
use crate::registry::{DeviceHandle, DeviceRegistry};
use crate::transport::{FrameTransport, Watchdog};
use crate::types::{DeviceIdentity, StreamFormat};

/// A registered virtual camera
///
/// All methods take `&self`; share it across threads with an `Arc`.
/// Dropping the camera deletes it.
pub struct VirtualCamera {
    identity: DeviceIdentity,
    format: StreamFormat,
    registry: DeviceRegistry,
    deleted: AtomicBool,
    connection: Arc<ConnectionState>,
    /// Taken by `delete`; publishes hold the read side
    transport: RwLock<Option<Arc<dyn FrameTransport>>>,
    device: Mutex<Option<DeviceHandle>>,
    watchdog: Mutex<Option<Watchdog>>,
    pacer: Mutex<FramePacer>,
    metrics: SendMetrics,
}

impl VirtualCamera {
    /// Create the default device in the default runtime directory
    pub fn create(width: i64, height: i64, framerate: f32) -> Result<Self> {
        Self::open(
            &DeviceRegistry::default(),
            &DeviceIdentity::default(),
            width,
            height,
            framerate,
        )
    }

    /// Create a camera as described by `config`
    pub fn from_config(config: &CameraConfig) -> Result<Self> {
        let registry = DeviceRegistry::shared_memory(&config.runtime_dir);
        Self::open(
            &registry,
            &config.identity,
            config.width,
            config.height,
            config.framerate,
        )
    }

    /// Create a camera on `identity` through `registry`
    ///
    /// Arguments are validated before anything is claimed. Fails with
    /// `AlreadyInUse` while another live camera holds the identity.
    pub fn open(
        registry: &DeviceRegistry,
        identity: &DeviceIdentity,
        width: i64,
        height: i64,
        framerate: f32,
    ) -> Result<Self> {
        let format = StreamFormat::new(width, height, framerate)?;
        let mut device = registry.acquire(identity, &format)?;

        let transport = device
            .transport()
            .ok_or_else(|| VcamError::registration("backend returned a released device"))?;
        let connection = Arc::new(ConnectionState::new());

        let watchdog = match Watchdog::spawn(Arc::clone(&transport), Arc::clone(&connection)) {
            Ok(watchdog) => watchdog,
            Err(e) => {
                if let Err(release_err) = registry.release(&mut device) {
                    warn!("Rolling back '{}': {}", identity, release_err);
                }
                return Err(e);
            }
        };

        info!("Virtual camera '{}' created: {}", identity, format);

        Ok(Self {
            identity: identity.clone(),
            format,
            registry: registry.clone(),
            deleted: AtomicBool::new(false),
            connection,
            transport: RwLock::new(Some(transport)),
            device: Mutex::new(Some(device)),
            watchdog: Mutex::new(Some(watchdog)),
            pacer: Mutex::new(FramePacer::new(format.framerate)),
            metrics: SendMetrics::new(),
        })
    }

    fn ensure_live(&self) -> Result<()> {
        if self.deleted.load(Ordering::Acquire) {
            Err(VcamError::deleted())
        } else {
            Ok(())
        }
    }

    /// Publish a frame
    ///
    /// The frame must be exactly `(height, width, 3)`. With a frame rate set,
    /// the call first sleeps as needed to keep the cadence (at most one
    /// interval). The pixels have been copied out by the time this returns.
    pub fn send_frame(&self, frame: Frame<'_>) -> Result<()> {
        self.ensure_live()?;
        if let Err(e) = frame.validate_against(self.format.width, self.format.height) {
            self.metrics.record_rejected();
            return Err(e);
        }

        let slept = self.pacer.lock().pace();
        if !slept.is_zero() {
            self.metrics.record_paced(slept);
        }

        let guard = self.transport.read();
        let transport = match guard.as_ref() {
            Some(transport) if !self.deleted.load(Ordering::Acquire) => transport,
            _ => return Err(VcamError::deleted()),
        };
        let sequence = transport.publish(frame.data())?;
        drop(guard);

        self.metrics.record_sent(sequence, Instant::now());
        trace!("Published frame {} on '{}'", sequence, self.identity);
        Ok(())
    }

    /// Whether a consumer is attached right now
    pub fn is_connected(&self) -> Result<bool> {
        self.ensure_live()?;
        Ok(self.connection.is_connected())
    }

    /// Block until a consumer attaches
    ///
    /// `None` waits indefinitely, `Some(Duration::ZERO)` polls once.
    /// Returns `Ok(false)` on timeout. Deleting the camera from another
    /// thread ends the wait with `InvalidState`.
    pub fn wait_for_connection(&self, timeout: Option<Duration>) -> Result<bool> {
        self.ensure_live()?;
        debug!("Waiting for a consumer on '{}' ({:?})", self.identity, timeout);
        match self.connection.wait(timeout) {
            WaitOutcome::Connected => Ok(true),
            WaitOutcome::TimedOut => Ok(false),
            WaitOutcome::Closed => Err(VcamError::deleted()),
        }
    }

    /// Tear the camera down; later calls are no-ops
    ///
    /// Never fails. Unregistration problems are logged and the identity is
    /// released regardless.
    pub fn delete(&self) {
        if self.deleted.swap(true, Ordering::AcqRel) {
            return;
        }

        self.connection.close();

        if let Some(mut watchdog) = self.watchdog.lock().take() {
            watchdog.stop();
        }

        // Waits for in-flight publishes to finish
        self.transport.write().take();

        if let Some(mut device) = self.device.lock().take() {
            if let Err(e) = self.registry.release(&mut device) {
                warn!("Unregistering '{}' failed: {}", self.identity, e);
            }
        }

        let stats = self.metrics.stats();
        info!(
            "Virtual camera '{}' deleted ({})",
            self.identity,
            stats.format_line()
        );
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn format(&self) -> &StreamFormat {
        &self.format
    }

    pub fn width(&self) -> u32 {
        self.format.width
    }

    pub fn height(&self) -> u32 {
        self.format.height
    }

    pub fn framerate(&self) -> f32 {
        self.format.framerate
    }

    /// Runtime directory the device is registered in
    pub fn runtime_dir(&self) -> &Path {
        self.registry.runtime_dir()
    }

    /// Delivery statistics so far
    pub fn stats(&self) -> SendStats {
        self.metrics.stats()
    }
}

impl Drop for VirtualCamera {
    fn drop(&mut self) {
        self.delete();
    }
}

impl std::fmt::Debug for VirtualCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualCamera")
            .field("identity", &self.identity)
            .field("format", &self.format)
            .field("deleted", &self.is_deleted())
            .finish()
    }
}
