//! Consumer side of a virtual camera
//!
//! A [`CameraReceiver`] maps a producer's frame buffer, marks itself attached
//! (which the producer's watchdog turns into a connection event) and pulls
//! the latest frame on its own cadence. Re-reading without a new frame
//! re-delivers the previous image; frames published between two reads are
//! skipped.

use std::io;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{Result, VcamError};
use crate::frame::{FrameBuffer, RowLayout, copy_image};
use crate::performance::{ReceiveMetrics, ReceiveStats};
use crate::transport::{BufferHeader, BufferInfo, HeartbeatMonitor, SharedBuffer, SharedMemoryBackend};
use crate::types::{DeviceIdentity, StreamFormat};

/// Default wait for a fresh frame before re-delivering the last one
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_millis(500);

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Metadata of a delivered frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Producer sequence number (0 = nothing published yet)
    pub sequence: u64,
    /// When the producer wrote it, ns since the UNIX epoch
    pub timestamp_ns: u64,
    /// False if this frame was already delivered before
    pub fresh: bool,
}

/// Result of [`CameraReceiver::pull`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pulled {
    /// The receiver's image holds this frame
    Frame(FrameInfo),
    /// The producer is gone; the image holds the darkened last frame
    SourceInactive,
}

/// Attachment to a producer's shared frame buffer
pub struct CameraReceiver {
    identity: DeviceIdentity,
    format: StreamFormat,
    buffer: SharedBuffer,
    monitor: HeartbeatMonitor,
    last_sequence: u64,
    image: FrameBuffer,
    source_lost: bool,
    metrics: ReceiveMetrics,
}

impl CameraReceiver {
    /// Attach to the device registered as `identity` under `runtime_dir`
    ///
    /// Fails with `DeviceNotFound` if no producer has it registered.
    pub fn open(runtime_dir: &Path, identity: &DeviceIdentity) -> Result<Self> {
        let path = identity.frames_path(runtime_dir);
        let buffer = match SharedBuffer::open(&path) {
            Ok(buffer) => buffer,
            Err(VcamError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                return Err(VcamError::DeviceNotFound(identity.to_string()));
            }
            Err(e) => return Err(e),
        };

        let header = buffer.update_header(|h| {
            if h.active != 0 {
                h.connected = 1;
            }
            *h
        })?;
        if header.active == 0 {
            return Err(VcamError::DeviceNotFound(identity.to_string()));
        }

        let format = header.format();
        let image = FrameBuffer::new(format.width, format.height)?;
        info!(
            "Attached to '{}' ({}, producer pid {})",
            identity, format, header.producer_pid
        );

        Ok(Self {
            identity: identity.clone(),
            format,
            buffer,
            monitor: HeartbeatMonitor::default(),
            last_sequence: 0,
            image,
            source_lost: false,
            metrics: ReceiveMetrics::new(),
        })
    }

    /// Read a device's header without attaching
    pub fn inspect(runtime_dir: &Path, identity: &DeviceIdentity) -> Result<Option<BufferInfo>> {
        SharedMemoryBackend::inspect(runtime_dir, identity)
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

    /// Producer frame rate, clamped to 1..=1000 for consumers that need a
    /// nominal rate
    pub fn framerate(&self) -> f32 {
        self.format.framerate.clamp(1.0, 1000.0)
    }

    fn alive(&mut self, header: &BufferHeader) -> bool {
        header.active != 0 && self.monitor.observe(header.heartbeat)
    }

    /// Producer registered and its heartbeat still moving
    pub fn is_active(&mut self) -> Result<bool> {
        let header = self.buffer.header()?;
        Ok(self.alive(&header))
    }

    /// Wait for a frame newer than the last one delivered
    ///
    /// Returns `true` when one arrives or when `timeout` elapses (the caller
    /// then re-delivers the last frame), `false` once the producer is
    /// inactive or dead. `None` waits for as long as the producer lives.
    pub fn wait_for_new_frame(&mut self, timeout: Option<Duration>) -> Result<bool> {
        let start = Instant::now();
        loop {
            let header = self.buffer.header()?;
            if !self.alive(&header) {
                return Ok(false);
            }
            if header.sequence > self.last_sequence {
                return Ok(true);
            }
            if timeout.is_some_and(|t| start.elapsed() >= t) {
                return Ok(true);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Copy the latest frame into `out`
    ///
    /// `out` must hold `layout.buffer_size(width, height)` bytes.
    pub fn read_frame(&mut self, out: &mut [u8], layout: RowLayout) -> Result<FrameInfo> {
        let (sequence, timestamp_ns) = read_latest(&self.buffer, &self.format, out, layout)?;
        Ok(self.record(sequence, timestamp_ns))
    }

    fn record(&mut self, sequence: u64, timestamp_ns: u64) -> FrameInfo {
        let info = FrameInfo {
            sequence,
            timestamp_ns,
            fresh: sequence > self.last_sequence,
        };
        self.last_sequence = self.last_sequence.max(sequence);
        self.metrics
            .record_frame(info.sequence, info.fresh, Instant::now());
        info
    }

    /// Wait for and copy the next frame into the receiver's own image
    ///
    /// Once the producer goes away the last image is darkened and kept as
    /// a placeholder.
    pub fn pull(&mut self, timeout: Option<Duration>) -> Result<Pulled> {
        if !self.source_lost && self.wait_for_new_frame(timeout)? {
            let (sequence, timestamp_ns) = read_latest(
                &self.buffer,
                &self.format,
                self.image.as_bytes_mut(),
                RowLayout::TopDown,
            )?;
            return Ok(Pulled::Frame(self.record(sequence, timestamp_ns)));
        }

        if !self.source_lost {
            self.source_lost = true;
            // Keep whatever the producer wrote last as the placeholder
            match read_latest(
                &self.buffer,
                &self.format,
                self.image.as_bytes_mut(),
                RowLayout::TopDown,
            ) {
                Ok((sequence, timestamp_ns)) => {
                    self.record(sequence, timestamp_ns);
                }
                Err(e) => warn!("Reading final frame from '{}': {}", self.identity, e),
            }
            self.image.darken();
            info!("Source '{}' went inactive", self.identity);
        }
        self.metrics.record_inactive();
        Ok(Pulled::SourceInactive)
    }

    /// Image filled by [`pull`](Self::pull)
    pub fn image(&self) -> &FrameBuffer {
        &self.image
    }

    /// Whether [`pull`](Self::pull) has seen the producer go away
    pub fn is_source_lost(&self) -> bool {
        self.source_lost
    }

    /// Sequence of the last delivered frame
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    pub fn stats(&self) -> ReceiveStats {
        self.metrics.stats()
    }
}

fn read_latest(
    buffer: &SharedBuffer,
    format: &StreamFormat,
    out: &mut [u8],
    layout: RowLayout,
) -> Result<(u64, u64)> {
    let (width, height) = (format.width as usize, format.height as usize);
    buffer.read_image(|header, image| {
        copy_image(image, width, height, out, layout).map(|()| (header.sequence, header.timestamp_ns))
    })?
}

impl Drop for CameraReceiver {
    fn drop(&mut self) {
        match self.buffer.update_header(|h| h.connected = 0) {
            Ok(()) => debug!("Detached from '{}'", self.identity),
            Err(e) => warn!("Detaching from '{}': {}", self.identity, e),
        }
    }
}

impl std::fmt::Debug for CameraReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraReceiver")
            .field("identity", &self.identity)
            .field("format", &self.format)
            .field("path", &self.buffer.path())
            .field("last_sequence", &self.last_sequence)
            .finish()
    }
}
