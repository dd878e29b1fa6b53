//! Mock infrastructure for testing
//!
//! Provides test frames, misbehaving registration backends and an isolated
//! runtime directory per test so tests never contend for the same device.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use vcam_core::{
    DeviceBackend, DeviceIdentity, DeviceRegistry, FrameBuffer, FrameTransport, Result,
    SharedMemoryBackend, StreamFormat, VcamError, VirtualCamera,
};

/// Create a test frame with solid color
///
/// # Arguments
/// * `width` - Frame width in pixels
/// * `height` - Frame height in pixels
/// * `color` - BGR color values [B, G, R]
pub fn create_test_frame(width: u32, height: u32, color: [u8; 3]) -> FrameBuffer {
    let mut frame = FrameBuffer::new(width, height).expect("valid test geometry");
    frame.fill(color);
    frame
}

/// Create a test frame with a gradient pattern
pub fn create_gradient_frame(width: u32, height: u32) -> FrameBuffer {
    let mut frame = FrameBuffer::new(width, height).expect("valid test geometry");
    for y in 0..height {
        for x in 0..width {
            let r = ((x as f32 / width as f32) * 255.0) as u8;
            let g = ((y as f32 / height as f32) * 255.0) as u8;
            let b = (((x + y) as f32 / (width + height) as f32) * 255.0) as u8;
            frame.set_pixel(x, y, [b, g, r]);
        }
    }
    frame
}

/// Poll `cond` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// A private runtime directory with a shared-memory registry
pub struct TestRuntime {
    pub dir: TempDir,
    pub registry: DeviceRegistry,
    pub identity: DeviceIdentity,
}

impl TestRuntime {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let registry = DeviceRegistry::shared_memory(dir.path());
        Self {
            dir,
            registry,
            identity: DeviceIdentity::new("testcam").expect("valid name"),
        }
    }

    /// Same directory, different backend
    pub fn with_backend(backend: Arc<dyn DeviceBackend>) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let registry = DeviceRegistry::new(dir.path(), backend);
        Self {
            dir,
            registry,
            identity: DeviceIdentity::new("testcam").expect("valid name"),
        }
    }

    pub fn camera(&self, width: i64, height: i64, framerate: f32) -> Result<VirtualCamera> {
        VirtualCamera::open(&self.registry, &self.identity, width, height, framerate)
    }

    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }
}

impl Default for TestRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Backend whose registration always fails
#[derive(Default)]
pub struct FailingBackend {
    pub attempts: AtomicUsize,
}

impl DeviceBackend for FailingBackend {
    fn register(
        &self,
        identity: &DeviceIdentity,
        _format: &StreamFormat,
    ) -> Result<Arc<dyn FrameTransport>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(VcamError::registration(format!(
            "host rejected '{}'",
            identity
        )))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Shared-memory backend whose unregistration reports failure
pub struct FlakyUnregisterBackend {
    inner: SharedMemoryBackend,
    pub unregisters: Arc<AtomicUsize>,
}

impl FlakyUnregisterBackend {
    pub fn new(runtime_dir: &std::path::Path) -> Self {
        Self {
            inner: SharedMemoryBackend::new(runtime_dir),
            unregisters: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl DeviceBackend for FlakyUnregisterBackend {
    fn register(
        &self,
        identity: &DeviceIdentity,
        format: &StreamFormat,
    ) -> Result<Arc<dyn FrameTransport>> {
        Ok(Arc::new(FlakyTransport {
            inner: self.inner.register(identity, format)?,
            unregisters: Arc::clone(&self.unregisters),
        }))
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

struct FlakyTransport {
    inner: Arc<dyn FrameTransport>,
    unregisters: Arc<AtomicUsize>,
}

impl FrameTransport for FlakyTransport {
    fn publish(&self, image: &[u8]) -> Result<u64> {
        self.inner.publish(image)
    }

    fn consumer_attached(&self) -> Result<bool> {
        self.inner.consumer_attached()
    }

    fn heartbeat(&self) -> Result<()> {
        self.inner.heartbeat()
    }

    fn unregister(&self) -> Result<()> {
        self.unregisters.fetch_add(1, Ordering::SeqCst);
        self.inner.unregister()?;
        Err(VcamError::registration("host refused to remove the device"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_frame_color() {
        let frame = create_test_frame(2, 2, [10, 20, 30]);
        assert_eq!(frame.as_bytes().len(), 2 * 2 * 3);
        assert_eq!(frame.pixel(1, 1), Some([10, 20, 30]));
    }

    #[test]
    fn test_gradient_frame_dimensions() {
        let frame = create_gradient_frame(64, 48);
        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 48);
        assert_ne!(frame.pixel(0, 0), frame.pixel(63, 47));
    }
}
