//! Device registry
//!
//! Enforces one producer per device identity. A claim is two things held
//! together: an exclusive `flock` on `<runtime_dir>/<name>.lock`, which makes
//! the claim system-wide and is dropped by the kernel if the process dies,
//! and an entry in a process-wide table. Host registration is delegated to a
//! [`DeviceBackend`] and happens only once the claim is held.

use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Result, VcamError};
use crate::lockfile::LockFile;
use crate::transport::{DeviceBackend, FrameTransport, SharedMemoryBackend};
use crate::types::{DeviceIdentity, Handle, StreamFormat, default_runtime_dir};

/// Lock paths claimed by this process
static CLAIMS: Mutex<Vec<PathBuf>> = parking_lot::const_mutex(Vec::new());

/// An acquired device
///
/// Dropping a handle that was never released releases it, logging any
/// unregistration failure.
pub struct DeviceHandle {
    handle: Handle,
    identity: DeviceIdentity,
    format: StreamFormat,
    lock: Option<LockFile>,
    transport: Option<Arc<dyn FrameTransport>>,
}

impl DeviceHandle {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn format(&self) -> &StreamFormat {
        &self.format
    }

    /// Delivery path, or `None` once released
    pub fn transport(&self) -> Option<Arc<dyn FrameTransport>> {
        self.transport.clone()
    }

    pub fn is_released(&self) -> bool {
        self.lock.is_none()
    }

    fn release_inner(&mut self) -> Result<()> {
        let Some(lock) = self.lock.take() else {
            return Ok(());
        };

        let result = match self.transport.take() {
            Some(transport) => transport.unregister(),
            None => Ok(()),
        };

        // The claim goes away even if unregistration failed
        CLAIMS.lock().retain(|p| p != lock.path());
        drop(lock);
        debug!("Released '{}' ({})", self.identity, self.handle);
        result
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            warn!("Releasing '{}' on drop: {}", self.identity, e);
        }
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("handle", &self.handle)
            .field("identity", &self.identity)
            .field("format", &self.format)
            .field("released", &self.is_released())
            .finish()
    }
}

/// Claims device identities and registers them with a backend
#[derive(Clone)]
pub struct DeviceRegistry {
    runtime_dir: PathBuf,
    backend: Arc<dyn DeviceBackend>,
}

impl DeviceRegistry {
    /// Registry over `runtime_dir` using a custom backend
    pub fn new(runtime_dir: impl Into<PathBuf>, backend: Arc<dyn DeviceBackend>) -> Self {
        Self {
            runtime_dir: runtime_dir.into(),
            backend,
        }
    }

    /// Registry publishing shared-memory frame buffers in `runtime_dir`
    pub fn shared_memory(runtime_dir: impl Into<PathBuf>) -> Self {
        let runtime_dir = runtime_dir.into();
        let backend = Arc::new(SharedMemoryBackend::new(runtime_dir.clone()));
        Self::new(runtime_dir, backend)
    }

    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Claim `identity` and register it
    ///
    /// Exactly one concurrent caller wins; the rest get `AlreadyInUse`
    /// without side effects. If registration fails the claim is dropped
    /// before the error is returned.
    pub fn acquire(&self, identity: &DeviceIdentity, format: &StreamFormat) -> Result<DeviceHandle> {
        fs::create_dir_all(&self.runtime_dir).map_err(|e| {
            VcamError::registration(format!(
                "failed to create runtime directory {}: {}",
                self.runtime_dir.display(),
                e
            ))
        })?;

        let lock_path = identity.lock_path(&self.runtime_dir);
        let mut claims = CLAIMS.lock();
        if claims.contains(&lock_path) {
            debug!("'{}' is already claimed in this process", identity);
            return Err(VcamError::AlreadyInUse(identity.to_string()));
        }

        let Some(lock) = LockFile::try_acquire(&lock_path)? else {
            debug!("'{}' is held by another process", identity);
            return Err(VcamError::AlreadyInUse(identity.to_string()));
        };

        // On error `lock` drops here, releasing the claim
        let transport = self.backend.register(identity, format)?;

        claims.push(lock_path);
        let handle = Handle::new();
        info!(
            "Acquired '{}' via {} backend ({})",
            identity,
            self.backend.name(),
            handle
        );

        Ok(DeviceHandle {
            handle,
            identity: identity.clone(),
            format: *format,
            lock: Some(lock),
            transport: Some(transport),
        })
    }

    /// Unregister and drop the claim
    ///
    /// Releasing an already released handle is a no-op. The claim is always
    /// dropped; the unregistration outcome is returned.
    pub fn release(&self, handle: &mut DeviceHandle) -> Result<()> {
        handle.release_inner()
    }

    /// Whether any live session holds `identity`
    pub fn is_claimed(&self, identity: &DeviceIdentity) -> Result<bool> {
        let lock_path = identity.lock_path(&self.runtime_dir);
        if CLAIMS.lock().contains(&lock_path) {
            return Ok(true);
        }
        LockFile::is_held(&lock_path)
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::shared_memory(default_runtime_dir())
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("runtime_dir", &self.runtime_dir)
            .field("backend", &self.backend.name())
            .finish()
    }
}
