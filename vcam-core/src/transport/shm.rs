//! Shared-memory frame buffer
//!
//! File layout:
//!
//! ```text
//! 0              56            64                          64 + w*h*3
//! | BufferHeader | (reserved)  | BGR image, rows top-down  |
//! ```
//!
//! All header and image access happens with the in-process mutex held and an
//! exclusive `flock` on the mapped file, so producer and consumers never see a
//! torn header or a half-written image.

use bytemuck::{Pod, Zeroable};
use memmap2::{MmapMut, MmapOptions};
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use super::{DeviceBackend, FrameTransport};
use crate::error::{Result, VcamError};
use crate::lockfile::FlockGuard;
use crate::types::{DeviceIdentity, StreamFormat, validate_dimensions};

/// "VCAM" little-endian
pub const MAGIC: u32 = u32::from_le_bytes(*b"VCAM");

/// Header layout version
pub const LAYOUT_VERSION: u32 = 1;

/// Byte offset of the image inside the buffer file
pub const IMAGE_OFFSET: usize = 64;

const HEADER_SIZE: usize = std::mem::size_of::<BufferHeader>();

const _: () = assert!(HEADER_SIZE <= IMAGE_OFFSET);

/// Fixed header at the start of every frame buffer file
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BufferHeader {
    pub magic: u32,
    pub version: u32,
    pub image_offset: u32,
    pub width: u32,
    pub height: u32,
    pub framerate: f32,
    /// Non-zero while the producer has the device registered
    pub active: u32,
    /// Non-zero while a consumer is attached
    pub connected: u32,
    /// Bumped by the producer watchdog
    pub heartbeat: u32,
    pub producer_pid: u32,
    /// Sequence of the last written frame; 0 = nothing written yet
    pub sequence: u64,
    /// Wall clock time of the last write, ns since the UNIX epoch
    pub timestamp_ns: u64,
}

impl BufferHeader {
    fn new(format: &StreamFormat) -> Self {
        Self {
            magic: MAGIC,
            version: LAYOUT_VERSION,
            image_offset: IMAGE_OFFSET as u32,
            width: format.width,
            height: format.height,
            framerate: format.framerate,
            active: 1,
            connected: 0,
            heartbeat: 0,
            producer_pid: std::process::id(),
            sequence: 0,
            timestamp_ns: 0,
        }
    }

    /// Geometry as a [`StreamFormat`]
    pub fn format(&self) -> StreamFormat {
        StreamFormat {
            width: self.width,
            height: self.height,
            framerate: self.framerate,
        }
    }

    fn image_size(&self) -> usize {
        self.format().image_size()
    }
}

/// Header snapshot for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct BufferInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub framerate: f32,
    pub active: bool,
    pub connected: bool,
    pub heartbeat: u32,
    pub producer_pid: u32,
    pub sequence: u64,
    pub timestamp_ns: u64,
}

impl BufferInfo {
    fn from_header(path: &Path, header: &BufferHeader) -> Self {
        Self {
            path: path.to_path_buf(),
            width: header.width,
            height: header.height,
            framerate: header.framerate,
            active: header.active != 0,
            connected: header.connected != 0,
            heartbeat: header.heartbeat,
            producer_pid: header.producer_pid,
            sequence: header.sequence,
            timestamp_ns: header.timestamp_ns,
        }
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// A mapped frame buffer file
pub(crate) struct SharedBuffer {
    path: PathBuf,
    file: File,
    map: Mutex<MmapMut>,
}

impl SharedBuffer {
    /// Create (or replace) the buffer for `format` at `path`
    ///
    /// The file is fully initialised under a temporary name and then renamed
    /// into place, so a reader either sees the old file or a complete new one.
    pub(crate) fn create(path: &Path, format: &StreamFormat) -> Result<Self> {
        let tmp_path = path.with_extension(format!("frames.tmp-{}", std::process::id()));
        let len = IMAGE_OFFSET + format.image_size();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.set_len(len as u64)?;

        // SAFETY: the file was just created by us and sized to `len`; other
        // processes only touch it under the flock taken in `with_map`.
        let mut map = unsafe { MmapOptions::new().len(len).map_mut(&file)? };
        map[..HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(&BufferHeader::new(format)));
        map.flush()?;

        if let Err(e) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        debug!("Created frame buffer {} ({} bytes)", path.display(), len);
        Ok(Self {
            path: path.to_path_buf(),
            file,
            map: Mutex::new(map),
        })
    }

    /// Map an existing buffer, validating its header
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len() as usize;
        if len < IMAGE_OFFSET {
            return Err(VcamError::transport(format!(
                "{} is too short to hold a frame buffer header",
                path.display()
            )));
        }

        // SAFETY: the mapping length is the current file length, and every
        // access goes through `with_map`, which holds the flock.
        let map = unsafe { MmapOptions::new().len(len).map_mut(&file)? };
        let buffer = Self {
            path: path.to_path_buf(),
            file,
            map: Mutex::new(map),
        };

        let header = buffer.header()?;
        if header.magic != MAGIC {
            return Err(VcamError::transport(format!(
                "{} is not a frame buffer (bad magic {:#x})",
                path.display(),
                header.magic
            )));
        }
        if header.version != LAYOUT_VERSION || header.image_offset as usize != IMAGE_OFFSET {
            return Err(VcamError::transport(format!(
                "{} has unsupported layout version {}",
                path.display(),
                header.version
            )));
        }
        validate_dimensions(header.width as i64, header.height as i64)
            .map_err(|e| VcamError::transport(format!("{}: {}", path.display(), e)))?;
        if len < IMAGE_OFFSET + header.image_size() {
            return Err(VcamError::transport(format!(
                "{} is truncated: {} bytes for a {}x{} image",
                path.display(),
                len,
                header.width,
                header.height
            )));
        }
        Ok(buffer)
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    fn with_map<R>(&self, f: impl FnOnce(&mut MmapMut) -> R) -> Result<R> {
        let mut map = self.map.lock();
        let _flock = FlockGuard::exclusive(&self.file)?;
        Ok(f(&mut map))
    }

    /// Current header
    pub(crate) fn header(&self) -> Result<BufferHeader> {
        self.with_map(|map| bytemuck::pod_read_unaligned(&map[..HEADER_SIZE]))
    }

    /// Read-modify-write the header
    pub(crate) fn update_header<R>(&self, f: impl FnOnce(&mut BufferHeader) -> R) -> Result<R> {
        self.with_map(|map| {
            let mut header: BufferHeader = bytemuck::pod_read_unaligned(&map[..HEADER_SIZE]);
            let out = f(&mut header);
            map[..HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(&header));
            out
        })
    }

    /// Copy `image` into the slot and advance the sequence
    pub(crate) fn write_image(&self, image: &[u8]) -> Result<u64> {
        self.with_map(|map| {
            let mut header: BufferHeader = bytemuck::pod_read_unaligned(&map[..HEADER_SIZE]);
            if image.len() != header.image_size() {
                return Err(VcamError::invalid_frame(format!(
                    "image holds {} bytes, buffer expects {}",
                    image.len(),
                    header.image_size()
                )));
            }
            map[IMAGE_OFFSET..IMAGE_OFFSET + image.len()].copy_from_slice(image);
            header.sequence += 1;
            header.timestamp_ns = now_ns();
            map[..HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(&header));
            Ok(header.sequence)
        })?
    }

    /// Run `f` over the header and the current image
    pub(crate) fn read_image<R>(&self, f: impl FnOnce(&BufferHeader, &[u8]) -> R) -> Result<R> {
        self.with_map(|map| {
            let header: BufferHeader = bytemuck::pod_read_unaligned(&map[..HEADER_SIZE]);
            let image = &map[IMAGE_OFFSET..IMAGE_OFFSET + header.image_size()];
            f(&header, image)
        })
    }
}

/// Producer side of a shared-memory device
struct ShmTransport {
    buffer: SharedBuffer,
}

impl FrameTransport for ShmTransport {
    fn publish(&self, image: &[u8]) -> Result<u64> {
        self.buffer.write_image(image)
    }

    fn consumer_attached(&self) -> Result<bool> {
        Ok(self.buffer.header()?.connected != 0)
    }

    fn heartbeat(&self) -> Result<()> {
        self.buffer.update_header(|h| h.heartbeat = h.heartbeat.wrapping_add(1))
    }

    fn unregister(&self) -> Result<()> {
        self.buffer.update_header(|h| h.active = 0)?;
        match fs::remove_file(self.buffer.path()) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Frame buffer {} already removed", self.buffer.path().display());
            }
            Err(e) => {
                return Err(VcamError::registration(format!(
                    "failed to remove {}: {}",
                    self.buffer.path().display(),
                    e
                )));
            }
        }
        debug!("Unregistered frame buffer {}", self.buffer.path().display());
        Ok(())
    }
}

/// Default backend: one shared-memory frame buffer per device
#[derive(Debug, Clone)]
pub struct SharedMemoryBackend {
    runtime_dir: PathBuf,
}

impl SharedMemoryBackend {
    pub fn new(runtime_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime_dir: runtime_dir.into(),
        }
    }

    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    /// Read a device's header without attaching to it
    ///
    /// Returns `Ok(None)` when no frame buffer exists for the identity.
    pub fn inspect(runtime_dir: &Path, identity: &DeviceIdentity) -> Result<Option<BufferInfo>> {
        let path = identity.frames_path(runtime_dir);
        match SharedBuffer::open(&path) {
            Ok(buffer) => Ok(Some(BufferInfo::from_header(&path, &buffer.header()?))),
            Err(VcamError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl DeviceBackend for SharedMemoryBackend {
    fn register(
        &self,
        identity: &DeviceIdentity,
        format: &StreamFormat,
    ) -> Result<Arc<dyn FrameTransport>> {
        let path = identity.frames_path(&self.runtime_dir);
        if path.exists() {
            warn!("Replacing stale frame buffer {}", path.display());
        }
        let buffer = SharedBuffer::create(&path, format).map_err(|e| {
            VcamError::registration(format!("failed to publish {}: {}", path.display(), e))
        })?;
        info!("Registered '{}' at {} ({})", identity, path.display(), format);
        Ok(Arc::new(ShmTransport { buffer }))
    }

    fn name(&self) -> &'static str {
        "shared-memory"
    }
}
