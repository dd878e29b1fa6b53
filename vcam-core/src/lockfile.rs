//! Advisory file locks
//!
//! `flock(2)` locks belong to the open file description, so two opens of the
//! same path conflict even inside one process, and the kernel drops the lock
//! when the owning process exits.
//!
//! The holder writes its pid into the file so that observers can tell
//! whether the lock is taken without touching the lock themselves.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Result, VcamError};

fn flock(file: &File, op: libc::c_int) -> io::Result<()> {
    loop {
        // SAFETY: the descriptor is owned by `file` and stays open for the call
        let ret = unsafe { libc::flock(file.as_raw_fd(), op) };
        if ret == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EWOULDBLOCK)
}

fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 only checks that the process exists
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

fn write_owner(mut file: &File) -> io::Result<()> {
    file.set_len(0)?;
    write!(file, "{}", std::process::id())?;
    file.flush()
}

/// Exclusive lock on a path, held until dropped
#[derive(Debug)]
pub struct LockFile {
    file: File,
    path: PathBuf,
}

impl LockFile {
    /// Try to take the lock without blocking
    ///
    /// Returns `Ok(None)` if someone else holds it. The file is created if
    /// missing and never removed, so a waiting process cannot end up locking
    /// an unlinked inode.
    pub fn try_acquire(path: impl Into<PathBuf>) -> Result<Option<Self>> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                VcamError::registration(format!("failed to open {}: {}", path.display(), e))
            })?;

        match flock(&file, libc::LOCK_EX | libc::LOCK_NB) {
            Ok(()) => {
                let lock = Self { file, path };
                write_owner(&lock.file).map_err(|e| {
                    VcamError::registration(format!(
                        "failed to record owner in {}: {}",
                        lock.path.display(),
                        e
                    ))
                })?;
                debug!("Locked {}", lock.path.display());
                Ok(Some(lock))
            }
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(VcamError::registration(format!(
                "failed to lock {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Whether a live process has the lock
    ///
    /// Reads the recorded owner pid without calling `flock`, so a concurrent
    /// [`try_acquire`](Self::try_acquire) never mistakes an observer for a
    /// holder. A holder that crashed leaves its pid behind; it counts as
    /// free once that process is gone.
    pub fn is_held(path: &Path) -> Result<bool> {
        let mut contents = String::new();
        match File::open(path).and_then(|mut f| f.read_to_string(&mut contents)) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        Ok(contents
            .trim()
            .parse::<u32>()
            .is_ok_and(process_alive))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        // Clear the owner while still holding the lock
        let _ = self.file.set_len(0);
        let _ = flock(&self.file, libc::LOCK_UN);
        debug!("Unlocked {}", self.path.display());
    }
}

/// Blocking exclusive lock on an already open file, released on drop
///
/// Guards every read and write of the shared frame buffer.
pub(crate) struct FlockGuard<'a> {
    file: &'a File,
}

impl<'a> FlockGuard<'a> {
    pub(crate) fn exclusive(file: &'a File) -> Result<Self> {
        flock(file, libc::LOCK_EX)
            .map_err(|e| VcamError::transport(format!("failed to lock frame buffer: {}", e)))?;
        Ok(Self { file })
    }
}

impl Drop for FlockGuard<'_> {
    fn drop(&mut self) {
        let _ = flock(self.file, libc::LOCK_UN);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_lock_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dev.lock");

        let first = LockFile::try_acquire(&path).unwrap();
        assert!(first.is_some());
        assert!(LockFile::try_acquire(&path).unwrap().is_none());
        assert!(LockFile::is_held(&path).unwrap());

        drop(first);
        assert!(!LockFile::is_held(&path).unwrap());
        assert!(LockFile::try_acquire(&path).unwrap().is_some());
    }

    #[test]
    fn test_owner_pid_recorded_and_cleared() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dev.lock");

        let lock = LockFile::try_acquire(&path).unwrap().unwrap();
        let owner = std::fs::read_to_string(&path).unwrap();
        assert_eq!(owner, std::process::id().to_string());

        drop(lock);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_is_held_takes_no_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dev.lock");
        std::fs::write(&path, "").unwrap();

        // Keep an observer's file open across the acquire
        let observer = File::open(&path).unwrap();
        assert!(!LockFile::is_held(&path).unwrap());
        let lock = LockFile::try_acquire(&path).unwrap();
        assert!(lock.is_some());
        assert!(LockFile::is_held(&path).unwrap());
        drop(observer);
    }

    #[test]
    fn test_dead_owner_is_not_held() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dev.lock");

        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        std::fs::write(&path, pid.to_string()).unwrap();

        assert!(!LockFile::is_held(&path).unwrap());
        assert!(LockFile::try_acquire(&path).unwrap().is_some());
    }

    #[test]
    fn test_garbage_owner_is_not_held() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dev.lock");
        std::fs::write(&path, "not a pid").unwrap();
        assert!(!LockFile::is_held(&path).unwrap());
    }

    #[test]
    fn test_missing_file_is_not_held() {
        let dir = TempDir::new().unwrap();
        assert!(!LockFile::is_held(&dir.path().join("nope.lock")).unwrap());
    }

    #[test]
    fn test_missing_directory_is_registration_error() {
        let dir = TempDir::new().unwrap();
        let err = LockFile::try_acquire(dir.path().join("missing/dev.lock")).unwrap_err();
        assert!(matches!(err, VcamError::Registration(_)));
    }
}
