//! Device registry integration tests

mod mocks;

use mocks::{FailingBackend, FlakyUnregisterBackend, TestRuntime, create_test_frame};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use vcam_core::{
    DeviceIdentity, DeviceRegistry, SharedMemoryBackend, StreamFormat, VcamError, VirtualCamera,
};

fn format() -> StreamFormat {
    StreamFormat::new(320, 240, 30.0).expect("valid format")
}

#[test]
fn test_failed_registration_leaves_identity_free() {
    let backend = Arc::new(FailingBackend::default());
    let rt = TestRuntime::with_backend(backend.clone());

    let err = rt.camera(320, 240, 30.0).unwrap_err();
    assert!(matches!(err, VcamError::Registration(_)));
    assert!(!rt.registry.is_claimed(&rt.identity).unwrap());

    // A retry reaches the backend again instead of seeing a stale claim
    let err = rt.camera(320, 240, 30.0).unwrap_err();
    assert!(matches!(err, VcamError::Registration(_)));
    assert_eq!(backend.attempts.load(Ordering::SeqCst), 2);

    // Another backend on the same directory can take the name
    let registry = DeviceRegistry::shared_memory(rt.path());
    VirtualCamera::open(&registry, &rt.identity, 320, 240, 30.0).expect("identity free");
}

#[test]
fn test_release_is_idempotent() {
    let rt = TestRuntime::new();
    let mut handle = rt.registry.acquire(&rt.identity, &format()).expect("acquire");
    assert!(!handle.is_released());
    assert!(rt.identity.frames_path(rt.path()).exists());

    rt.registry.release(&mut handle).expect("first release");
    assert!(handle.is_released());
    assert!(handle.transport().is_none());
    assert!(!rt.identity.frames_path(rt.path()).exists());

    rt.registry.release(&mut handle).expect("second release");
    assert!(!rt.registry.is_claimed(&rt.identity).unwrap());
}

#[test]
fn test_failed_unregister_still_frees_identity() {
    let rt = TestRuntime::new();
    let backend = Arc::new(FlakyUnregisterBackend::new(rt.path()));
    let registry = DeviceRegistry::new(rt.path(), backend.clone());

    let mut handle = registry.acquire(&rt.identity, &format()).expect("acquire");
    let err = registry.release(&mut handle).unwrap_err();
    assert!(matches!(err, VcamError::Registration(_)));
    assert!(!registry.is_claimed(&rt.identity).unwrap());

    // Already released: no second unregister
    registry.release(&mut handle).expect("no-op");
    assert_eq!(backend.unregisters.load(Ordering::SeqCst), 1);

    registry.acquire(&rt.identity, &format()).expect("identity free");
}

#[test]
fn test_delete_swallows_unregister_failure() {
    let rt = TestRuntime::new();
    let backend = Arc::new(FlakyUnregisterBackend::new(rt.path()));
    let registry = DeviceRegistry::new(rt.path(), backend);

    let cam = VirtualCamera::open(&registry, &rt.identity, 64, 48, 0.0).expect("camera");
    cam.send_frame(create_test_frame(64, 48, [1, 1, 1]).as_frame())
        .expect("send");
    cam.delete();

    assert!(cam.is_deleted());
    assert!(!registry.is_claimed(&rt.identity).unwrap());
}

#[test]
fn test_identities_are_independent() {
    let rt = TestRuntime::new();
    let other = DeviceIdentity::new("othercam").expect("valid name");

    let _a = rt.registry.acquire(&rt.identity, &format()).expect("first");
    let _b = rt.registry.acquire(&other, &format()).expect("second");
    assert!(rt.registry.is_claimed(&rt.identity).unwrap());
    assert!(rt.registry.is_claimed(&other).unwrap());
}

#[test]
fn test_runtime_dirs_are_independent() {
    let a = TestRuntime::new();
    let b = TestRuntime::new();

    let _cam_a = a.camera(64, 48, 0.0).expect("camera a");
    let _cam_b = b.camera(64, 48, 0.0).expect("camera b");
}

#[test]
fn test_handle_drop_releases() {
    let rt = TestRuntime::new();
    {
        let handle = rt.registry.acquire(&rt.identity, &format()).expect("acquire");
        assert_eq!(handle.identity(), &rt.identity);
        assert_eq!(handle.format().width, 320);
    }
    assert!(!rt.registry.is_claimed(&rt.identity).unwrap());
    assert!(!rt.identity.frames_path(rt.path()).exists());
}

#[test]
fn test_stale_buffer_is_replaced() {
    let rt = TestRuntime::new();
    std::fs::write(rt.identity.frames_path(rt.path()), b"leftover").expect("write stale file");

    let _cam = rt.camera(64, 48, 30.0).expect("camera");
    let info = SharedMemoryBackend::inspect(rt.path(), &rt.identity)
        .expect("inspect")
        .expect("buffer present");
    assert_eq!((info.width, info.height), (64, 48));
    assert!(info.active);
}

#[test]
fn test_runtime_dir_is_created() {
    let rt = TestRuntime::new();
    let nested = rt.path().join("a").join("b");
    let registry = DeviceRegistry::shared_memory(&nested);

    let _handle = registry.acquire(&rt.identity, &format()).expect("acquire");
    assert!(rt.identity.lock_path(&nested).exists());
    assert_eq!(registry.backend_name(), "shared-memory");
}

#[test]
fn test_concurrent_status_checks_never_block_creation() {
    let rt = Arc::new(TestRuntime::new());
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let checker = {
        let rt = Arc::clone(&rt);
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                rt.registry.is_claimed(&rt.identity).expect("is_claimed");
            }
        })
    };

    for _ in 0..200 {
        let cam = rt.camera(8, 8, 0.0).expect("is_claimed must not hold the identity");
        cam.delete();
    }

    stop.store(true, Ordering::Relaxed);
    checker.join().expect("checker thread");
}

#[test]
fn test_observer_holding_lock_file_open_does_not_block_creation() {
    let rt = TestRuntime::new();
    let lock_path = rt.identity.lock_path(rt.path());
    std::fs::write(&lock_path, "").expect("create lock file");

    let _observer = std::fs::File::open(&lock_path).expect("open lock file");
    assert!(!rt.registry.is_claimed(&rt.identity).unwrap());

    let _cam = rt.camera(8, 8, 0.0).expect("identity free");
    assert!(rt.registry.is_claimed(&rt.identity).unwrap());
}
