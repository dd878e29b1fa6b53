//! Producer/consumer tests over the shared-memory transport
//!
//! A `CameraReceiver` stands in for the host-side consumer: attaching it
//! raises the camera's connection, and it observes latest-frame-wins
//! delivery and the darkened placeholder once the camera is deleted.

mod mocks;

use mocks::{TestRuntime, create_gradient_frame, create_test_frame, wait_until};
use std::time::Duration;
use vcam_core::{CameraReceiver, FrameBuffer, Pulled, RowLayout, VcamError};

const SETTLE: Duration = Duration::from_secs(2);

#[test]
fn test_open_without_producer_fails() {
    let rt = TestRuntime::new();
    let err = CameraReceiver::open(rt.path(), &rt.identity).unwrap_err();
    assert!(matches!(err, VcamError::DeviceNotFound(_)));
}

#[test]
fn test_open_after_delete_fails() {
    let rt = TestRuntime::new();
    let cam = rt.camera(64, 48, 30.0).expect("camera");
    cam.delete();

    let err = CameraReceiver::open(rt.path(), &rt.identity).unwrap_err();
    assert!(matches!(err, VcamError::DeviceNotFound(_)));
}

#[test]
fn test_attach_and_detach_drive_connection() {
    let rt = TestRuntime::new();
    let cam = rt.camera(64, 48, 30.0).expect("camera");
    assert!(!cam.is_connected().unwrap());

    let receiver = CameraReceiver::open(rt.path(), &rt.identity).expect("receiver");
    assert!(cam.wait_for_connection(Some(SETTLE)).unwrap());
    assert!(cam.is_connected().unwrap());

    drop(receiver);
    assert!(wait_until(SETTLE, || !cam.is_connected().unwrap()));
}

#[test]
fn test_waiter_wakes_on_attach() {
    let rt = TestRuntime::new();
    let cam = std::sync::Arc::new(rt.camera(64, 48, 30.0).expect("camera"));

    let waiter = {
        let cam = std::sync::Arc::clone(&cam);
        std::thread::spawn(move || cam.wait_for_connection(None))
    };

    std::thread::sleep(Duration::from_millis(30));
    let _receiver = CameraReceiver::open(rt.path(), &rt.identity).expect("receiver");

    let connected = waiter.join().expect("waiter thread").expect("wait");
    assert!(connected);
}

#[test]
fn test_receiver_reports_format() {
    let rt = TestRuntime::new();
    let _cam = rt.camera(320, 240, 0.0).expect("camera");

    let receiver = CameraReceiver::open(rt.path(), &rt.identity).expect("receiver");
    assert_eq!(receiver.width(), 320);
    assert_eq!(receiver.height(), 240);
    assert_eq!(receiver.identity(), &rt.identity);
    // Unpaced producers still advertise a nominal rate
    assert_eq!(receiver.framerate(), 1.0);
}

#[test]
fn test_latest_frame_wins() {
    let rt = TestRuntime::new();
    let cam = rt.camera(32, 24, 0.0).expect("camera");
    let mut receiver = CameraReceiver::open(rt.path(), &rt.identity).expect("receiver");

    for color in [[10, 10, 10], [20, 20, 20], [30, 30, 30]] {
        cam.send_frame(create_test_frame(32, 24, color).as_frame())
            .expect("send");
    }

    let Pulled::Frame(info) = receiver.pull(Some(SETTLE)).expect("pull") else {
        panic!("producer should be active");
    };
    assert_eq!(info.sequence, 3);
    assert!(info.fresh);
    assert_eq!(receiver.image().pixel(5, 5), Some([30, 30, 30]));

    cam.send_frame(create_test_frame(32, 24, [40, 40, 40]).as_frame())
        .expect("send");
    cam.send_frame(create_test_frame(32, 24, [50, 50, 50]).as_frame())
        .expect("send");
    let Pulled::Frame(info) = receiver.pull(Some(SETTLE)).expect("pull") else {
        panic!("producer should be active");
    };
    assert_eq!(info.sequence, 5);
    assert_eq!(receiver.image().pixel(0, 0), Some([50, 50, 50]));
    assert_eq!(receiver.stats().frames_skipped, 1);
}

#[test]
fn test_pull_without_new_frame_redelivers() {
    let rt = TestRuntime::new();
    let cam = rt.camera(32, 24, 0.0).expect("camera");
    let mut receiver = CameraReceiver::open(rt.path(), &rt.identity).expect("receiver");

    let frame = create_gradient_frame(32, 24);
    cam.send_frame(frame.as_frame()).expect("send");

    let Pulled::Frame(first) = receiver.pull(Some(SETTLE)).expect("pull") else {
        panic!("producer should be active");
    };
    let Pulled::Frame(again) = receiver
        .pull(Some(Duration::from_millis(20)))
        .expect("pull")
    else {
        panic!("producer should be active");
    };

    assert!(first.fresh);
    assert!(!again.fresh);
    assert_eq!(again.sequence, first.sequence);
    assert_eq!(receiver.image().as_bytes(), frame.as_bytes());

    let stats = receiver.stats();
    assert_eq!(stats.frames_fresh, 1);
    assert_eq!(stats.frames_repeated, 1);
}

#[test]
fn test_read_before_first_frame_is_black() {
    let rt = TestRuntime::new();
    let _cam = rt.camera(16, 8, 0.0).expect("camera");
    let mut receiver = CameraReceiver::open(rt.path(), &rt.identity).expect("receiver");

    assert!(
        receiver
            .wait_for_new_frame(Some(Duration::from_millis(10)))
            .unwrap()
    );
    let mut out = vec![0xffu8; RowLayout::TopDown.buffer_size(16, 8)];
    let info = receiver.read_frame(&mut out, RowLayout::TopDown).unwrap();
    assert_eq!(info.sequence, 0);
    assert!(!info.fresh);
    assert!(out.iter().all(|&b| b == 0));
}

#[test]
fn test_delete_leaves_darkened_placeholder() {
    let rt = TestRuntime::new();
    let cam = rt.camera(32, 24, 0.0).expect("camera");
    let mut receiver = CameraReceiver::open(rt.path(), &rt.identity).expect("receiver");

    cam.send_frame(create_test_frame(32, 24, [200, 100, 40]).as_frame())
        .expect("send");
    assert!(matches!(
        receiver.pull(Some(SETTLE)).expect("pull"),
        Pulled::Frame(_)
    ));

    cam.delete();
    assert!(!receiver.is_active().unwrap());

    assert_eq!(receiver.pull(Some(SETTLE)).unwrap(), Pulled::SourceInactive);
    assert!(receiver.is_source_lost());
    assert_eq!(receiver.image().pixel(3, 3), Some([50, 25, 10]));

    // Darkened once, not on every pull
    assert_eq!(receiver.pull(Some(SETTLE)).unwrap(), Pulled::SourceInactive);
    assert_eq!(receiver.image().pixel(3, 3), Some([50, 25, 10]));
    assert_eq!(receiver.stats().inactive_pulls, 2);
}

#[test]
fn test_wait_ends_when_producer_goes_away() {
    let rt = TestRuntime::new();
    let cam = rt.camera(32, 24, 0.0).expect("camera");
    let mut receiver = CameraReceiver::open(rt.path(), &rt.identity).expect("receiver");

    let deleter = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        cam.delete();
    });

    assert!(!receiver.wait_for_new_frame(None).unwrap());
    deleter.join().expect("deleter thread");
}

#[test]
fn test_bottom_up_padded_read() {
    let rt = TestRuntime::new();
    let cam = rt.camera(3, 2, 0.0).expect("camera");
    let mut receiver = CameraReceiver::open(rt.path(), &rt.identity).expect("receiver");

    let mut image = FrameBuffer::new(3, 2).expect("geometry");
    for x in 0..3 {
        image.set_pixel(x, 0, [1, 2, 3]);
        image.set_pixel(x, 1, [7, 8, 9]);
    }
    cam.send_frame(image.as_frame()).expect("send");
    assert!(receiver.wait_for_new_frame(Some(SETTLE)).unwrap());

    let layout = RowLayout::BottomUpPadded;
    assert_eq!(layout.stride(3), 12);
    let mut out = vec![0xffu8; layout.buffer_size(3, 2)];
    receiver.read_frame(&mut out, layout).expect("read");

    assert_eq!(&out[0..3], &[7, 8, 9]);
    assert_eq!(&out[9..12], &[0, 0, 0]);
    assert_eq!(&out[12..15], &[1, 2, 3]);
    assert_eq!(&out[21..24], &[0, 0, 0]);
}

#[test]
fn test_read_into_short_buffer_fails() {
    let rt = TestRuntime::new();
    let _cam = rt.camera(16, 8, 0.0).expect("camera");
    let mut receiver = CameraReceiver::open(rt.path(), &rt.identity).expect("receiver");

    let mut out = vec![0u8; 10];
    let err = receiver.read_frame(&mut out, RowLayout::TopDown).unwrap_err();
    assert!(matches!(err, VcamError::InvalidArgument(_)));
}

#[test]
fn test_inspect_reports_header() {
    let rt = TestRuntime::new();
    assert!(
        CameraReceiver::inspect(rt.path(), &rt.identity)
            .unwrap()
            .is_none()
    );

    let cam = rt.camera(64, 48, 25.0).expect("camera");
    for _ in 0..2 {
        cam.send_frame(create_test_frame(64, 48, [0, 0, 0]).as_frame())
            .expect("send");
    }

    let info = CameraReceiver::inspect(rt.path(), &rt.identity)
        .unwrap()
        .expect("buffer present");
    assert_eq!((info.width, info.height), (64, 48));
    assert_eq!(info.framerate, 25.0);
    assert!(info.active);
    assert!(!info.connected);
    assert_eq!(info.sequence, 2);
    assert_eq!(info.producer_pid, std::process::id());
    assert!(info.timestamp_ns > 0);

    let _receiver = CameraReceiver::open(rt.path(), &rt.identity).expect("receiver");
    let info = CameraReceiver::inspect(rt.path(), &rt.identity)
        .unwrap()
        .expect("buffer present");
    assert!(info.connected);
}

#[test]
fn test_buffer_info_serializes() {
    let rt = TestRuntime::new();
    let _cam = rt.camera(64, 48, 30.0).expect("camera");

    let info = CameraReceiver::inspect(rt.path(), &rt.identity)
        .unwrap()
        .expect("buffer present");
    let json = serde_json::to_value(&info).expect("serialize");
    assert_eq!(json["width"], 64);
    assert_eq!(json["active"], true);
    assert_eq!(json["sequence"], 0);
}
