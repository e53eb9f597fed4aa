use super::*;
use crate::device::{
    DeviceErrorCode, DeviceEvent, FocusMode, RecorderInfo, SimulatedDriver, SurfaceKind,
};
use crate::error::{CameraError, ConfigurationSetting};
use crate::frame::Frame;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

fn engine(driver: &SimulatedDriver, config: EngineConfig) -> CameraEngine {
    CameraEngine::builder()
        .config(config)
        .driver(driver.clone())
        .build()
        .unwrap()
}

fn video_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.camera.session_type = SessionType::Video;
    config.camera.audio = Audio::Off;
    config.video.max_duration_ms = 0;
    config
}

fn portrait_surface() -> PreviewSurface {
    PreviewSurface::new(SurfaceKind::Texture, Size::new(1080, 1920))
}

async fn started(driver: &SimulatedDriver, config: EngineConfig) -> CameraEngine {
    let engine = engine(driver, config);
    engine.surface_available(portrait_surface()).wait().await;
    engine.start().unwrap().wait().await;
    assert_eq!(engine.state(), EngineState::Started);
    engine
}

fn drain(rx: &mut broadcast::Receiver<CameraEvent>) -> Vec<CameraEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn errors(events: &[CameraEvent]) -> Vec<&CameraError> {
    events
        .iter()
        .filter_map(|event| match event {
            CameraEvent::Error(error) => Some(error),
            _ => None,
        })
        .collect()
}

async fn wait_for<F>(rx: &mut broadcast::Receiver<CameraEvent>, mut matches: F) -> CameraEvent
where
    F: FnMut(&CameraEvent) -> bool,
{
    timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event bus closed: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

async fn eventually<F: Fn() -> bool>(condition: F) {
    timeout(Duration::from_secs(5), async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never became true");
}

#[tokio::test]
async fn test_builder_requires_driver_for_legacy_backend() {
    let result = CameraEngine::builder().build();
    assert!(matches!(result, Err(EngineError::System { .. })));
}

#[tokio::test]
async fn test_builder_rejects_invalid_config() {
    let mut config = EngineConfig::default();
    config.events.bus_capacity = 0;
    let result = CameraEngine::builder()
        .config(config)
        .driver(SimulatedDriver::new())
        .build();
    assert!(matches!(result, Err(EngineError::Config(_))));
}

#[tokio::test]
async fn test_camera2_backend_reports_unavailable() {
    let mut config = EngineConfig::default();
    config.camera.backend = crate::config::CameraBackend::Camera2;
    let engine = CameraEngine::builder().config(config).build().unwrap();
    let mut rx = engine.subscribe();

    engine.start().unwrap().wait().await;
    assert_eq!(engine.state(), EngineState::Stopped);
    let events = drain(&mut rx);
    assert!(matches!(
        errors(&events).as_slice(),
        [CameraError::DeviceUnavailable { .. }]
    ));
}

#[tokio::test]
async fn test_permissions_gate_start() {
    let driver = SimulatedDriver::new();
    let engine = CameraEngine::builder()
        .driver(driver.clone())
        .permissions(|permission: Permission| permission != Permission::Camera)
        .build()
        .unwrap();
    match engine.start() {
        Err(EngineError::PermissionDenied { permission }) => assert_eq!(permission, "camera"),
        other => panic!("unexpected result {:?}", other.map(|_| ())),
    }
    assert!(!driver.is_open());
}

#[tokio::test]
async fn test_audio_permission_needed_only_for_video_with_audio() {
    let driver = SimulatedDriver::new();
    let mut config = video_config();
    config.camera.audio = Audio::On;
    let engine = CameraEngine::builder()
        .config(config)
        .driver(driver.clone())
        .permissions(|permission: Permission| permission == Permission::Camera)
        .build()
        .unwrap();

    assert!(matches!(
        engine.start(),
        Err(EngineError::PermissionDenied { .. })
    ));

    engine.set_audio(Audio::Off).wait().await;
    engine.start().unwrap().wait().await;
    assert!(driver.is_open());
}

#[tokio::test]
async fn test_zoom_is_clamped() {
    let driver = SimulatedDriver::new();
    let engine = started(&driver, EngineConfig::default()).await;

    engine.set_zoom(1.7).wait().await;
    assert_eq!(engine.settings().zoom, 1.0);
    assert_eq!(driver.live_parameters().unwrap().zoom, 30);

    engine.set_zoom(-0.5).wait().await;
    assert_eq!(engine.settings().zoom, 0.0);
    assert_eq!(driver.live_parameters().unwrap().zoom, 0);
}

#[tokio::test]
async fn test_nan_zoom_and_exposure_become_zero() {
    let driver = SimulatedDriver::new();
    let engine = started(&driver, EngineConfig::default()).await;
    engine.set_zoom(0.5).wait().await;
    engine.set_exposure_correction(3.0).wait().await;

    engine.set_zoom(f32::NAN).wait().await;
    engine.set_exposure_correction(f32::NAN).wait().await;

    let settings = engine.settings();
    assert_eq!(settings.zoom, 0.0);
    assert_eq!(settings.exposure_correction, 0.0);
    let params = driver.live_parameters().unwrap();
    assert_eq!(params.zoom, 0);
    assert_eq!(params.exposure_compensation, 0);
}

#[tokio::test]
async fn test_exposure_correction_is_clamped_to_device_bounds() {
    let driver = SimulatedDriver::new();
    let engine = started(&driver, EngineConfig::default()).await;
    let options = engine.options().unwrap();
    assert_eq!(options.exposure_correction_bounds(), (-10.0, 10.0));

    engine.set_exposure_correction(5.0).wait().await;
    assert_eq!(engine.settings().exposure_correction, 5.0);
    assert_eq!(driver.live_parameters().unwrap().exposure_compensation, 10);

    engine.set_exposure_correction(25.0).wait().await;
    assert_eq!(engine.settings().exposure_correction, 10.0);
    assert_eq!(driver.live_parameters().unwrap().exposure_compensation, 20);

    engine.set_exposure_correction(-25.0).wait().await;
    assert_eq!(engine.settings().exposure_correction, -10.0);
    assert_eq!(driver.live_parameters().unwrap().exposure_compensation, -20);
}

#[tokio::test]
async fn test_unsupported_white_balance_rolls_back() {
    let driver = SimulatedDriver::new();
    let engine = started(&driver, EngineConfig::default()).await;
    let mut rx = engine.subscribe();

    engine
        .set_white_balance(WhiteBalance::Incandescent)
        .wait()
        .await;
    assert_eq!(engine.settings().white_balance, WhiteBalance::Auto);
    assert_eq!(
        driver.live_parameters().unwrap().white_balance,
        WhiteBalance::Auto
    );

    let events = drain(&mut rx);
    match errors(&events).as_slice() {
        [error] => assert_eq!(error.setting(), Some(ConfigurationSetting::WhiteBalance)),
        other => panic!("expected one error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rejected_parameters_restore_previous_value() {
    let driver = SimulatedDriver::new();
    let engine = started(&driver, EngineConfig::default()).await;
    engine.set_flash(Flash::Torch).wait().await;

    driver.faults(|f| f.reject_parameters = true);
    let mut rx = engine.subscribe();
    engine.set_flash(Flash::Auto).wait().await;

    assert_eq!(engine.settings().flash, Flash::Torch);
    assert_eq!(driver.live_parameters().unwrap().flash, Flash::Torch);
    let events = drain(&mut rx);
    match errors(&events).as_slice() {
        [CameraError::ConfigurationFailed { setting, cause, .. }] => {
            assert_eq!(*setting, ConfigurationSetting::Flash);
            assert!(cause.is_some());
        }
        other => panic!("unexpected errors {other:?}"),
    }
}

#[tokio::test]
async fn test_front_camera_without_zoom_rolls_back() {
    let driver = SimulatedDriver::new();
    let mut config = EngineConfig::default();
    config.camera.facing = Facing::Front;
    let engine = started(&driver, config).await;
    let mut rx = engine.subscribe();

    engine.set_zoom(0.5).wait().await;
    assert_eq!(engine.settings().zoom, 0.0);
    let events = drain(&mut rx);
    match errors(&events).as_slice() {
        [error] => assert_eq!(error.setting(), Some(ConfigurationSetting::Zoom)),
        other => panic!("unexpected errors {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_release_clears_state_and_reports() {
    let driver = SimulatedDriver::new();
    let engine = started(&driver, EngineConfig::default()).await;
    let mut rx = engine.subscribe();

    driver.faults(|f| f.fail_release = true);
    engine.stop().wait().await;

    assert_eq!(engine.state(), EngineState::Stopped);
    assert!(engine.options().is_none());
    assert!(engine.extra_properties().is_none());
    assert!(engine.preview_size().is_none());
    assert!(engine.picture_size().is_none());

    let events = drain(&mut rx);
    assert!(matches!(
        events.as_slice(),
        [
            CameraEvent::Closed,
            CameraEvent::Error(CameraError::DeviceUnavailable { .. })
        ]
    ));
}

#[tokio::test]
async fn test_server_death_restarts_camera() {
    let driver = SimulatedDriver::new();
    let engine = started(&driver, EngineConfig::default()).await;
    let mut rx = engine.subscribe();

    assert!(driver.emit(DeviceEvent::Error(DeviceErrorCode::ServerDied)));
    wait_for(&mut rx, |e| matches!(e, CameraEvent::Closed)).await;
    wait_for(&mut rx, |e| matches!(e, CameraEvent::Opened { .. })).await;

    assert_eq!(engine.state(), EngineState::Started);
    assert_eq!(driver.stats().opens, 2);
    assert!(driver.is_previewing());
}

#[tokio::test]
async fn test_switching_facing_reopens_camera() {
    let driver = SimulatedDriver::new();
    let engine = started(&driver, EngineConfig::default()).await;
    let mut rx = engine.subscribe();

    engine.toggle_facing().wait().await;
    assert_eq!(driver.open_camera_id(), Some(1));
    assert_eq!(engine.settings().facing, Facing::Front);
    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, CameraEvent::Closed)));
    assert!(events.iter().any(|e| matches!(e, CameraEvent::Opened { .. })));
}

#[tokio::test]
async fn test_missing_facing_rolls_back() {
    let driver = SimulatedDriver::new().with_only(Facing::Back);
    let engine = started(&driver, EngineConfig::default()).await;
    let mut rx = engine.subscribe();

    engine.set_facing(Facing::Front).wait().await;
    assert_eq!(engine.settings().facing, Facing::Back);
    assert_eq!(driver.open_camera_id(), Some(0));
    let events = drain(&mut rx);
    match errors(&events).as_slice() {
        [error] => assert_eq!(error.setting(), Some(ConfigurationSetting::Facing)),
        other => panic!("unexpected errors {other:?}"),
    }
}

#[tokio::test]
async fn test_session_type_change_restarts_in_video_mode() {
    let driver = SimulatedDriver::new();
    let engine = started(&driver, EngineConfig::default()).await;
    let mut rx = engine.subscribe();

    engine.set_session_type(SessionType::Video).wait().await;
    let params = driver.live_parameters().unwrap();
    assert!(params.recording_hint);
    assert_eq!(params.focus_mode, FocusMode::ContinuousVideo);
    assert!(driver.is_previewing());

    let events = drain(&mut rx);
    assert!(matches!(events.first(), Some(CameraEvent::Closed)));
    assert!(matches!(events.last(), Some(CameraEvent::Opened { .. })));
}

#[tokio::test]
async fn test_capture_picture_publishes_shutter_and_data() {
    let driver = SimulatedDriver::new();
    let engine = started(&driver, EngineConfig::default()).await;
    let mut rx = engine.subscribe();

    engine.capture_picture().wait().await;
    wait_for(&mut rx, |e| {
        matches!(e, CameraEvent::Shutter { snapshot: false })
    })
    .await;
    match wait_for(&mut rx, |e| matches!(e, CameraEvent::PictureReady { .. })).await {
        CameraEvent::PictureReady {
            data,
            matches_view,
            mirror,
        } => {
            assert_eq!(&data[..2], &[0xFF, 0xD8]);
            assert!(matches_view);
            assert!(!mirror);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(driver.stats().pictures, 1);
    assert_eq!(driver.live_parameters().unwrap().rotation, 90);
    eventually(|| driver.is_previewing()).await;
}

#[tokio::test]
async fn test_capture_without_preview_fails() {
    let driver = SimulatedDriver::new();
    let engine = engine(&driver, EngineConfig::default());
    engine.start().unwrap().wait().await;
    let mut rx = engine.subscribe();

    engine.capture_picture().wait().await;
    engine.capture_snapshot().wait().await;
    let events = drain(&mut rx);
    assert!(matches!(
        errors(&events).as_slice(),
        [
            CameraError::CapturePictureFailed { .. },
            CameraError::CaptureSnapshotFailed { .. }
        ]
    ));
    assert_eq!(engine.state(), EngineState::Started);
}

#[tokio::test]
async fn test_snapshot_is_rotated_to_output() {
    let driver = SimulatedDriver::new();
    let engine = started(&driver, EngineConfig::default()).await;
    let mut rx = engine.subscribe();

    engine.capture_snapshot().wait().await;
    wait_for(&mut rx, |e| matches!(e, CameraEvent::Shutter { snapshot: true })).await;
    match wait_for(&mut rx, |e| matches!(e, CameraEvent::SnapshotReady { .. })).await {
        CameraEvent::SnapshotReady {
            image,
            matches_view,
            mirror,
        } => {
            assert_eq!(image.size, Size::new(720, 960));
            assert_eq!(image.data.len(), 960 * 720 * 3 / 2);
            assert!(matches_view);
            assert!(!mirror);
        }
        other => panic!("unexpected event {other:?}"),
    }
    // Callback buffers dropped by the one-shot request are replaced.
    eventually(|| driver.queued_buffers() == 2).await;
}

#[tokio::test]
async fn test_video_records_to_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clip.mp4");
    let driver = SimulatedDriver::new();
    let engine = started(&driver, video_config()).await;
    let mut rx = engine.subscribe();

    engine.start_video(&path).wait().await;
    assert!(engine.is_capturing_video());
    assert!(!driver.is_locked());
    assert_eq!(driver.stats().recorders_started, 1);

    engine.end_video().wait().await;
    match wait_for(&mut rx, |e| matches!(e, CameraEvent::VideoReady { .. })).await {
        CameraEvent::VideoReady { path: ready } => assert_eq!(ready, path),
        other => panic!("unexpected event {other:?}"),
    }
    assert!(!engine.is_capturing_video());
    assert!(driver.is_locked());

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.starts_with("mpeg4 h264 720x480"));
    assert!(contents.trim_end().ends_with("end"));
}

#[tokio::test]
async fn test_video_requires_video_session() {
    let dir = TempDir::new().unwrap();
    let driver = SimulatedDriver::new();
    let engine = started(&driver, EngineConfig::default()).await;
    let mut rx = engine.subscribe();

    engine.start_video(dir.path().join("clip.mp4")).wait().await;
    assert!(!engine.is_capturing_video());
    let events = drain(&mut rx);
    assert!(matches!(
        errors(&events).as_slice(),
        [CameraError::CaptureVideoFailed { .. }]
    ));
}

#[tokio::test]
async fn test_recorder_start_failure_reports_partial_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clip.mp4");
    let driver = SimulatedDriver::new();
    driver.faults(|f| f.fail_recorder_start = true);
    let engine = started(&driver, video_config()).await;
    let mut rx = engine.subscribe();

    engine.start_video(&path).wait().await;
    assert!(!engine.is_capturing_video());
    assert!(driver.is_locked());
    let events = drain(&mut rx);
    assert!(!events
        .iter()
        .any(|e| matches!(e, CameraEvent::VideoReady { .. })));
    match errors(&events).as_slice() {
        [CameraError::CaptureVideoFailed { partial_file, .. }] => {
            assert_eq!(partial_file.as_deref(), Some(path.as_path()));
        }
        other => panic!("unexpected errors {other:?}"),
    }
}

#[tokio::test]
async fn test_server_death_while_recording_discards_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clip.mp4");
    let driver = SimulatedDriver::new();
    let engine = started(&driver, video_config()).await;
    engine.start_video(&path).wait().await;
    assert!(path.exists());
    let mut rx = engine.subscribe();

    assert!(driver.emit(DeviceEvent::RecorderError {
        code: DeviceErrorCode::ServerDied,
        extra: 0,
    }));
    match wait_for(&mut rx, |e| matches!(e, CameraEvent::Error(_))).await {
        CameraEvent::Error(CameraError::CaptureVideoFailed { partial_file, .. }) => {
            assert_eq!(partial_file, Some(path.clone()));
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(!path.exists());
    assert!(!engine.is_capturing_video());
    assert!(!drain(&mut rx)
        .iter()
        .any(|e| matches!(e, CameraEvent::VideoReady { .. })));
}

#[tokio::test]
async fn test_video_ends_at_max_duration() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clip.mp4");
    let driver = SimulatedDriver::new();
    let mut config = video_config();
    config.video.max_duration_ms = 50;
    let engine = started(&driver, config).await;
    let mut rx = engine.subscribe();

    engine.start_video(&path).wait().await;
    wait_for(&mut rx, |e| matches!(e, CameraEvent::VideoReady { .. })).await;
    assert!(!engine.is_capturing_video());
}

#[tokio::test]
async fn test_recorder_max_duration_info_ends_video() {
    let dir = TempDir::new().unwrap();
    let driver = SimulatedDriver::new();
    let engine = started(&driver, video_config()).await;
    let mut rx = engine.subscribe();

    engine.start_video(dir.path().join("clip.mp4")).wait().await;
    driver.emit(DeviceEvent::RecorderInfo {
        info: RecorderInfo::MaxDurationReached,
        extra: 0,
    });
    wait_for(&mut rx, |e| matches!(e, CameraEvent::VideoReady { .. })).await;
}

#[tokio::test]
async fn test_video_quality_locked_while_recording() {
    let dir = TempDir::new().unwrap();
    let driver = SimulatedDriver::new();
    let engine = started(&driver, video_config()).await;
    engine.start_video(dir.path().join("clip.mp4")).wait().await;
    let mut rx = engine.subscribe();

    engine.set_video_quality(VideoQuality::Max1080p).wait().await;
    assert_eq!(engine.settings().video_quality, VideoQuality::Max480p);
    let events = drain(&mut rx);
    match errors(&events).as_slice() {
        [error] => assert_eq!(error.setting(), Some(ConfigurationSetting::VideoQuality)),
        other => panic!("unexpected errors {other:?}"),
    }
    engine.end_video().wait().await;
}

#[tokio::test]
async fn test_video_quality_changes_picture_size() {
    let driver = SimulatedDriver::new();
    let engine = started(&driver, video_config()).await;

    engine.set_video_quality(VideoQuality::Max1080p).wait().await;
    assert_eq!(
        driver.live_parameters().unwrap().picture_size,
        Size::new(3840, 2160)
    );
    assert_eq!(engine.picture_size(), Some(Size::new(2160, 3840)));
    assert!(driver.is_previewing());
}

#[tokio::test]
async fn test_gestures_drive_zoom_and_focus() {
    let driver = SimulatedDriver::new();
    let mut config = EngineConfig::default();
    config.gestures.pinch = GestureAction::Zoom;
    config.gestures.tap = GestureAction::FocusWithMarker;
    config.gestures.scroll_vertical = GestureAction::ExposureCorrection;
    let engine = started(&driver, config).await;
    let mut rx = engine.subscribe();
    let point = Point::new(540.0, 960.0);

    engine
        .on_gesture(GestureEvent::continuous(Gesture::Pinch, 0.25, vec![point]))
        .wait()
        .await;
    match wait_for(&mut rx, |e| matches!(e, CameraEvent::ZoomChanged { .. })).await {
        CameraEvent::ZoomChanged { zoom, points } => {
            assert_eq!(zoom, 0.5);
            assert_eq!(points, vec![point]);
        }
        other => panic!("unexpected event {other:?}"),
    }

    engine
        .on_gesture(GestureEvent::continuous(Gesture::ScrollVertical, 0.1, vec![point]))
        .wait()
        .await;
    match wait_for(&mut rx, |e| matches!(e, CameraEvent::ExposureChanged { .. })).await {
        CameraEvent::ExposureChanged { value, bounds, .. } => {
            assert_eq!(bounds, (-10.0, 10.0));
            assert!((value - 4.0).abs() < 1e-4);
        }
        other => panic!("unexpected event {other:?}"),
    }

    engine.on_gesture(GestureEvent::tap(point)).wait().await;
    match wait_for(&mut rx, |e| matches!(e, CameraEvent::FocusStarted { .. })).await {
        CameraEvent::FocusStarted { gesture, point: at } => {
            assert_eq!(gesture, Some(Gesture::Tap));
            assert_eq!(at, point);
        }
        other => panic!("unexpected event {other:?}"),
    }
    match wait_for(&mut rx, |e| matches!(e, CameraEvent::FocusEnded { .. })).await {
        CameraEvent::FocusEnded { success, .. } => assert!(success),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_unmapped_gestures_and_stopped_engine_are_ignored() {
    let driver = SimulatedDriver::new();
    let mut config = EngineConfig::default();
    config.gestures.pinch = GestureAction::Zoom;
    let engine = engine(&driver, config);

    engine
        .on_gesture(GestureEvent::continuous(Gesture::Pinch, 0.5, Vec::new()))
        .wait()
        .await;
    assert_eq!(engine.settings().zoom, 0.0);

    engine.start().unwrap().wait().await;
    engine
        .on_gesture(GestureEvent::long_tap(Point::new(1.0, 1.0)))
        .wait()
        .await;
    assert_eq!(driver.stats().pictures, 0);

    assert_eq!(
        engine.map_gesture(Gesture::Pinch, GestureAction::Capture),
        GestureAction::None
    );
    engine.clear_gesture(Gesture::Pinch);
    assert_eq!(engine.gesture_action(Gesture::Pinch), GestureAction::None);
}

#[tokio::test]
async fn test_focus_resets_after_delay() {
    let driver = SimulatedDriver::new();
    let mut config = EngineConfig::default();
    config.preview.post_focus_reset_ms = 20;
    let engine = started(&driver, config).await;
    let mut rx = engine.subscribe();

    engine.start_auto_focus(Point::new(100.0, 100.0)).wait().await;
    let params = driver.live_parameters().unwrap();
    assert_eq!(params.focus_mode, FocusMode::Auto);
    assert_eq!(params.focus_areas.len(), 2);
    assert_eq!(params.metering_areas.len(), 1);
    wait_for(&mut rx, |e| matches!(e, CameraEvent::FocusEnded { .. })).await;

    eventually(|| driver.stats().auto_focus_cancels == 1).await;
    // Queue behind the reset job.
    engine.set_hdr(Hdr::Off).wait().await;
    let params = driver.live_parameters().unwrap();
    assert_eq!(params.focus_mode, FocusMode::ContinuousPicture);
    assert!(params.focus_areas.is_empty());
    assert!(params.metering_areas.is_empty());
}

#[tokio::test]
async fn test_failed_focus_is_reported() {
    let driver = SimulatedDriver::new();
    driver.faults(|f| f.auto_focus_fails = true);
    let engine = started(&driver, EngineConfig::default()).await;
    let mut rx = engine.subscribe();

    engine.start_auto_focus(Point::new(10.0, 10.0)).wait().await;
    match wait_for(&mut rx, |e| matches!(e, CameraEvent::FocusEnded { .. })).await {
        CameraEvent::FocusEnded { gesture, success, .. } => {
            assert_eq!(gesture, None);
            assert!(!success);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_frame_processors_receive_and_recycle_frames() {
    let driver = SimulatedDriver::new();
    let engine = started(&driver, EngineConfig::default()).await;
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let processor: Arc<dyn FrameProcessor> = Arc::new(move |frame: &Frame| {
        assert_eq!(frame.size(), Size::new(960, 720));
        assert_eq!(frame.rotation(), 90);
        counter.fetch_add(1, Ordering::SeqCst);
    });
    engine.add_frame_processor(Arc::clone(&processor));

    assert!(driver.emit_preview_frame());
    assert_eq!(driver.queued_buffers(), 1);
    eventually(|| seen.load(Ordering::SeqCst) == 1).await;
    eventually(|| driver.queued_buffers() == 2).await;

    let stats = engine.frame_stats();
    assert_eq!(stats.dispatched, 1);
    assert_eq!(stats.recycled, 1);

    assert!(engine.remove_frame_processor(&processor));
    assert!(driver.emit_preview_frame());
    eventually(|| engine.frame_stats().recycled == 2).await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_measure_follows_preview_aspect() {
    let driver = SimulatedDriver::new();
    let engine = engine(&driver, EngineConfig::default());

    let size = engine.measure(
        MeasureSpec::AtMost(500),
        MeasureSpec::AtMost(400),
        LayoutDimension::MatchParent,
        LayoutDimension::MatchParent,
    );
    assert_eq!(size, Size::new(500, 400));

    engine.surface_available(portrait_surface()).wait().await;
    engine.start().unwrap().wait().await;
    assert_eq!(
        engine.measure(
            MeasureSpec::Unconstrained,
            MeasureSpec::Unconstrained,
            LayoutDimension::WrapContent,
            LayoutDimension::WrapContent,
        ),
        Size::new(720, 960)
    );
    assert_eq!(
        engine.measure(
            MeasureSpec::Exact(360),
            MeasureSpec::Unconstrained,
            LayoutDimension::Fixed,
            LayoutDimension::WrapContent,
        ),
        Size::new(360, 480)
    );
}

#[tokio::test]
async fn test_shutdown_stops_camera() {
    let driver = SimulatedDriver::new();
    let engine = started(&driver, EngineConfig::default()).await;

    engine.shutdown().wait().await;
    assert!(!driver.is_open());
    assert_eq!(engine.state(), EngineState::Stopped);
}
