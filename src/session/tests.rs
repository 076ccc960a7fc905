//! End-to-end session tests against the mock camera subsystem.

use super::*;
use crate::config::{SessionConfig, StorageConfig};
use crate::device::{
    DeviceInfo, LensFacing, MockBehavior, MockHal, OpenOutcome, Rotation, StreamCatalog,
    StreamFormat, SurfaceId,
};
use crate::error::SessionError;
use crate::host::headless::{FixedDisplay, OffscreenSurface, RecordingNotifier};
use crate::host::{FsStorage, StorageSink};
use crate::sizing::Size;
use crate::sync::TimeoutCause;
use std::io;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(5);
const VIEWPORT: Size = Size {
    width: 400,
    height: 300,
};

struct Harness {
    hal: Arc<MockHal>,
    display: Arc<FixedDisplay>,
    surface: Arc<OffscreenSurface>,
    media: Arc<RecordingNotifier>,
    dir: TempDir,
    session: CameraSession,
}

struct Builder {
    behavior: MockBehavior,
    devices: Vec<DeviceInfo>,
    config: SessionConfig,
    storage: Option<Arc<dyn StorageSink>>,
}

impl Builder {
    fn new() -> Self {
        Self {
            behavior: MockBehavior::default(),
            devices: MockHal::default_devices(),
            config: SessionConfig::default(),
            storage: None,
        }
    }

    fn behavior(mut self, behavior: MockBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    fn manual(self) -> Self {
        self.behavior(MockBehavior {
            manual_delivery: true,
            ..MockBehavior::default()
        })
    }

    fn devices(mut self, devices: Vec<DeviceInfo>) -> Self {
        self.devices = devices;
        self
    }

    fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    fn storage(mut self, storage: Arc<dyn StorageSink>) -> Self {
        self.storage = Some(storage);
        self
    }

    fn build(self) -> Harness {
        let hal = Arc::new(MockHal::with_devices(self.devices));
        hal.set_behavior(self.behavior);
        let display = Arc::new(FixedDisplay::new(Size::new(1080, 1920)));
        let surface = Arc::new(OffscreenSurface::new(SurfaceId(1), VIEWPORT));
        let media = Arc::new(RecordingNotifier::new());
        let dir = TempDir::new().unwrap();

        let storage_config = StorageConfig {
            pictures_root: dir.path().to_path_buf(),
            app_folder: "Camera".to_owned(),
        };
        let deps = SessionDeps {
            hal: hal.clone(),
            display: display.clone(),
            surface: surface.clone(),
            storage: self.storage.unwrap_or_else(|| Arc::new(FsStorage)),
            media: media.clone(),
        };
        let session = CameraSession::new(self.config, storage_config, deps).unwrap();

        Harness {
            hal,
            display,
            surface,
            media,
            dir,
            session,
        }
    }
}

impl Harness {
    fn wait_state(&self, state: SessionState) {
        assert!(
            self.session.wait_for_state(state, WAIT),
            "never reached {state}, stuck in {}",
            self.session.state()
        );
    }

    /// Delivers held callbacks until the session reaches `state`.
    fn pump_until(&self, state: SessionState) {
        let deadline = Instant::now() + WAIT;
        loop {
            self.hal.deliver_pending();
            if self
                .session
                .wait_for_state(state, Duration::from_millis(20))
            {
                return;
            }
            assert!(
                Instant::now() < deadline,
                "never reached {state}, stuck in {}",
                self.session.state()
            );
        }
    }

    /// Waits until the worker has queued at least `count` callbacks.
    fn wait_pending(&self, count: usize) {
        let deadline = Instant::now() + WAIT;
        while self.hal.pending() < count {
            assert!(Instant::now() < deadline, "callbacks never queued");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn open_preview(&mut self) {
        self.session.open(VIEWPORT).unwrap();
        self.wait_state(SessionState::PreviewActive);
    }
}

fn wait_notice(
    notices: &Receiver<SessionNotice>,
    mut predicate: impl FnMut(&SessionNotice) -> bool,
) -> SessionNotice {
    let deadline = Instant::now() + WAIT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match notices.recv_timeout(remaining) {
            Ok(notice) if predicate(&notice) => return notice,
            Ok(_) => continue,
            Err(e) => panic!("expected notice never arrived: {e}"),
        }
    }
}

struct FailingStorage;

impl StorageSink for FailingStorage {
    fn create_dir_all(&self, _dir: &Path) -> io::Result<()> {
        Ok(())
    }

    fn write(&self, _path: &Path, _bytes: &[u8]) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Other, "disk full"))
    }
}

#[test]
fn test_full_lifecycle_releases_everything_once() {
    let mut h = Builder::new().build();
    h.open_preview();

    let stream = h.session.stream_config().unwrap();
    assert_eq!(stream.preview, Size::new(480, 360));
    assert_eq!(stream.still, Size::new(4032, 3024));
    assert_eq!(stream.aspect_ratio, Size::new(4, 3));
    assert_eq!(h.surface.buffer_size(), Some(Size::new(480, 360)));
    assert!(h.surface.transform().is_some());
    assert!(!h.session.device_lock().is_held());

    let notices = h.session.subscribe();
    h.session.capture().unwrap();
    let saved = wait_notice(&notices, |n| matches!(n, SessionNotice::ImageSaved { .. }));
    wait_notice(&notices, |n| matches!(n, SessionNotice::PreviewStarted { .. }));

    let SessionNotice::ImageSaved { path, bytes } = saved else {
        unreachable!()
    };
    assert!(path.starts_with(h.dir.path().join("Camera")));
    assert_eq!(std::fs::read(&path).unwrap().len(), bytes);
    assert_eq!(h.session.latest_file(), Some(path.clone()));
    assert_eq!(h.media.files(), vec![(path, "image/jpeg".to_owned())]);

    h.session.close().unwrap();
    assert_eq!(h.session.state(), SessionState::Closed);
    assert!(h.session.stream_config().is_none());
    assert!(!h.session.device_lock().is_held());
    assert!(!h.session.is_running());

    let counts = h.hal.counts();
    assert_eq!(counts.device_opens, 1);
    assert_eq!(counts.device_closes, 1);
    // Preview, still, preview again.
    assert_eq!(counts.sessions_created, 3);
    assert_eq!(counts.session_closes, 3);
    assert_eq!(counts.readers_created, 2);
    assert_eq!(counts.reader_closes, 2);
    assert_eq!(counts.captures, 1);
    assert_eq!(counts.frames_delivered, 1);
    assert_eq!(counts.frames_released, 1);
    assert_eq!(h.hal.open_readers(), 0);
}

#[test]
fn test_preview_request_targets_surface_with_continuous_af() {
    let mut h = Builder::new().build();
    h.open_preview();

    let request = h.hal.last_repeating_request().unwrap();
    assert_eq!(request.purpose(), RequestPurpose::Preview);
    assert_eq!(request.targets(), &[SurfaceId(1)]);
    assert_eq!(request.af_mode(), Some(AfMode::ContinuousPicture));
    h.session.close().unwrap();
}

#[test]
fn test_still_request_carries_display_orientation() {
    let mut h = Builder::new().build();
    h.open_preview();
    h.display.set_rotation(Rotation::Deg90);

    let notices = h.session.subscribe();
    h.session.capture().unwrap();
    wait_notice(&notices, |n| matches!(n, SessionNotice::CaptureCompleted));

    let request = h.hal.last_still_request().unwrap();
    assert_eq!(request.purpose(), RequestPurpose::Still);
    assert_eq!(request.control_mode(), Some(ControlMode::Auto));
    assert_eq!(request.jpeg_orientation(), Some(90));
    assert_eq!(request.targets().len(), 1);
    assert_ne!(request.targets()[0], SurfaceId(1));
    h.session.close().unwrap();
}

#[test]
fn test_second_capture_rejected_while_first_in_flight() {
    let mut h = Builder::new().manual().build();
    h.session.open(VIEWPORT).unwrap();
    h.pump_until(SessionState::PreviewActive);

    h.session.capture().unwrap();
    assert!(matches!(
        h.session.capture(),
        Err(SessionError::InvalidState {
            operation: "capture",
            state: SessionState::Capturing,
        })
    ));

    h.wait_state(SessionState::Capturing);
    assert!(matches!(
        h.session.capture(),
        Err(SessionError::InvalidState { .. })
    ));

    // The in-flight capture is unaffected.
    h.pump_until(SessionState::PreviewActive);
    let counts = h.hal.counts();
    assert_eq!(counts.captures, 1);
    assert_eq!(counts.frames_released, 1);
    assert!(h.session.latest_file().is_some());

    let rendered = h.session.metrics().render().unwrap();
    assert!(rendered.contains("camera_session_captures_rejected_total 2"));

    // A capture is accepted again once preview is back.
    h.session.capture().unwrap();
    h.pump_until(SessionState::Capturing);
    h.pump_until(SessionState::PreviewActive);
    h.session.close().unwrap();
    assert_eq!(h.hal.counts().captures, 2);
}

#[test]
fn test_capture_rejected_when_not_previewing() {
    let h = Builder::new().build();
    assert!(matches!(
        h.session.capture(),
        Err(SessionError::InvalidState {
            state: SessionState::Closed,
            ..
        })
    ));
}

#[test]
fn test_close_while_opening_discards_late_open() {
    let mut h = Builder::new().manual().build();
    h.session.open(VIEWPORT).unwrap();
    assert_eq!(h.session.state(), SessionState::Opening);
    assert_eq!(h.hal.pending(), 1);

    h.session.close().unwrap();
    assert_eq!(h.session.state(), SessionState::Closed);
    assert!(!h.session.device_lock().is_held());
    assert_eq!(h.hal.counts().device_closes, 0);

    // The device opens after the session gave up on it.
    h.hal.deliver_pending();
    let counts = h.hal.counts();
    assert_eq!(counts.device_closes, 1);
    assert_eq!(counts.sessions_created, 0);
    assert_eq!(counts.reader_closes, counts.readers_created);
    assert_eq!(h.session.state(), SessionState::Closed);
}

#[test]
fn test_stale_open_after_reopen_is_ignored() {
    let mut h = Builder::new().manual().build();
    h.session.open(VIEWPORT).unwrap();
    h.session.close().unwrap();

    h.session.open(VIEWPORT).unwrap();
    assert_eq!(h.hal.pending(), 2);
    h.pump_until(SessionState::PreviewActive);

    let counts = h.hal.counts();
    assert_eq!(counts.device_opens, 2);
    assert_eq!(counts.device_closes, 1);
    assert_eq!(counts.sessions_created, 1);

    h.session.close().unwrap();
    assert_eq!(h.hal.counts().device_closes, 2);
}

#[test]
fn test_device_error_during_open_returns_to_closed() {
    let mut h = Builder::new()
        .behavior(MockBehavior {
            open: OpenOutcome::Error(3),
            ..MockBehavior::default()
        })
        .build();
    let notices = h.session.subscribe();

    h.session.open(VIEWPORT).unwrap();
    let notice = wait_notice(&notices, |n| matches!(n, SessionNotice::DeviceError { .. }));
    assert!(matches!(notice, SessionNotice::DeviceError { code: 3 }));
    h.wait_state(SessionState::Closed);

    assert!(!h.session.device_lock().is_held());
    let counts = h.hal.counts();
    assert_eq!(counts.device_closes, 1);
    assert_eq!(counts.reader_closes, counts.readers_created);

    h.session.close().unwrap();
    assert_eq!(h.session.state(), SessionState::Closed);
}

#[test]
fn test_disconnect_during_open_returns_to_closed() {
    let mut h = Builder::new()
        .behavior(MockBehavior {
            open: OpenOutcome::Disconnected,
            ..MockBehavior::default()
        })
        .build();
    let notices = h.session.subscribe();

    h.session.open(VIEWPORT).unwrap();
    wait_notice(&notices, |n| matches!(n, SessionNotice::DeviceDisconnected));
    h.wait_state(SessionState::Closed);
    assert!(!h.session.device_lock().is_held());
    assert_eq!(h.hal.counts().device_closes, 1);
    h.session.close().unwrap();
}

#[test]
fn test_refused_open_reports_device_access() {
    let mut h = Builder::new()
        .behavior(MockBehavior {
            open: OpenOutcome::Refused,
            ..MockBehavior::default()
        })
        .build();

    let result = h.session.open(VIEWPORT);
    assert!(matches!(result, Err(SessionError::DeviceAccess(_))));
    assert_eq!(h.session.state(), SessionState::Error);
    assert!(!h.session.device_lock().is_held());

    // Error requires close before another open.
    assert!(matches!(
        h.session.open(VIEWPORT),
        Err(SessionError::InvalidState {
            operation: "open",
            state: SessionState::Error,
        })
    ));
    h.session.close().unwrap();
    assert_eq!(h.session.state(), SessionState::Closed);
    let counts = h.hal.counts();
    assert_eq!(counts.device_opens, 0);
    assert_eq!(counts.reader_closes, counts.readers_created);
}

#[test]
fn test_preview_configuration_failure_enters_error() {
    let mut h = Builder::new()
        .behavior(MockBehavior {
            fail_preview_configure: true,
            ..MockBehavior::default()
        })
        .build();
    let notices = h.session.subscribe();

    h.session.open(VIEWPORT).unwrap();
    h.wait_state(SessionState::Error);
    let notice = wait_notice(&notices, |n| matches!(n, SessionNotice::Failed(_)));
    assert!(matches!(
        notice,
        SessionNotice::Failed(SessionError::ConfigurationFailed(_))
    ));
    assert!(h.session.capture().is_err());

    h.session.close().unwrap();
    let counts = h.hal.counts();
    assert_eq!(counts.device_closes, 1);
    assert_eq!(counts.session_closes, 0);
    assert_eq!(counts.reader_closes, counts.readers_created);
}

#[test]
fn test_still_configuration_failure_enters_error() {
    let mut h = Builder::new().build();
    h.open_preview();
    h.hal.set_behavior(MockBehavior {
        fail_still_configure: true,
        ..MockBehavior::default()
    });

    h.session.capture().unwrap();
    h.wait_state(SessionState::Error);
    assert!(!h.session.status().capture_pending());

    h.session.close().unwrap();
    let counts = h.hal.counts();
    assert_eq!(counts.device_closes, 1);
    assert_eq!(counts.session_closes, counts.sessions_created - 1);
    assert_eq!(counts.reader_closes, counts.readers_created);
}

#[test]
fn test_lock_timeout_when_ownership_withheld() {
    let config = SessionConfig {
        open_lock_timeout_ms: 50,
        ..SessionConfig::default()
    };
    let mut h = Builder::new().config(config).build();
    let held = h.session.device_lock().acquire(WAIT).unwrap();

    let result = h.session.open(VIEWPORT);
    match result {
        Err(SessionError::LockTimeout(timeout)) => {
            assert_eq!(timeout.cause, TimeoutCause::Elapsed);
        }
        other => panic!("expected lock timeout, got {other:?}"),
    }
    assert_eq!(h.session.state(), SessionState::Closed);
    assert_eq!(h.hal.counts().device_opens, 0);

    held.release();
    h.open_preview();
    h.session.close().unwrap();
}

#[test]
fn test_persist_failure_keeps_preview_running() {
    let mut h = Builder::new().storage(Arc::new(FailingStorage)).build();
    h.open_preview();
    let notices = h.session.subscribe();

    h.session.capture().unwrap();
    let notice = wait_notice(&notices, |n| matches!(n, SessionNotice::Failed(_)));
    assert!(matches!(notice, SessionNotice::Failed(SessionError::Io { .. })));
    wait_notice(&notices, |n| matches!(n, SessionNotice::PreviewStarted { .. }));

    assert_eq!(h.session.state(), SessionState::PreviewActive);
    assert!(h.session.latest_file().is_none());
    assert!(h.media.files().is_empty());
    assert_eq!(h.hal.counts().frames_released, 1);
    h.session.close().unwrap();
}

#[test]
fn test_close_with_capture_in_flight() {
    let mut h = Builder::new().manual().build();
    h.session.open(VIEWPORT).unwrap();
    h.pump_until(SessionState::PreviewActive);

    h.session.capture().unwrap();
    h.wait_state(SessionState::Capturing);
    // Only the still session's configuration; the capture it triggers
    // queues the image and the completion.
    h.wait_pending(1);
    assert!(h.hal.deliver_next());
    h.wait_pending(2);
    assert_eq!(h.session.state(), SessionState::Capturing);

    h.session.close().unwrap();
    assert_eq!(h.session.state(), SessionState::Closed);

    assert_eq!(h.hal.deliver_pending(), 2);
    let counts = h.hal.counts();
    // Preview and still only; no preview restarted after the close.
    assert_eq!(counts.sessions_created, 2);
    assert_eq!(counts.session_closes, 2);
    assert_eq!(counts.device_closes, 1);
    assert_eq!(counts.frames_delivered, 1);
    assert_eq!(counts.frames_released, 1);
    assert_eq!(counts.reader_closes, counts.readers_created);
    assert!(!h.session.device_lock().is_held());
}

fn assert_released_after_close(h: &mut Harness) {
    h.session.close().unwrap();
    assert_eq!(h.session.state(), SessionState::Closed);
    assert!(!h.session.device_lock().is_held());

    let counts = h.hal.counts();
    assert_eq!(counts.device_opens, 1);
    assert_eq!(counts.device_closes, 1);
    assert_eq!(counts.session_closes, counts.sessions_created);
    assert_eq!(counts.reader_closes, counts.readers_created);
    assert_eq!(counts.frames_released, counts.frames_delivered);
    assert_eq!(h.hal.open_readers(), 0);
}

#[test]
fn test_device_error_while_previewing_enters_error() {
    let mut h = Builder::new().build();
    h.open_preview();
    let notices = h.session.subscribe();

    assert!(h.hal.inject_device_error(4));
    let notice = wait_notice(&notices, |n| matches!(n, SessionNotice::DeviceError { .. }));
    assert!(matches!(notice, SessionNotice::DeviceError { code: 4 }));
    h.wait_state(SessionState::Error);

    assert!(!h.session.status().capture_pending());
    assert!(!h.session.device_lock().is_held());
    // Handles are already gone before the host closes.
    assert_eq!(h.hal.counts().device_closes, 1);
    assert!(matches!(
        h.session.capture(),
        Err(SessionError::InvalidState { .. })
    ));

    assert_released_after_close(&mut h);
}

#[test]
fn test_disconnect_while_previewing_enters_error() {
    let mut h = Builder::new().build();
    h.open_preview();
    let notices = h.session.subscribe();

    assert!(h.hal.inject_disconnect());
    wait_notice(&notices, |n| matches!(n, SessionNotice::DeviceDisconnected));
    h.wait_state(SessionState::Error);

    assert!(!h.session.status().capture_pending());
    assert!(!h.session.device_lock().is_held());

    assert_released_after_close(&mut h);

    // The session is usable again after the close.
    h.open_preview();
    h.session.close().unwrap();
}

#[test]
fn test_disconnect_during_capture_releases_still_resources() {
    let mut h = Builder::new().manual().build();
    h.session.open(VIEWPORT).unwrap();
    h.pump_until(SessionState::PreviewActive);

    h.session.capture().unwrap();
    h.wait_state(SessionState::Capturing);
    h.wait_pending(1);
    assert!(h.session.status().capture_pending());

    assert!(h.hal.inject_disconnect());
    // Still configuration first, then the disconnect.
    h.pump_until(SessionState::Error);
    assert!(!h.session.status().capture_pending());

    h.hal.deliver_pending();
    assert_released_after_close(&mut h);
}

#[test]
fn test_capture_failure_enters_error() {
    let mut h = Builder::new().build();
    h.open_preview();
    h.hal.set_behavior(MockBehavior {
        fail_capture: true,
        ..h.hal.behavior()
    });
    let notices = h.session.subscribe();

    h.session.capture().unwrap();
    let notice = wait_notice(&notices, |n| matches!(n, SessionNotice::Failed(_)));
    assert!(matches!(
        notice,
        SessionNotice::Failed(SessionError::DeviceAccess(_))
    ));
    h.wait_state(SessionState::Error);
    assert!(!h.session.status().capture_pending());

    let counts = h.hal.counts();
    assert_eq!(counts.captures, 1);
    assert_eq!(counts.frames_delivered, 0);
    // Preview session closed for the still, still session closed on failure.
    assert_eq!(counts.session_closes, 2);

    assert_released_after_close(&mut h);
}

#[test]
fn test_reopen_reuses_session() {
    let mut h = Builder::new().build();
    for _ in 0..3 {
        h.open_preview();
        h.session.close().unwrap();
    }
    let counts = h.hal.counts();
    assert_eq!(counts.device_opens, 3);
    assert_eq!(counts.device_closes, 3);
    assert_eq!(counts.reader_closes, counts.readers_created);
}

#[test]
fn test_open_twice_is_invalid() {
    let mut h = Builder::new().build();
    h.open_preview();
    assert!(matches!(
        h.session.open(VIEWPORT),
        Err(SessionError::InvalidState {
            operation: "open",
            state: SessionState::PreviewActive,
        })
    ));
    h.session.close().unwrap();
}

#[test]
fn test_close_without_open_is_noop() {
    let mut h = Builder::new().build();
    h.session.close().unwrap();
    assert_eq!(h.session.state(), SessionState::Closed);
    assert_eq!(h.hal.counts(), Default::default());
}

#[test]
fn test_front_only_device_is_unusable() {
    let front_only: Vec<DeviceInfo> = MockHal::default_devices()
        .into_iter()
        .filter(|d| d.facing == Some(LensFacing::Front))
        .collect();
    let mut h = Builder::new().devices(front_only.clone()).build();
    assert!(matches!(
        h.session.open(VIEWPORT),
        Err(SessionError::DeviceAccess(_))
    ));
    h.session.close().unwrap();

    let config = SessionConfig {
        skip_front_facing: false,
        ..SessionConfig::default()
    };
    let mut h = Builder::new().devices(front_only).config(config).build();
    h.open_preview();
    h.session.close().unwrap();
}

#[test]
fn test_degraded_preview_size_is_reported() {
    // 16:9 preview sizes only, against a 4:3 JPEG reference.
    let catalog = StreamCatalog::new()
        .with_sizes(
            StreamFormat::Texture,
            vec![Size::new(1280, 720), Size::new(640, 360)],
        )
        .with_sizes(StreamFormat::Jpeg, vec![Size::new(1600, 1200)]);
    let devices = vec![DeviceInfo {
        id: "7".to_owned(),
        facing: Some(LensFacing::External),
        streams: Some(catalog),
    }];
    let mut h = Builder::new().devices(devices).build();
    let notices = h.session.subscribe();

    h.open_preview();
    let notice = wait_notice(&notices, |n| {
        matches!(n, SessionNotice::DegradedPreviewSize { .. })
    });
    assert!(matches!(
        notice,
        SessionNotice::DegradedPreviewSize {
            chosen: Size {
                width: 1280,
                height: 720
            },
            ..
        }
    ));
    assert_eq!(h.session.stream_config().unwrap().preview, Size::new(1280, 720));
    h.session.close().unwrap();
}

#[test]
fn test_drop_closes_running_session() {
    let h = Builder::new().build();
    let hal = Arc::clone(&h.hal);
    let Harness { mut session, .. } = h;
    session.open(VIEWPORT).unwrap();
    assert!(session.wait_for_state(SessionState::PreviewActive, WAIT));
    drop(session);

    let counts = hal.counts();
    assert_eq!(counts.device_closes, 1);
    assert_eq!(counts.session_closes, counts.sessions_created);
}
