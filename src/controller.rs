//! Host-facing camera controller.
//!
//! Ties the [`CameraSession`] to the host lifecycle: permission prompts,
//! preview surface availability and pause/resume.

use crate::config::{SessionConfig, StorageConfig};
use crate::error::SessionError;
use crate::host::{DisplayInfo, PermissionProvider, PreviewSurface};
use crate::metrics::MetricsError;
use crate::session::{CameraSession, SessionDeps, SessionNotice, SessionState};
use crate::sizing::Size;
use crate::transform::preview_transform;
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

/// Request code the controller uses for the camera permission prompt.
pub const REQUEST_CAMERA_PERMISSION: i32 = 1;

/// Camera controller.
///
/// ```no_run
/// use camera_session::config::{SessionConfig, StorageConfig};
/// use camera_session::device::{MockHal, SurfaceId};
/// use camera_session::host::headless::{
///     FixedDisplay, OffscreenSurface, RecordingNotifier, StaticPermissions,
/// };
/// use camera_session::host::FsStorage;
/// use camera_session::{CameraController, SessionDeps, Size};
/// use std::sync::Arc;
///
/// let surface = Arc::new(OffscreenSurface::new(SurfaceId(1), Size::new(640, 480)));
/// let deps = SessionDeps {
///     hal: Arc::new(MockHal::new()),
///     display: Arc::new(FixedDisplay::new(Size::new(1080, 1920))),
///     surface: surface.clone(),
///     storage: Arc::new(FsStorage),
///     media: Arc::new(RecordingNotifier::new()),
/// };
/// let mut controller = CameraController::new(
///     SessionConfig::default(),
///     StorageConfig::default(),
///     deps,
///     Arc::new(StaticPermissions::new(true)),
/// )?;
/// controller.start()?;
/// controller.capture()?;
/// controller.pause()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct CameraController {
    session: CameraSession,
    permissions: Arc<dyn PermissionProvider>,
    surface: Arc<dyn PreviewSurface>,
    display: Arc<dyn DisplayInfo>,
    /// Viewport to open once permission is granted.
    deferred: Option<Size>,
    /// Between `start`/`resume` and `pause`.
    running: bool,
}

impl CameraController {
    /// Creates a controller around a new [`CameraSession`] built from `deps`.
    pub fn new(
        config: SessionConfig,
        storage: StorageConfig,
        deps: SessionDeps,
        permissions: Arc<dyn PermissionProvider>,
    ) -> Result<Self, MetricsError> {
        let surface = Arc::clone(&deps.surface);
        let display = Arc::clone(&deps.display);
        Ok(Self {
            session: CameraSession::new(config, storage, deps)?,
            permissions,
            surface,
            display,
            deferred: None,
            running: false,
        })
    }

    /// Starts the camera. Opens now if the preview surface is available,
    /// otherwise when [`on_surface_available`](Self::on_surface_available)
    /// is called.
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.running = true;
        if !self.surface.is_available() {
            tracing::debug!("Preview surface not ready, deferring open");
            return Ok(());
        }
        self.open(self.surface.size())
    }

    /// Same as [`start`](Self::start); the worker is restarted on demand.
    pub fn resume(&mut self) -> Result<(), SessionError> {
        self.start()
    }

    /// Closes the session and stops its worker.
    pub fn pause(&mut self) -> Result<(), SessionError> {
        self.running = false;
        self.deferred = None;
        self.session.close()
    }

    /// Opens the camera for `viewport`, prompting for permission first if needed.
    ///
    /// Returns [`SessionError::PermissionDenied`] when a prompt was issued;
    /// the open is retried from [`permission_result`](Self::permission_result).
    pub fn open(&mut self, viewport: Size) -> Result<(), SessionError> {
        if !self.permissions.is_camera_permission_granted() {
            tracing::info!(%viewport, "Camera permission missing, requesting");
            self.deferred = Some(viewport);
            self.permissions.request_camera_permission();
            return Err(SessionError::PermissionDenied);
        }
        self.session.open(viewport)
    }

    /// Requests a still capture; see [`CameraSession::capture`].
    pub fn capture(&self) -> Result<(), SessionError> {
        self.session.capture()
    }

    /// Handles the answer to a permission prompt.
    ///
    /// Returns false if `request_code` is not the camera request.
    pub fn permission_result(&mut self, request_code: i32, granted: bool) -> bool {
        if request_code != REQUEST_CAMERA_PERMISSION {
            return false;
        }

        if !granted {
            tracing::warn!("Camera permission denied");
            self.deferred = None;
            self.session.notify(SessionNotice::PermissionDenied);
            return true;
        }

        // The grant is authoritative; the provider may not have caught up yet.
        if let Some(viewport) = self.deferred.take() {
            if let Err(e) = self.session.open(viewport) {
                tracing::error!(error = %e, "Open after permission grant failed");
                self.session.notify(SessionNotice::Failed(e));
            }
        }
        true
    }

    /// Opens for `size` if the controller is running and nothing is open yet.
    pub fn on_surface_available(&mut self, size: Size) -> Result<(), SessionError> {
        if !self.running || self.session.state() != SessionState::Closed {
            return Ok(());
        }
        self.open(size)
    }

    /// Only the transform is recomputed; the negotiated streams are kept
    /// until the next open.
    pub fn on_surface_size_changed(&self, size: Size) {
        self.configure_transform(size);
    }

    /// The surface may always be released; the session does not hold it.
    pub fn on_surface_destroyed(&self) -> bool {
        true
    }

    /// Recomputes the preview transform for a view of `view` size.
    pub fn configure_transform(&self, view: Size) {
        let Some(stream) = self.session.stream_config() else {
            return;
        };
        let transform = preview_transform(view, stream.preview, self.display.current_rotation());
        self.surface.set_transform(transform);
    }

    /// Path of the most recently saved picture.
    pub fn latest_file(&self) -> Option<PathBuf> {
        self.session.latest_file()
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Subscribes to session notices.
    pub fn subscribe(&self) -> Receiver<SessionNotice> {
        self.session.subscribe()
    }

    /// The underlying session.
    pub fn session(&self) -> &CameraSession {
        &self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{MockHal, Rotation, SurfaceId};
    use crate::host::headless::{FixedDisplay, OffscreenSurface, RecordingNotifier, StaticPermissions};
    use crate::host::FsStorage;
    use crate::transform::Affine;
    use std::time::Duration;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(5);

    struct Fixture {
        hal: Arc<MockHal>,
        permissions: Arc<StaticPermissions>,
        surface: Arc<OffscreenSurface>,
        display: Arc<FixedDisplay>,
        _dir: TempDir,
        controller: CameraController,
    }

    fn fixture(granted: bool, surface: OffscreenSurface) -> Fixture {
        let hal = Arc::new(MockHal::new());
        let permissions = Arc::new(StaticPermissions::new(granted));
        let surface = Arc::new(surface);
        let display = Arc::new(FixedDisplay::new(Size::new(1080, 1920)));
        let dir = TempDir::new().unwrap();
        let deps = SessionDeps {
            hal: hal.clone(),
            display: display.clone(),
            surface: surface.clone(),
            storage: Arc::new(FsStorage),
            media: Arc::new(RecordingNotifier::new()),
        };
        let storage = StorageConfig {
            pictures_root: dir.path().to_path_buf(),
            app_folder: "Camera".to_owned(),
        };
        let controller =
            CameraController::new(SessionConfig::default(), storage, deps, permissions.clone())
                .unwrap();
        Fixture {
            hal,
            permissions,
            surface,
            display,
            _dir: dir,
            controller,
        }
    }

    fn ready_surface() -> OffscreenSurface {
        OffscreenSurface::new(SurfaceId(1), Size::new(400, 300))
    }

    fn wait_preview(controller: &CameraController) {
        assert!(
            controller
                .session()
                .wait_for_state(SessionState::PreviewActive, WAIT),
            "stuck in {}",
            controller.state()
        );
    }

    #[test]
    fn test_start_opens_when_surface_ready() {
        let mut f = fixture(true, ready_surface());
        f.controller.start().unwrap();
        wait_preview(&f.controller);
        f.controller.pause().unwrap();
        assert_eq!(f.controller.state(), SessionState::Closed);
        assert_eq!(f.hal.counts().device_closes, 1);
    }

    #[test]
    fn test_start_defers_until_surface_available() {
        let mut f = fixture(true, OffscreenSurface::pending(SurfaceId(1)));
        f.controller.start().unwrap();
        assert_eq!(f.hal.counts().device_opens, 0);

        f.surface.make_available(Size::new(400, 300));
        f.controller.on_surface_available(Size::new(400, 300)).unwrap();
        wait_preview(&f.controller);
        assert!(f.controller.on_surface_destroyed());
        f.controller.pause().unwrap();
    }

    #[test]
    fn test_surface_available_ignored_when_paused() {
        let mut f = fixture(true, ready_surface());
        f.controller.on_surface_available(Size::new(400, 300)).unwrap();
        assert_eq!(f.hal.counts().device_opens, 0);
    }

    #[test]
    fn test_permission_prompt_then_grant_opens() {
        let mut f = fixture(false, ready_surface());
        assert!(matches!(
            f.controller.start(),
            Err(SessionError::PermissionDenied)
        ));
        assert_eq!(f.permissions.requests(), 1);
        assert_eq!(f.hal.counts().device_opens, 0);

        f.permissions.set_granted(true);
        assert!(f.controller.permission_result(REQUEST_CAMERA_PERMISSION, true));
        wait_preview(&f.controller);
        f.controller.pause().unwrap();
    }

    #[test]
    fn test_grant_opens_before_provider_reports_it() {
        let mut f = fixture(false, ready_surface());
        assert!(f.controller.start().is_err());

        assert!(f.controller.permission_result(REQUEST_CAMERA_PERMISSION, true));
        wait_preview(&f.controller);
        assert_eq!(f.hal.counts().device_opens, 1);
        assert_eq!(f.permissions.requests(), 1);
        f.controller.pause().unwrap();
    }

    #[test]
    fn test_permission_denied_emits_notice() {
        let mut f = fixture(false, ready_surface());
        let notices = f.controller.subscribe();
        let _ = f.controller.start();

        assert!(f.controller.permission_result(REQUEST_CAMERA_PERMISSION, false));
        assert!(matches!(
            notices.recv_timeout(WAIT),
            Ok(SessionNotice::PermissionDenied)
        ));
        assert_eq!(f.controller.state(), SessionState::Closed);
        assert_eq!(f.hal.counts().device_opens, 0);
    }

    #[test]
    fn test_foreign_permission_request_is_not_handled() {
        let mut f = fixture(true, ready_surface());
        assert!(!f.controller.permission_result(42, true));
    }

    #[test]
    fn test_size_change_reconfigures_transform() {
        let mut f = fixture(true, ready_surface());
        f.controller.start().unwrap();
        wait_preview(&f.controller);
        assert_eq!(f.surface.transform(), Some(Affine::IDENTITY));

        f.display.set_rotation(Rotation::Deg90);
        f.controller.on_surface_size_changed(Size::new(300, 400));
        let transform = f.surface.transform().unwrap();
        assert_ne!(transform, Affine::IDENTITY);
        f.controller.pause().unwrap();
    }

    #[test]
    fn test_pause_resume_cycle_saves_pictures() {
        let mut f = fixture(true, ready_surface());
        for _ in 0..2 {
            f.controller.resume().unwrap();
            wait_preview(&f.controller);
            let notices = f.controller.subscribe();
            f.controller.capture().unwrap();
            loop {
                match notices.recv_timeout(WAIT) {
                    Ok(SessionNotice::ImageSaved { .. }) => break,
                    Ok(_) => continue,
                    Err(e) => panic!("no image saved: {e}"),
                }
            }
            f.controller.pause().unwrap();
        }
        assert!(f.controller.latest_file().is_some());
        let counts = f.hal.counts();
        assert_eq!(counts.device_opens, 2);
        assert_eq!(counts.device_closes, 2);
        assert_eq!(counts.frames_released, 2);
    }
}
