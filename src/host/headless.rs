//! In-process host collaborators.
//!
//! Useful for running a session without a UI: in tests, in the demo binary,
//! or on embedded targets where the preview goes to an offscreen buffer.

use super::{DisplayInfo, MediaNotifier, PermissionProvider, PreviewSurface};
use crate::device::{Rotation, SurfaceId};
use crate::sizing::Size;
use crate::transform::Affine;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Permission state held in memory.
#[derive(Debug, Default)]
pub struct StaticPermissions {
    granted: AtomicBool,
    requests: AtomicUsize,
}

impl StaticPermissions {
    /// Starts with permission `granted` or not.
    pub fn new(granted: bool) -> Self {
        Self {
            granted: AtomicBool::new(granted),
            requests: AtomicUsize::new(0),
        }
    }

    /// Simulates the user answering the permission prompt.
    pub fn set_granted(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }

    /// Number of times permission was requested.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl PermissionProvider for StaticPermissions {
    fn is_camera_permission_granted(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }

    fn request_camera_permission(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        tracing::info!("Camera permission requested");
    }
}

/// A display with fixed bounds and a settable rotation.
#[derive(Debug)]
pub struct FixedDisplay {
    bounds: Size,
    rotation: Mutex<Rotation>,
}

impl FixedDisplay {
    /// A display of `bounds`, at its natural rotation.
    pub fn new(bounds: Size) -> Self {
        Self {
            bounds,
            rotation: Mutex::new(Rotation::Deg0),
        }
    }

    /// Simulates the device being turned.
    pub fn set_rotation(&self, rotation: Rotation) {
        *self.rotation.lock().unwrap_or_else(PoisonError::into_inner) = rotation;
    }
}

impl DisplayInfo for FixedDisplay {
    fn current_rotation(&self) -> Rotation {
        *self.rotation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn display_bounds(&self) -> Size {
        self.bounds
    }
}

/// A preview target that records what the session asks of it.
#[derive(Debug)]
pub struct OffscreenSurface {
    id: SurfaceId,
    available: AtomicBool,
    size: Mutex<Size>,
    buffer_size: Mutex<Option<Size>>,
    transform: Mutex<Option<Affine>>,
}

impl OffscreenSurface {
    /// A surface that is already available at `size`.
    pub fn new(id: SurfaceId, size: Size) -> Self {
        Self {
            id,
            available: AtomicBool::new(true),
            size: Mutex::new(size),
            buffer_size: Mutex::new(None),
            transform: Mutex::new(None),
        }
    }

    /// A surface that has not been laid out yet.
    pub fn pending(id: SurfaceId) -> Self {
        let surface = Self::new(id, Size::new(0, 0));
        surface.available.store(false, Ordering::SeqCst);
        surface
    }

    /// Marks the surface available with the given view size.
    pub fn make_available(&self, size: Size) {
        *self.size.lock().unwrap_or_else(PoisonError::into_inner) = size;
        self.available.store(true, Ordering::SeqCst);
    }

    /// Last buffer size requested by the session.
    pub fn buffer_size(&self) -> Option<Size> {
        *self.buffer_size.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Last transform applied by the session.
    pub fn transform(&self) -> Option<Affine> {
        *self.transform.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PreviewSurface for OffscreenSurface {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn size(&self) -> Size {
        *self.size.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn surface_id(&self) -> SurfaceId {
        self.id
    }

    fn set_default_buffer_size(&self, size: Size) {
        *self.buffer_size.lock().unwrap_or_else(PoisonError::into_inner) = Some(size);
    }

    fn set_transform(&self, transform: Affine) {
        *self.transform.lock().unwrap_or_else(PoisonError::into_inner) = Some(transform);
    }
}

/// Logs new files and keeps a record of them.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    files: Mutex<Vec<(PathBuf, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files announced so far, with their MIME types.
    pub fn files(&self) -> Vec<(PathBuf, String)> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MediaNotifier for RecordingNotifier {
    fn notify_new_file(&self, path: &Path, mime_type: &str) {
        tracing::info!(path = %path.display(), mime_type, "New media file");
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((path.to_path_buf(), mime_type.to_owned()));
    }
}
