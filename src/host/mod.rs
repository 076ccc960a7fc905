//! Collaborators the session calls into.
//!
//! Permission prompting, display queries, the preview surface, storage and
//! gallery notification are host concerns. The session only sees these
//! narrow traits; [`headless`] provides in-process implementations and
//! [`FsStorage`] writes to the local filesystem.

mod fs;
pub mod headless;

pub use fs::FsStorage;

use crate::device::{Rotation, SurfaceId};
use crate::sizing::Size;
use crate::transform::Affine;
use std::io;
use std::path::Path;

/// Runtime camera permission.
pub trait PermissionProvider: Send + Sync {
    /// Whether camera access is currently granted.
    fn is_camera_permission_granted(&self) -> bool;

    /// Asks the user for access. The answer arrives later through
    /// `CameraController::permission_result`.
    fn request_camera_permission(&self);
}

/// Display geometry.
pub trait DisplayInfo: Send + Sync {
    /// Rotation of the display right now.
    fn current_rotation(&self) -> Rotation;
    /// Full display size in pixels, natural orientation.
    fn display_bounds(&self) -> Size;
}

/// The drawable target the preview is rendered into.
pub trait PreviewSurface: Send + Sync {
    /// Whether the surface can be drawn into yet.
    fn is_available(&self) -> bool;
    /// Current view size of the surface.
    fn size(&self) -> Size;
    /// Identifier used as a capture session output.
    fn surface_id(&self) -> SurfaceId;
    /// Sets the size of buffers the camera will produce into the surface.
    fn set_default_buffer_size(&self, size: Size);
    /// Sets the matrix mapping camera buffers onto the view.
    fn set_transform(&self, transform: Affine);
}

/// Durable byte storage.
pub trait StorageSink: Send + Sync {
    /// Creates `dir` and any missing parents.
    fn create_dir_all(&self, dir: &Path) -> io::Result<()>;

    /// Writes `bytes` to `path`, replacing any existing file.
    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;
}

/// Gallery / media index notification. Best-effort.
pub trait MediaNotifier: Send + Sync {
    /// Announces a newly written file.
    fn notify_new_file(&self, path: &Path, mime_type: &str);
}
