//! Writes captured frames to storage.

use crate::device::CapturedFrame;
use crate::host::StorageSink;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// MIME type announced for persisted stills.
pub const JPEG_MIME_TYPE: &str = "image/jpeg";

/// A failed write of one captured frame.
#[derive(Debug, Error)]
#[error("failed to persist image to {path}: {source}")]
pub struct PersistError {
    /// Target file.
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Consumes captured frames and writes them verbatim to storage.
///
/// Runs on the session worker. The frame is released exactly once whether
/// the write succeeds or not; failures are returned, never retried.
#[derive(Clone)]
pub struct ImagePersister {
    storage: Arc<dyn StorageSink>,
}

impl ImagePersister {
    /// Creates a persister writing through `storage`.
    pub fn new(storage: Arc<dyn StorageSink>) -> Self {
        Self { storage }
    }

    /// Writes `frame` to `dest`, creating parent directories as needed.
    /// Returns the number of bytes written.
    pub fn persist(&self, frame: CapturedFrame, dest: &Path) -> Result<usize, PersistError> {
        let result = self.write(frame.data(), dest);
        frame.release();

        match &result {
            Ok(bytes) => {
                tracing::debug!(path = %dest.display(), bytes, "Image persisted");
            }
            Err(e) => {
                tracing::error!(path = %dest.display(), error = %e.source, "Image persist failed");
            }
        }
        result
    }

    fn write(&self, bytes: &[u8], dest: &Path) -> Result<usize, PersistError> {
        let fail = |source| PersistError {
            path: dest.to_path_buf(),
            source,
        };
        if let Some(parent) = dest.parent() {
            self.storage.create_dir_all(parent).map_err(fail)?;
        }
        self.storage.write(dest, bytes).map_err(fail)?;
        Ok(bytes.len())
    }
}

impl std::fmt::Debug for ImagePersister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePersister").finish_non_exhaustive()
    }
}
