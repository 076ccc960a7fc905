//! Session error taxonomy.

use crate::persist::PersistError;
use crate::session::SessionState;
use crate::sync::{LockTimeout, WorkerError};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by session and controller operations.
///
/// Cloneable so that one failure can be delivered to every notice subscriber.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The user has not granted camera access. Not retried.
    #[error("camera permission denied")]
    PermissionDenied,
    /// The device lock was not obtained in time. The caller may retry the
    /// whole open or close.
    #[error(transparent)]
    LockTimeout(#[from] LockTimeout),
    /// The hardware subsystem refused an operation.
    #[error("camera device access failed: {0}")]
    DeviceAccess(String),
    /// The hardware rejected a session configuration.
    #[error("capture session configuration failed: {0}")]
    ConfigurationFailed(String),
    /// The operation is not allowed in the current state.
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// State the session was in.
        state: SessionState,
    },
    /// Persisting a captured image failed. Session state is unaffected.
    #[error("failed to write image to {path}: {source}")]
    Io {
        /// File that could not be written.
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },
    /// The background worker could not be started, reached, or stopped.
    #[error(transparent)]
    Worker(#[from] WorkerError),
}

impl From<PersistError> for SessionError {
    fn from(err: PersistError) -> Self {
        Self::Io {
            path: err.path,
            source: Arc::new(err.source),
        }
    }
}
