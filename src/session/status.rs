//! Foreground-visible view of the session.
//!
//! The worker publishes state here after every transition; the foreground
//! only reads it (and reserves the single capture slot). Nothing in this cell
//! is consulted by the state machine when deciding a transition.

use super::{SessionState, StreamConfig};
use crate::error::SessionError;
use crate::sizing::Size;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Outward signal from the session to its host.
#[derive(Debug, Clone)]
pub enum SessionNotice {
    /// The session moved between states.
    StateChanged {
        /// Previous state.
        from: SessionState,
        /// New state.
        to: SessionState,
    },
    /// The repeating preview request is running.
    PreviewStarted {
        /// Negotiated preview size.
        preview: Size,
    },
    /// No preview size satisfied the constraints; the first candidate was used.
    DegradedPreviewSize { chosen: Size, viewport: Size },
    /// A still capture finished on the hardware side.
    CaptureCompleted,
    /// A captured still was written to storage.
    ImageSaved { path: PathBuf, bytes: usize },
    /// Camera permission was refused by the user.
    PermissionDenied,
    /// The device disconnected.
    DeviceDisconnected,
    /// The device failed; hosts usually terminate the camera screen.
    DeviceError { code: i32 },
    /// An operation failed.
    Failed(SessionError),
}

#[derive(Debug, Default)]
struct StatusInner {
    state: SessionState,
    stream: Option<StreamConfig>,
    latest_file: Option<PathBuf>,
    capture_pending: bool,
    subscribers: Vec<Sender<SessionNotice>>,
}

/// Shared, read-mostly snapshot of the session.
#[derive(Debug, Default)]
pub struct SessionStatus {
    inner: Mutex<StatusInner>,
    changed: Condvar,
}

impl SessionStatus {
    /// A `Closed` session with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StatusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Stream configuration of the open session, if any.
    pub fn stream(&self) -> Option<StreamConfig> {
        self.lock().stream
    }

    /// Path of the most recently persisted image.
    pub fn latest_file(&self) -> Option<PathBuf> {
        self.lock().latest_file.clone()
    }

    /// Returns true while a capture is reserved or in flight.
    pub fn capture_pending(&self) -> bool {
        self.lock().capture_pending
    }

    /// Registers a new notice subscriber.
    pub fn subscribe(&self) -> Receiver<SessionNotice> {
        let (tx, rx) = mpsc::channel();
        self.lock().subscribers.push(tx);
        rx
    }

    /// Blocks until `predicate` holds for the state or `timeout` elapses.
    pub fn wait_until(
        &self,
        timeout: Duration,
        mut predicate: impl FnMut(SessionState) -> bool,
    ) -> Option<SessionState> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();
        loop {
            if predicate(inner.state) {
                return Some(inner.state);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            inner = self
                .changed
                .wait_timeout(inner, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Reserves the single capture slot if preview is running.
    pub(crate) fn try_begin_capture(&self) -> Result<(), SessionError> {
        let mut inner = self.lock();
        if inner.state != SessionState::PreviewActive || inner.capture_pending {
            let state = if inner.capture_pending {
                SessionState::Capturing
            } else {
                inner.state
            };
            return Err(SessionError::InvalidState {
                operation: "capture",
                state,
            });
        }
        inner.capture_pending = true;
        Ok(())
    }

    pub(crate) fn end_capture(&self) {
        self.lock().capture_pending = false;
    }

    pub(crate) fn publish_state(&self, state: SessionState) {
        self.lock().state = state;
        self.changed.notify_all();
    }

    pub(crate) fn set_stream(&self, stream: Option<StreamConfig>) {
        self.lock().stream = stream;
    }

    pub(crate) fn set_latest_file(&self, path: PathBuf) {
        self.lock().latest_file = Some(path);
    }

    /// Delivers a notice to every live subscriber, dropping closed ones.
    pub(crate) fn notify(&self, notice: SessionNotice) {
        self.lock()
            .subscribers
            .retain(|subscriber| subscriber.send(notice.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_capture_slot_is_exclusive() {
        let status = SessionStatus::new();
        assert!(matches!(
            status.try_begin_capture(),
            Err(SessionError::InvalidState {
                state: SessionState::Closed,
                ..
            })
        ));

        status.publish_state(SessionState::PreviewActive);
        status.try_begin_capture().unwrap();
        assert!(matches!(
            status.try_begin_capture(),
            Err(SessionError::InvalidState {
                state: SessionState::Capturing,
                ..
            })
        ));
        status.end_capture();
        status.try_begin_capture().unwrap();
    }

    #[test]
    fn test_wait_until_sees_published_state() {
        let status = Arc::new(SessionStatus::new());
        let publisher = Arc::clone(&status);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            publisher.publish_state(SessionState::PreviewActive);
        });
        let reached = status.wait_until(Duration::from_secs(5), |s| s == SessionState::PreviewActive);
        assert_eq!(reached, Some(SessionState::PreviewActive));
        handle.join().unwrap();

        assert_eq!(
            status.wait_until(Duration::from_millis(10), |s| s == SessionState::Closed),
            None
        );
    }

    #[test]
    fn test_notify_drops_closed_subscribers() {
        let status = SessionStatus::new();
        let kept = status.subscribe();
        drop(status.subscribe());
        status.notify(SessionNotice::CaptureCompleted);
        assert!(matches!(kept.try_recv(), Ok(SessionNotice::CaptureCompleted)));
        assert_eq!(status.lock().subscribers.len(), 1);
    }
}
