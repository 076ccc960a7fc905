//! Foreground side of the camera session.

use super::{SessionMessage, SessionNotice, SessionState, SessionStateMachine, SessionStatus, StreamConfig};
use crate::config::{SessionConfig, StorageConfig};
use crate::device::CameraHal;
use crate::error::SessionError;
use crate::host::{DisplayInfo, MediaNotifier, PreviewSurface, StorageSink};
use crate::metrics::{MetricsError, SessionMetrics};
use crate::sizing::Size;
use crate::sync::{DeviceLock, Worker, WorkerError};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

const WORKER_NAME: &str = "camera-session";

/// External collaborators of a session.
#[derive(Clone)]
pub struct SessionDeps {
    /// Camera subsystem.
    pub hal: Arc<dyn CameraHal>,
    /// Display rotation and bounds.
    pub display: Arc<dyn DisplayInfo>,
    /// Target of the repeating preview request.
    pub surface: Arc<dyn PreviewSurface>,
    /// Where captured stills are written.
    pub storage: Arc<dyn StorageSink>,
    /// Told about each saved still.
    pub media: Arc<dyn MediaNotifier>,
}

/// Owns the session worker and the device lock.
///
/// `open` and `close` block the caller for at most the configured lock and
/// command timeouts; everything after the hardware accepts a request happens
/// asynchronously on the worker and is observable through [`state`],
/// [`wait_for_state`] and [`subscribe`].
///
/// [`state`]: CameraSession::state
/// [`wait_for_state`]: CameraSession::wait_for_state
/// [`subscribe`]: CameraSession::subscribe
pub struct CameraSession {
    config: SessionConfig,
    storage: StorageConfig,
    deps: SessionDeps,
    lock: DeviceLock,
    status: Arc<SessionStatus>,
    metrics: SessionMetrics,
    /// The state machine while no worker is running.
    idle: Option<SessionStateMachine>,
    worker: Option<Worker<SessionStateMachine>>,
}

impl CameraSession {
    /// A closed session. No thread is started until the first open.
    pub fn new(
        config: SessionConfig,
        storage: StorageConfig,
        deps: SessionDeps,
    ) -> Result<Self, MetricsError> {
        let metrics = SessionMetrics::new()?;
        Ok(Self {
            config,
            storage,
            deps,
            lock: DeviceLock::new(),
            status: Arc::new(SessionStatus::new()),
            metrics,
            idle: None,
            worker: None,
        })
    }

    /// Starts opening the first usable camera for a preview of `viewport`.
    ///
    /// Returns once the hardware has accepted the open request. The session
    /// then reaches `PreviewActive` on its own, or `Closed`/`Error` if the
    /// device fails.
    pub fn open(&mut self, viewport: Size) -> Result<(), SessionError> {
        let state = self.status.state();
        if state != SessionState::Closed {
            return Err(SessionError::InvalidState {
                operation: "open",
                state,
            });
        }
        self.start_worker()?;

        let token = match self.lock.acquire(self.config.open_lock_timeout()) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "Could not take camera ownership for open");
                self.metrics.record_lock_timeout();
                self.metrics.record_open_failure();
                return Err(e.into());
            }
        };

        let (reply, response) = mpsc::channel();
        self.post(SessionMessage::Open {
            viewport,
            token,
            reply,
        })?;
        self.await_reply(&response)?
    }

    /// Releases every device resource and stops the worker.
    ///
    /// Abandons an open still in flight. Returns `Ok` without doing anything
    /// if no session is running.
    pub fn close(&mut self) -> Result<(), SessionError> {
        if self.worker.is_none() {
            return Ok(());
        }

        // Lets a pending open give its token back instead of holding it
        // until the hardware answers.
        if let Err(e) = self.post(SessionMessage::AbandonOpen) {
            tracing::debug!(error = %e, "Worker gone before close");
        }

        let token = match self.lock.acquire(self.config.close_lock_timeout()) {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(error = %e, "Could not take camera ownership for close");
                self.metrics.record_lock_timeout();
                return Err(e.into());
            }
        };

        let (reply, done) = mpsc::channel();
        self.post(SessionMessage::Close { token, reply })?;
        self.await_reply(&done)?;
        self.stop_worker()
    }

    /// Requests a still capture.
    ///
    /// Only accepted while preview is running and no other capture is in
    /// flight; the picture is saved asynchronously and announced with
    /// [`SessionNotice::ImageSaved`].
    pub fn capture(&self) -> Result<(), SessionError> {
        if let Err(e) = self.status.try_begin_capture() {
            tracing::debug!(error = %e, "Capture rejected");
            self.metrics.record_capture_rejected();
            return Err(e);
        }
        if let Err(e) = self.post(SessionMessage::Capture) {
            self.status.end_capture();
            return Err(e);
        }
        Ok(())
    }

    /// Current state, as last published by the worker.
    pub fn state(&self) -> SessionState {
        self.status.state()
    }

    /// Blocks until the session reaches `target`. Returns false on timeout.
    pub fn wait_for_state(&self, target: SessionState, timeout: Duration) -> bool {
        self.status
            .wait_until(timeout, |state| state == target)
            .is_some()
    }

    /// Stream configuration negotiated for the open device.
    pub fn stream_config(&self) -> Option<StreamConfig> {
        self.status.stream()
    }

    /// Path of the most recently saved picture.
    pub fn latest_file(&self) -> Option<PathBuf> {
        self.status.latest_file()
    }

    /// Receives every notice sent after this call.
    pub fn subscribe(&self) -> Receiver<SessionNotice> {
        self.status.subscribe()
    }

    /// The shared status cell.
    pub fn status(&self) -> &Arc<SessionStatus> {
        &self.status
    }

    /// Session metrics registry.
    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    pub fn device_lock(&self) -> &DeviceLock {
        &self.lock
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether the worker thread is running.
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Posts a host-level notice (e.g. a permission refusal) to subscribers.
    pub(crate) fn notify(&self, notice: SessionNotice) {
        self.status.notify(notice);
    }

    fn start_worker(&mut self) -> Result<(), SessionError> {
        if self.worker.is_some() {
            return Ok(());
        }
        let machine = self.idle.take().unwrap_or_else(|| {
            SessionStateMachine::new(
                self.config.clone(),
                &self.storage,
                self.deps.clone(),
                Arc::clone(&self.status),
                self.metrics.clone(),
            )
        });
        self.worker = Some(Worker::spawn(WORKER_NAME, machine)?);
        Ok(())
    }

    fn stop_worker(&mut self) -> Result<(), SessionError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        match worker.stop(self.config.worker_shutdown_timeout()) {
            Ok(machine) => {
                self.idle = Some(machine);
                Ok(())
            }
            Err(e) => {
                // The machine is lost; the next open starts a fresh one.
                tracing::error!(error = %e, "Session worker did not stop cleanly");
                Err(e.into())
            }
        }
    }

    fn post(&self, message: SessionMessage) -> Result<(), SessionError> {
        let worker = self.worker.as_ref().ok_or(WorkerError::Stopped)?;
        worker
            .post(message)
            .map_err(|_| SessionError::Worker(WorkerError::Stopped))
    }

    fn await_reply<T>(&self, response: &Receiver<T>) -> Result<T, SessionError> {
        let timeout = self.config.command_timeout();
        response.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => SessionError::Worker(WorkerError::ReplyTimeout(timeout)),
            RecvTimeoutError::Disconnected => SessionError::Worker(WorkerError::Panicked),
        })
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(e) = self.close() {
                tracing::warn!(error = %e, "Camera session did not close cleanly on drop");
            }
        }
    }
}

impl std::fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSession")
            .field("state", &self.status.state())
            .field("running", &self.worker.is_some())
            .field("lock", &self.lock)
            .finish_non_exhaustive()
    }
}
