//! The session state machine.
//!
//! Owns every device resource and is only ever driven from the session
//! worker thread. Resources are held as `Option`s that are `take()`n when
//! closed, so each is released exactly once however a path ends.
//!
//! ```text
//!   Closed ──open──▶ Opening ──opened──▶ Open ──▶ PreviewConfiguring ──▶ PreviewActive
//!     ▲                 │                               ▲                    │
//!     │                 │ error/disconnect              └──── completed ─ Capturing
//!     │                 ▼
//!     └──── close ── Closing ◀── close ── (any)          fault ──▶ Error
//! ```

use super::{
    AfMode, CaptureRequestDescriptor, ControlMode, EventSink, HardwareEvent, RequestPurpose,
    SessionMessage, SessionNotice, SessionState, SessionStatus, StreamConfig,
};
use crate::config::{SessionConfig, StorageConfig};
use crate::device::{
    CameraDevice, CaptureSession, CapturedFrame, HalError, ImageReader, LensFacing, StreamFormat,
};
use crate::error::SessionError;
use crate::metrics::SessionMetrics;
use crate::persist::{ImagePersister, PhotoNaming, JPEG_MIME_TYPE};
use crate::sizing::{choose_optimal_size, largest_by_area, preview_bound, select_still_size, Size};
use crate::sync::{Handler, OwnershipToken, WorkerError, WorkerHandle};
use crate::transform::preview_transform;
use std::sync::Arc;

use super::SessionDeps;

/// Camera chosen during open, with its negotiated streams.
struct SelectedDevice {
    id: String,
    stream: StreamConfig,
    /// Size of the JPEG reader attached to the preview session.
    reader_size: Size,
}

fn device_access(err: HalError) -> SessionError {
    SessionError::DeviceAccess(err.to_string())
}

/// Drives one camera device through open, preview, capture and close.
pub struct SessionStateMachine {
    config: SessionConfig,
    deps: SessionDeps,
    persister: ImagePersister,
    naming: PhotoNaming,
    status: Arc<SessionStatus>,
    metrics: SessionMetrics,
    handle: Option<WorkerHandle<SessionMessage>>,

    state: SessionState,
    /// Bumped on every open and close; callbacks stamped with an older
    /// value are stale.
    generation: u64,
    open_token: Option<OwnershipToken>,
    device: Option<Box<dyn CameraDevice>>,
    session: Option<Box<dyn CaptureSession>>,
    preview_reader: Option<Box<dyn ImageReader>>,
    still_reader: Option<Box<dyn ImageReader>>,
    stream: Option<StreamConfig>,
    still_request: Option<CaptureRequestDescriptor>,
    capture_completed: bool,
    image_received: bool,
}

impl SessionStateMachine {
    /// A machine in `Closed` that publishes to `status`.
    ///
    /// Nothing touches the hardware until the first `Open` message.
    pub fn new(
        config: SessionConfig,
        storage: &StorageConfig,
        deps: SessionDeps,
        status: Arc<SessionStatus>,
        metrics: SessionMetrics,
    ) -> Self {
        Self {
            persister: ImagePersister::new(Arc::clone(&deps.storage)),
            naming: PhotoNaming::new(storage),
            config,
            deps,
            status,
            metrics,
            handle: None,
            state: SessionState::Closed,
            generation: 0,
            open_token: None,
            device: None,
            session: None,
            preview_reader: None,
            still_reader: None,
            stream: None,
            still_request: None,
            capture_completed: false,
            image_received: false,
        }
    }

    /// Current state as seen by the worker.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns true if any device resource is still held.
    pub fn holds_resources(&self) -> bool {
        self.device.is_some()
            || self.session.is_some()
            || self.preview_reader.is_some()
            || self.still_reader.is_some()
            || self.open_token.is_some()
    }

    fn sink(&self) -> Result<EventSink, SessionError> {
        let handle = self.handle.clone().ok_or(WorkerError::Stopped)?;
        Ok(EventSink::new(handle, self.generation))
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        self.status.publish_state(to);
        self.metrics.set_state(to);
        tracing::debug!(%from, %to, "Session transition");
        self.status.notify(SessionNotice::StateChanged { from, to });
    }

    fn fail(&mut self, err: SessionError) {
        tracing::error!(error = %err, state = %self.state, "Camera session failed");
        self.status.end_capture();
        self.transition(SessionState::Error);
        self.status.notify(SessionNotice::Failed(err));
    }

    // ----- open -----

    fn open(&mut self, viewport: Size, token: OwnershipToken) -> Result<(), SessionError> {
        if self.state != SessionState::Closed {
            return Err(SessionError::InvalidState {
                operation: "open",
                state: self.state,
            });
        }

        self.generation += 1;
        self.transition(SessionState::Opening);
        match self.begin_open(viewport) {
            Ok(()) => {
                // Held until the device confirms (or fails) the open.
                self.open_token = Some(token);
                self.metrics.record_open();
                Ok(())
            }
            Err(err) => {
                token.release();
                self.release_resources();
                self.metrics.record_open_failure();
                self.fail(err.clone());
                Err(err)
            }
        }
    }

    fn begin_open(&mut self, viewport: Size) -> Result<(), SessionError> {
        let sink = self.sink()?;
        let selected = self.select_device(viewport)?;

        let reader = self
            .deps
            .hal
            .create_image_reader(
                selected.reader_size,
                StreamFormat::Jpeg,
                self.config.preview_reader_max_images,
                None,
            )
            .map_err(device_access)?;
        self.preview_reader = Some(reader);
        self.stream = Some(selected.stream);
        self.status.set_stream(Some(selected.stream));
        self.configure_transform(viewport);

        tracing::info!(
            device = %selected.id,
            preview = %selected.stream.preview,
            still = %selected.stream.still,
            "Opening camera device"
        );
        self.deps
            .hal
            .open_device(&selected.id, sink)
            .map_err(device_access)
    }

    /// Picks the first usable camera and negotiates its streams.
    fn select_device(&self, viewport: Size) -> Result<SelectedDevice, SessionError> {
        let bound = preview_bound(self.deps.display.display_bounds(), self.config.max_preview());

        for id in self.deps.hal.device_ids().map_err(device_access)? {
            let info = self.deps.hal.device_info(&id).map_err(device_access)?;
            if self.config.skip_front_facing && info.facing == Some(LensFacing::Front) {
                tracing::debug!(device = %id, "Skipping front-facing camera");
                continue;
            }
            let Some(catalog) = info.streams else {
                tracing::debug!(device = %id, "Skipping camera without stream catalog");
                continue;
            };
            let jpeg = catalog.output_sizes(StreamFormat::Jpeg);
            let Some(largest) = largest_by_area(jpeg) else {
                tracing::debug!(device = %id, "Skipping camera without JPEG output");
                continue;
            };

            let choice = match choose_optimal_size(
                catalog.output_sizes(StreamFormat::Texture),
                viewport,
                bound,
                largest,
            ) {
                Ok(choice) => choice,
                Err(e) => {
                    tracing::debug!(device = %id, error = %e, "Skipping camera");
                    continue;
                }
            };
            if choice.degraded {
                self.metrics.record_degraded_size();
                self.status.notify(SessionNotice::DegradedPreviewSize {
                    chosen: choice.size,
                    viewport,
                });
            }
            let still = select_still_size(jpeg, self.config.still_size).unwrap_or(largest);

            return Ok(SelectedDevice {
                id,
                stream: StreamConfig {
                    preview: choice.size,
                    still,
                    aspect_ratio: largest.reduced_ratio(),
                },
                reader_size: largest,
            });
        }

        Err(SessionError::DeviceAccess(
            "no usable camera device".to_owned(),
        ))
    }

    fn configure_transform(&self, viewport: Size) {
        if let Some(stream) = self.stream {
            let rotation = self.deps.display.current_rotation();
            self.deps
                .surface
                .set_transform(preview_transform(viewport, stream.preview, rotation));
        }
    }

    fn on_device_opened(&mut self, device: Box<dyn CameraDevice>) {
        if let Some(token) = self.open_token.take() {
            token.release();
        }
        tracing::info!(device = device.id(), "Camera device opened");
        self.device = Some(device);
        self.transition(SessionState::Open);
        self.start_preview();
    }

    fn on_device_lost(&mut self, device: Option<Box<dyn CameraDevice>>, code: Option<i32>) {
        if let Some(device) = device {
            device.close();
        }
        if let Some(token) = self.open_token.take() {
            token.release();
        }
        let was_opening = self.state == SessionState::Opening;
        self.release_resources();
        self.status.end_capture();
        self.metrics.record_device_error();

        match code {
            Some(code) => {
                tracing::error!(code, state = %self.state, "Camera device error");
                self.status.notify(SessionNotice::DeviceError { code });
            }
            None => {
                tracing::warn!(state = %self.state, "Camera device disconnected");
                self.status.notify(SessionNotice::DeviceDisconnected);
            }
        }
        self.transition(SessionState::Error);
        if was_opening {
            // Nothing was ever handed to the host; the failed open leaves
            // the session ready for another attempt.
            self.transition(SessionState::Closed);
        }
    }

    // ----- preview -----

    fn start_preview(&mut self) {
        if let Err(err) = self.configure_preview() {
            self.fail(err);
        }
    }

    fn configure_preview(&mut self) -> Result<(), SessionError> {
        let sink = self.sink()?;
        let (Some(stream), Some(reader)) = (self.stream, self.preview_reader.as_ref()) else {
            return Err(SessionError::ConfigurationFailed(
                "no negotiated preview stream".to_owned(),
            ));
        };
        let outputs = [self.deps.surface.surface_id(), reader.surface()];

        self.deps.surface.set_default_buffer_size(stream.preview);
        self.transition(SessionState::PreviewConfiguring);
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| SessionError::DeviceAccess("device is not open".to_owned()))?;
        device
            .create_session(&outputs, RequestPurpose::Preview, sink)
            .map_err(device_access)
    }

    fn on_preview_configured(&mut self, mut session: Box<dyn CaptureSession>) {
        if self.device.is_none() {
            tracing::debug!("Device closed before preview configured, discarding session");
            session.close();
            return;
        }

        let request = CaptureRequestDescriptor::builder(RequestPurpose::Preview)
            .target(self.deps.surface.surface_id())
            .af_mode(AfMode::ContinuousPicture)
            .build();
        if let Err(e) = session.set_repeating_request(&request) {
            session.close();
            self.fail(device_access(e));
            return;
        }

        self.session = Some(session);
        self.status.end_capture();
        self.transition(SessionState::PreviewActive);
        if let Some(stream) = self.stream {
            tracing::info!(preview = %stream.preview, "Preview started");
            self.status.notify(SessionNotice::PreviewStarted {
                preview: stream.preview,
            });
        }
    }

    // ----- capture -----

    fn capture(&mut self) {
        if self.state != SessionState::PreviewActive {
            tracing::debug!(state = %self.state, "Capture rejected");
            self.metrics.record_capture_rejected();
            self.status.end_capture();
            self.status
                .notify(SessionNotice::Failed(SessionError::InvalidState {
                    operation: "capture",
                    state: self.state,
                }));
            return;
        }
        if let Err(err) = self.begin_capture() {
            self.fail(err);
        }
    }

    fn begin_capture(&mut self) -> Result<(), SessionError> {
        let sink = self.sink()?;
        let stream = self.stream.ok_or_else(|| {
            SessionError::ConfigurationFailed("no negotiated still stream".to_owned())
        })?;
        if self.device.is_none() {
            return Err(SessionError::DeviceAccess("device is not open".to_owned()));
        }
        let rotation = self.deps.display.current_rotation();

        self.transition(SessionState::Capturing);
        self.metrics.record_capture();

        if let Some(previous) = self.still_reader.take() {
            previous.close();
        }
        let reader = self
            .deps
            .hal
            .create_image_reader(
                stream.still,
                StreamFormat::Jpeg,
                self.config.still_reader_max_images,
                Some(sink.clone()),
            )
            .map_err(device_access)?;
        let request = CaptureRequestDescriptor::builder(RequestPurpose::Still)
            .target(reader.surface())
            .control_mode(ControlMode::Auto)
            .jpeg_orientation(rotation.degrees())
            .build();
        let outputs = [reader.surface(), self.deps.surface.surface_id()];
        self.still_reader = Some(reader);
        self.still_request = Some(request);
        self.capture_completed = false;
        self.image_received = false;

        // The transient still session replaces the preview session.
        if let Some(preview) = self.session.take() {
            preview.close();
        }
        tracing::info!(still = %stream.still, rotation = rotation.degrees(), "Capturing still");
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| SessionError::DeviceAccess("device is not open".to_owned()))?;
        device
            .create_session(&outputs, RequestPurpose::Still, sink)
            .map_err(device_access)
    }

    fn on_still_configured(&mut self, mut session: Box<dyn CaptureSession>) {
        let Some(request) = self.still_request.clone() else {
            session.close();
            self.fail(SessionError::ConfigurationFailed(
                "still session configured without a request".to_owned(),
            ));
            return;
        };
        let submitted = self
            .sink()
            .and_then(|sink| session.capture(&request, sink).map_err(device_access));
        match submitted {
            Ok(()) => self.session = Some(session),
            Err(err) => {
                session.close();
                self.fail(err);
            }
        }
    }

    fn on_capture_completed(&mut self) {
        tracing::debug!("Still capture completed");
        if let Some(session) = self.session.take() {
            session.close();
        }
        self.still_request = None;
        self.capture_completed = true;
        self.release_still_reader_if_done();
        self.status.notify(SessionNotice::CaptureCompleted);
        self.start_preview();
    }

    fn on_capture_failed(&mut self, reason: String) {
        if let Some(session) = self.session.take() {
            session.close();
        }
        self.still_request = None;
        self.fail(SessionError::DeviceAccess(format!(
            "still capture failed: {reason}"
        )));
    }

    fn on_image_available(&mut self, frame: CapturedFrame) {
        self.persist_frame(frame);
        self.image_received = true;
        self.release_still_reader_if_done();
    }

    fn release_still_reader_if_done(&mut self) {
        if self.capture_completed && self.image_received {
            if let Some(reader) = self.still_reader.take() {
                reader.close();
            }
        }
    }

    fn persist_frame(&mut self, frame: CapturedFrame) {
        let path = self.naming.next_path();
        match self.persister.persist(frame, &path) {
            Ok(bytes) => {
                self.metrics.record_image_saved(bytes);
                self.deps.media.notify_new_file(&path, JPEG_MIME_TYPE);
                self.status.set_latest_file(path.clone());
                tracing::info!(path = %path.display(), bytes, "Image saved");
                self.status
                    .notify(SessionNotice::ImageSaved { path, bytes });
            }
            Err(err) => {
                self.metrics.record_persist_failure();
                self.status.notify(SessionNotice::Failed(err.into()));
            }
        }
    }

    // ----- close -----

    fn abandon_open(&mut self) {
        if self.state != SessionState::Opening {
            return;
        }
        tracing::info!("Abandoning pending device open");
        self.generation += 1;
        if let Some(token) = self.open_token.take() {
            token.release();
        }
        self.transition(SessionState::Closing);
    }

    fn close(&mut self, token: OwnershipToken) {
        if self.state == SessionState::Closed && !self.holds_resources() {
            token.release();
            return;
        }

        tracing::info!(state = %self.state, "Closing camera session");
        self.transition(SessionState::Closing);
        self.shut_down();
        token.release();
        self.transition(SessionState::Closed);
    }

    /// Invalidates outstanding callbacks and releases every resource.
    fn shut_down(&mut self) {
        self.generation += 1;
        if let Some(token) = self.open_token.take() {
            token.release();
        }
        self.release_resources();
        self.status.end_capture();
    }

    fn release_resources(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
        if let Some(device) = self.device.take() {
            device.close();
        }
        if let Some(reader) = self.preview_reader.take() {
            reader.close();
        }
        if let Some(reader) = self.still_reader.take() {
            reader.close();
        }
        self.still_request = None;
        self.capture_completed = false;
        self.image_received = false;
        if self.stream.take().is_some() {
            self.status.set_stream(None);
        }
    }

    // ----- hardware callbacks -----

    fn on_hardware(&mut self, generation: u64, event: HardwareEvent) {
        if generation != self.generation {
            match event {
                // Bytes already captured are still worth keeping.
                HardwareEvent::ImageAvailable(frame) => self.persist_frame(frame),
                other => {
                    tracing::debug!(
                        event = other.name(),
                        generation,
                        current = self.generation,
                        "Discarding stale hardware event"
                    );
                    other.discard();
                }
            }
            return;
        }

        tracing::trace!(event = event.name(), state = %self.state, "Hardware event");
        let state = self.state;
        match event {
            HardwareEvent::DeviceOpened(device) if state == SessionState::Opening => {
                self.on_device_opened(device)
            }
            HardwareEvent::DeviceDisconnected(device) => self.on_device_lost(device, None),
            HardwareEvent::DeviceError { device, code } => self.on_device_lost(device, Some(code)),
            HardwareEvent::SessionConfigured {
                purpose: RequestPurpose::Preview,
                session,
            } if state == SessionState::PreviewConfiguring => self.on_preview_configured(session),
            HardwareEvent::SessionConfigured {
                purpose: RequestPurpose::Still,
                session,
            } if state == SessionState::Capturing => self.on_still_configured(session),
            HardwareEvent::ConfigureFailed { purpose }
                if matches!(
                    (purpose, state),
                    (RequestPurpose::Preview, SessionState::PreviewConfiguring)
                        | (RequestPurpose::Still, SessionState::Capturing)
                ) =>
            {
                self.fail(SessionError::ConfigurationFailed(format!(
                    "{purpose:?} session rejected by device"
                )))
            }
            HardwareEvent::CaptureCompleted if state == SessionState::Capturing => {
                self.on_capture_completed()
            }
            HardwareEvent::CaptureFailed { reason } if state == SessionState::Capturing => {
                self.on_capture_failed(reason)
            }
            HardwareEvent::ImageAvailable(frame) => self.on_image_available(frame),
            other => {
                tracing::debug!(event = other.name(), %state, "Ignoring out-of-state hardware event");
                other.discard();
            }
        }
    }
}

impl Handler for SessionStateMachine {
    type Message = SessionMessage;

    fn started(&mut self, handle: WorkerHandle<SessionMessage>) {
        self.handle = Some(handle);
    }

    fn handle(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Open {
                viewport,
                token,
                reply,
            } => {
                let result = self.open(viewport, token);
                let _ = reply.send(result);
            }
            SessionMessage::AbandonOpen => self.abandon_open(),
            SessionMessage::Close { token, reply } => {
                self.close(token);
                let _ = reply.send(());
            }
            SessionMessage::Capture => self.capture(),
            SessionMessage::Hardware { generation, event } => self.on_hardware(generation, event),
        }
    }

    fn stopped(&mut self) {
        if self.holds_resources() || self.state != SessionState::Closed {
            tracing::warn!(state = %self.state, "Worker stopping with live session, releasing");
            self.transition(SessionState::Closing);
            self.shut_down();
            self.transition(SessionState::Closed);
        }
        self.handle = None;
    }
}

impl std::fmt::Debug for SessionStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStateMachine")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}
