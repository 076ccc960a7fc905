//! Messages consumed by the session worker.

use super::RequestPurpose;
use crate::device::{CameraDevice, CaptureSession, CapturedFrame};
use crate::error::SessionError;
use crate::sizing::Size;
use crate::sync::{OwnershipToken, Rejected, WorkerHandle};
use std::fmt;
use std::sync::mpsc::Sender;

/// Asynchronous outcome reported by the hardware subsystem.
pub enum HardwareEvent {
    /// The device finished opening; ownership of the handle moves to the session.
    DeviceOpened(Box<dyn CameraDevice>),
    /// The device went away. Carries the handle if it was never delivered opened.
    DeviceDisconnected(Option<Box<dyn CameraDevice>>),
    /// The device reported a fatal error.
    DeviceError {
        /// The handle, if the error arrived before the device was delivered opened.
        device: Option<Box<dyn CameraDevice>>,
        /// Subsystem-specific error code.
        code: i32,
    },
    /// A session finished configuring.
    SessionConfigured {
        /// What the session was requested for.
        purpose: RequestPurpose,
        /// The configured session; ownership moves to the receiver.
        session: Box<dyn CaptureSession>,
    },
    /// The hardware rejected a session configuration.
    ConfigureFailed {
        /// What the rejected session was requested for.
        purpose: RequestPurpose,
    },
    /// A one-shot capture finished.
    CaptureCompleted,
    /// A one-shot capture failed.
    CaptureFailed {
        /// Description from the hardware.
        reason: String,
    },
    /// An image reader produced a frame.
    ImageAvailable(CapturedFrame),
}

impl HardwareEvent {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DeviceOpened(_) => "device-opened",
            Self::DeviceDisconnected(_) => "device-disconnected",
            Self::DeviceError { .. } => "device-error",
            Self::SessionConfigured { .. } => "session-configured",
            Self::ConfigureFailed { .. } => "configure-failed",
            Self::CaptureCompleted => "capture-completed",
            Self::CaptureFailed { .. } => "capture-failed",
            Self::ImageAvailable(_) => "image-available",
        }
    }

    /// Releases any handle carried by an event nobody will act on.
    pub(crate) fn discard(self) {
        match self {
            Self::DeviceOpened(device)
            | Self::DeviceDisconnected(Some(device))
            | Self::DeviceError {
                device: Some(device),
                ..
            } => device.close(),
            Self::SessionConfigured { session, .. } => session.close(),
            Self::ImageAvailable(frame) => frame.release(),
            Self::DeviceDisconnected(None)
            | Self::DeviceError { device: None, .. }
            | Self::ConfigureFailed { .. }
            | Self::CaptureCompleted
            | Self::CaptureFailed { .. } => {}
        }
    }
}

impl fmt::Debug for HardwareEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceError { code, .. } => write!(f, "DeviceError({code})"),
            Self::SessionConfigured { purpose, .. } => write!(f, "SessionConfigured({purpose:?})"),
            Self::ConfigureFailed { purpose } => write!(f, "ConfigureFailed({purpose:?})"),
            Self::ImageAvailable(frame) => write!(f, "ImageAvailable({frame:?})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Everything the session worker processes, in one queue.
pub enum SessionMessage {
    /// Begin opening the device. The token was acquired by the caller.
    Open {
        /// Size of the view the preview is shown in.
        viewport: Size,
        /// Held until the device reports back.
        token: OwnershipToken,
        /// Answered once the hardware accepted or refused the request.
        reply: Sender<Result<(), SessionError>>,
    },
    /// Give up on an open that has not completed yet.
    AbandonOpen,
    /// Release every device resource. The token was acquired by the caller.
    Close {
        /// Acquired by the caller; released once everything is closed.
        token: OwnershipToken,
        /// Answered when the session is `Closed`.
        reply: Sender<()>,
    },
    /// Take a still picture.
    Capture,
    /// A hardware callback, tagged with the open attempt it belongs to.
    Hardware {
        /// Open attempt the callback was issued for.
        generation: u64,
        /// The callback itself.
        event: HardwareEvent,
    },
}

/// Hands hardware callbacks to the session worker.
///
/// Each sink is stamped with the open attempt it was created for, so
/// callbacks from a superseded attempt are recognised as stale.
#[derive(Clone)]
pub struct EventSink {
    handle: WorkerHandle<SessionMessage>,
    generation: u64,
}

impl EventSink {
    pub(crate) fn new(handle: WorkerHandle<SessionMessage>, generation: u64) -> Self {
        Self { handle, generation }
    }

    /// Posts an event. Returns false if the worker has stopped, in which case
    /// any handle or frame carried by the event is released here.
    pub fn post(&self, event: HardwareEvent) -> bool {
        let message = SessionMessage::Hardware {
            generation: self.generation,
            event,
        };
        match self.handle.post(message) {
            Ok(()) => true,
            Err(Rejected(SessionMessage::Hardware { event, .. })) => {
                tracing::debug!(event = event.name(), "Worker stopped, releasing orphaned callback");
                event.discard();
                false
            }
            Err(Rejected(_)) => false,
        }
    }

    /// The open attempt this sink belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("generation", &self.generation)
            .finish()
    }
}
