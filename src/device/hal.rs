//! Hardware subsystem traits.
//!
//! Calls on these traits only *start* operations. Their outcomes arrive later
//! as events posted through the [`EventSink`] passed in, possibly from a
//! thread the session does not control.

use super::{DeviceInfo, StreamFormat, SurfaceId};
use crate::session::{CaptureRequestDescriptor, EventSink, RequestPurpose};
use crate::sizing::Size;
use thiserror::Error;

/// Errors returned synchronously by the hardware subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HalError {
    /// No device with this identifier is attached.
    #[error("camera device not found: {0}")]
    DeviceNotFound(String),
    /// The subsystem refused to open the device.
    #[error("camera access refused: {0}")]
    AccessRefused(String),
    /// The requested reader, session or request cannot be set up.
    #[error("unsupported stream configuration: {0}")]
    Unsupported(String),
}

/// Entry point to the camera subsystem.
pub trait CameraHal: Send + Sync {
    /// Lists the identifiers of all attached devices.
    fn device_ids(&self) -> Result<Vec<String>, HalError>;

    /// Reads the capabilities of one device.
    fn device_info(&self, id: &str) -> Result<DeviceInfo, HalError>;

    /// Creates an image reader surface. Frames are delivered through `sink`
    /// as `ImageAvailable` events; a reader without a sink drops them.
    fn create_image_reader(
        &self,
        size: Size,
        format: StreamFormat,
        max_images: u32,
        sink: Option<EventSink>,
    ) -> Result<Box<dyn ImageReader>, HalError>;

    /// Starts opening a device. Completion arrives as `DeviceOpened`,
    /// `DeviceDisconnected` or `DeviceError`.
    fn open_device(&self, id: &str, sink: EventSink) -> Result<(), HalError>;
}

/// An opened camera device.
pub trait CameraDevice: Send {
    /// Identifier of the device.
    fn id(&self) -> &str;

    /// Starts configuring a capture session over `outputs`. Completion
    /// arrives as `SessionConfigured` or `ConfigureFailed` tagged with `purpose`.
    fn create_session(
        &mut self,
        outputs: &[SurfaceId],
        purpose: RequestPurpose,
        sink: EventSink,
    ) -> Result<(), HalError>;

    /// Closes the device.
    fn close(self: Box<Self>);
}

/// A configured capture session.
pub trait CaptureSession: Send {
    /// What the session was configured for.
    fn purpose(&self) -> RequestPurpose;

    /// Submits `request` for indefinite repetition.
    fn set_repeating_request(&mut self, request: &CaptureRequestDescriptor)
        -> Result<(), HalError>;

    /// Submits a one-shot capture. Completion arrives as `CaptureCompleted`
    /// or `CaptureFailed`.
    fn capture(
        &mut self,
        request: &CaptureRequestDescriptor,
        sink: EventSink,
    ) -> Result<(), HalError>;

    /// Closes the session, stopping any repeating request.
    fn close(self: Box<Self>);
}

/// A surface that receives encoded frames.
pub trait ImageReader: Send {
    /// The surface to target in capture requests.
    fn surface(&self) -> SurfaceId;

    /// Frame size the reader was created with.
    fn size(&self) -> Size;

    /// Closes the reader.
    fn close(self: Box<Self>);
}
