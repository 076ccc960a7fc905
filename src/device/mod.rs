//! Camera hardware abstraction.
//!
//! The hardware subsystem is modelled as a set of traits whose asynchronous
//! results come back as [`HardwareEvent`](crate::session::HardwareEvent)s
//! through an [`EventSink`](crate::session::EventSink). Device, session and
//! reader handles are boxed trait objects closed by value, so each one can be
//! released at most once.

mod frame;
mod hal;
mod mock;
mod types;

pub use frame::CapturedFrame;
pub use hal::{CameraDevice, CameraHal, CaptureSession, HalError, ImageReader};
pub use mock::{MockBehavior, MockCounts, MockHal, OpenOutcome};
pub use types::{DeviceInfo, LensFacing, Rotation, StreamCatalog, StreamFormat, SurfaceId};
