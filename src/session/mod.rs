//! The camera session: state machine, worker runtime and foreground API.
//!
//! All device resources (device handle, capture session, image readers) are
//! owned by a [`SessionStateMachine`] running on a dedicated worker thread.
//! Hardware callbacks and foreground commands reach it as
//! [`SessionMessage`]s on one FIFO queue, so every transition happens on that
//! thread in order. [`CameraSession`] is the foreground side: it arbitrates
//! the [`DeviceLock`](crate::sync::DeviceLock), posts commands and reads the
//! published [`SessionStatus`].

mod events;
mod machine;
mod request;
mod runtime;
mod state;
mod status;

pub use events::{EventSink, HardwareEvent, SessionMessage};
pub use machine::SessionStateMachine;
pub use request::{AfMode, CaptureRequestDescriptor, ControlMode, RequestBuilder, RequestPurpose};
pub use runtime::{CameraSession, SessionDeps};
pub use state::{SessionState, StreamConfig};
pub use status::{SessionNotice, SessionStatus};

#[cfg(test)]
mod tests;
