//! Concurrency primitives for device ownership and callback serialization.
//!
//! - [`DeviceLock`] guards the open/close boundary of the physical device.
//! - [`Worker`] is the single background context on which all session state
//!   mutation happens.

mod lock;
mod worker;

pub use lock::{DeviceLock, LockTimeout, OwnershipToken, TimeoutCause};
pub use worker::{Handler, Rejected, Worker, WorkerError, WorkerHandle};
