//! Exclusive device ownership with bounded waits.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why an acquire gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutCause {
    /// The wait bound elapsed while another holder kept the lock.
    Elapsed,
    /// The lock's internal state was poisoned by a panicking holder.
    Poisoned,
}

impl fmt::Display for TimeoutCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Elapsed => f.write_str("wait bound elapsed"),
            Self::Poisoned => f.write_str("lock state poisoned"),
        }
    }
}

/// Failure to obtain device ownership in time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not lock the camera device within {waited:?}: {cause}")]
pub struct LockTimeout {
    /// How long the caller waited.
    pub waited: Duration,
    /// Why the wait ended.
    pub cause: TimeoutCause,
}

#[derive(Debug, Default)]
struct LockState {
    holder: Option<u64>,
    next_ticket: u64,
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<LockState>,
    released: Condvar,
}

impl Inner {
    fn release(&self, ticket: u64) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.holder != Some(ticket) {
            return false;
        }
        state.holder = None;
        drop(state);
        self.released.notify_one();
        true
    }
}

/// Binary exclusive-access guard for device open/close calls.
///
/// Ownership is represented by an [`OwnershipToken`]. The token can be moved
/// to another thread (e.g. into a worker task that releases it when the
/// hardware confirms the open), and dropping it releases the lock, so no exit
/// path can leak ownership.
#[derive(Debug, Clone, Default)]
pub struct DeviceLock {
    inner: Arc<Inner>,
}

impl DeviceLock {
    /// Creates an unheld lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until ownership is obtained or `timeout` elapses.
    pub fn acquire(&self, timeout: Duration) -> Result<OwnershipToken, LockTimeout> {
        let started = Instant::now();
        let poisoned = || LockTimeout {
            waited: started.elapsed(),
            cause: TimeoutCause::Poisoned,
        };

        let guard = self.inner.state.lock().map_err(|_| poisoned())?;
        let (mut state, wait) = self
            .inner
            .released
            .wait_timeout_while(guard, timeout, |state| state.holder.is_some())
            .map_err(|_| poisoned())?;

        if wait.timed_out() && state.holder.is_some() {
            tracing::warn!(waited_ms = started.elapsed().as_millis() as u64, "Device lock timed out");
            return Err(LockTimeout {
                waited: started.elapsed(),
                cause: TimeoutCause::Elapsed,
            });
        }

        let ticket = state.next_ticket;
        state.next_ticket = state.next_ticket.wrapping_add(1);
        state.holder = Some(ticket);
        tracing::trace!(ticket, "Device lock acquired");

        Ok(OwnershipToken {
            inner: Arc::clone(&self.inner),
            ticket,
            released: false,
        })
    }

    /// Returns true if some token currently holds the lock.
    pub fn is_held(&self) -> bool {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .holder
            .is_some()
    }
}

/// Exclusive right to issue device open/close calls.
///
/// Released explicitly with [`OwnershipToken::release`] or implicitly on drop.
/// A token only ever releases its own hold; it cannot free a later holder.
#[must_use = "dropping the token releases the device lock immediately"]
pub struct OwnershipToken {
    inner: Arc<Inner>,
    ticket: u64,
    released: bool,
}

impl OwnershipToken {
    /// Releases ownership, waking one waiter.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.inner.release(self.ticket) {
            tracing::trace!(ticket = self.ticket, "Device lock released");
        }
    }
}

impl Drop for OwnershipToken {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl fmt::Debug for OwnershipToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnershipToken")
            .field("ticket", &self.ticket)
            .field("released", &self.released)
            .finish()
    }
}
