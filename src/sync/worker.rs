//! Single-threaded FIFO worker.
//!
//! A [`Worker`] owns one [`Handler`] and feeds it messages on a dedicated
//! thread, strictly in posting order. Anything that needs to reach the
//! handler (foreground commands, hardware callbacks from foreign threads)
//! goes through a cloneable [`WorkerHandle`]. The handler itself is moved
//! into the thread on spawn and handed back on orderly stop.

use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while running or stopping a worker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),
    /// The queue was not drained in time; the thread is left detached.
    #[error("worker did not drain within {0:?}")]
    ShutdownTimeout(Duration),
    #[error("worker thread panicked")]
    Panicked,
    #[error("worker is not accepting messages")]
    Stopped,
    /// A command was posted but its reply never came.
    #[error("worker did not answer within {0:?}")]
    ReplyTimeout(Duration),
    /// `stop` was called from the worker thread itself.
    #[error("a worker cannot stop itself")]
    SelfStop,
}

/// State owned by a worker and driven by its messages.
pub trait Handler: Send + 'static {
    /// Message type consumed by [`Handler::handle`].
    type Message: Send + 'static;

    /// Called on the worker thread before the first message.
    fn started(&mut self, _handle: WorkerHandle<Self::Message>) {}

    /// Processes one message.
    fn handle(&mut self, message: Self::Message);

    /// Called on the worker thread after the queue has drained.
    fn stopped(&mut self) {}
}

/// A message the worker refused because it is shutting down.
pub struct Rejected<M>(pub M);

impl<M> fmt::Debug for Rejected<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Rejected(..)")
    }
}

type Slot<M> = Arc<Mutex<Option<Sender<M>>>>;

/// Posting side of a worker queue.
pub struct WorkerHandle<M> {
    slot: Slot<M>,
}

impl<M> Clone for WorkerHandle<M> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<M: Send> WorkerHandle<M> {
    /// Enqueues a message. Returns it back if the worker has begun stopping.
    pub fn post(&self, message: M) -> Result<(), Rejected<M>> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(sender) => sender.send(message).map_err(|e| Rejected(e.0)),
            None => Err(Rejected(message)),
        }
    }

    /// Returns true until shutdown has been requested.
    pub fn is_accepting(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    // Dropping the only sender lets the receive loop drain and exit.
    fn close(&self) {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// A dedicated thread processing one handler's messages in FIFO order.
pub struct Worker<H: Handler> {
    name: String,
    handle: WorkerHandle<H::Message>,
    done: Receiver<()>,
    thread: Option<JoinHandle<H>>,
    thread_id: ThreadId,
}

impl<H: Handler> Worker<H> {
    /// Spawns the worker thread and moves `handler` onto it.
    pub fn spawn(name: &str, mut handler: H) -> Result<Self, WorkerError> {
        let (sender, receiver) = mpsc::channel::<H::Message>();
        let handle = WorkerHandle {
            slot: Arc::new(Mutex::new(Some(sender))),
        };
        let (done_tx, done_rx) = mpsc::channel();

        let own_handle = handle.clone();
        let thread = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                handler.started(own_handle);
                while let Ok(message) = receiver.recv() {
                    handler.handle(message);
                }
                handler.stopped();
                let _ = done_tx.send(());
                handler
            })
            .map_err(|e| WorkerError::Spawn(e.to_string()))?;

        tracing::debug!(worker = name, "Worker started");
        Ok(Self {
            name: name.to_owned(),
            handle,
            done: done_rx,
            thread_id: thread.thread().id(),
            thread: Some(thread),
        })
    }

    /// Returns a handle for posting messages.
    pub fn handle(&self) -> WorkerHandle<H::Message> {
        self.handle.clone()
    }

    /// Posts a message.
    pub fn post(&self, message: H::Message) -> Result<(), Rejected<H::Message>> {
        self.handle.post(message)
    }

    /// Stops accepting messages, lets pending ones run, and returns the handler.
    ///
    /// Blocks until the queue has drained or `timeout` elapses. On timeout the
    /// thread is left to finish on its own and the handler is not recovered.
    pub fn stop(mut self, timeout: Duration) -> Result<H, WorkerError> {
        if thread::current().id() == self.thread_id {
            return Err(WorkerError::SelfStop);
        }
        self.handle.close();

        let thread = self.thread.take().ok_or(WorkerError::Stopped)?;
        match self.done.recv_timeout(timeout) {
            Ok(()) => {
                let handler = thread.join().map_err(|_| WorkerError::Panicked)?;
                tracing::debug!(worker = %self.name, "Worker stopped");
                Ok(handler)
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    worker = %self.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Worker did not drain in time"
                );
                Err(WorkerError::ShutdownTimeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = thread.join();
                Err(WorkerError::Panicked)
            }
        }
    }
}

impl<H: Handler> Drop for Worker<H> {
    fn drop(&mut self) {
        // Not stopped explicitly: let the thread drain and exit detached.
        if self.thread.is_some() {
            self.handle.close();
        }
    }
}
