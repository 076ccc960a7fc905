//! Captured still frame with an explicit release obligation.

use super::StreamFormat;
use crate::sizing::Size;
use std::time::Instant;

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// A single frame delivered by an image reader.
///
/// The underlying hardware buffer must be returned exactly once. Consumers
/// call [`CapturedFrame::release`] after reading; if a frame is dropped
/// without that, the buffer is returned on drop instead.
pub struct CapturedFrame {
    /// Encoded bytes (JPEG for still capture).
    data: Vec<u8>,
    /// Buffer format.
    format: StreamFormat,
    /// Frame dimensions.
    size: Size,
    /// Orientation in degrees the request asked for.
    orientation: u32,
    /// Time the frame arrived.
    timestamp: Instant,
    /// Returns the buffer to its reader.
    release: Option<ReleaseFn>,
}

impl CapturedFrame {
    /// Creates a frame with no release hook.
    pub fn new(data: Vec<u8>, format: StreamFormat, size: Size, orientation: u32) -> Self {
        Self {
            data,
            format,
            size,
            orientation,
            timestamp: Instant::now(),
            release: None,
        }
    }

    /// Attaches the hook that returns the buffer to its reader.
    pub fn with_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    /// Returns the frame bytes.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Format of the encoded bytes.
    #[inline]
    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Frame dimensions.
    #[inline]
    pub fn size(&self) -> Size {
        self.size
    }

    /// Clockwise rotation in degrees the viewer should apply.
    #[inline]
    pub fn orientation(&self) -> u32 {
        self.orientation
    }

    /// When the frame was produced.
    #[inline]
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Returns the buffer to its reader, consuming the frame.
    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for CapturedFrame {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl std::fmt::Debug for CapturedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedFrame")
            .field("format", &self.format)
            .field("size", &self.size)
            .field("orientation", &self.orientation)
            .field("bytes", &self.data.len())
            .finish()
    }
}
