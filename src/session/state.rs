//! Session states and negotiated stream configuration.

use crate::sizing::Size;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the camera session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No device resources are held.
    #[default]
    Closed,
    /// Open requested, waiting for the hardware to confirm.
    Opening,
    /// Device open, no session yet.
    Open,
    /// Preview session requested, waiting for configuration.
    PreviewConfiguring,
    /// Repeating preview request is running.
    PreviewActive,
    /// A still capture is in flight on a transient session.
    Capturing,
    /// Resources are being released.
    Closing,
    /// The last attempt failed; `close()` is required before reopening.
    Error,
}

impl SessionState {
    /// Numeric code used for the state gauge.
    pub const fn code(self) -> i64 {
        match self {
            Self::Closed => 0,
            Self::Opening => 1,
            Self::Open => 2,
            Self::PreviewConfiguring => 3,
            Self::PreviewActive => 4,
            Self::Capturing => 5,
            Self::Closing => 6,
            Self::Error => 7,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Opening => "opening",
            Self::Open => "open",
            Self::PreviewConfiguring => "preview-configuring",
            Self::PreviewActive => "preview-active",
            Self::Capturing => "capturing",
            Self::Closing => "closing",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Stream sizes negotiated for one open session.
///
/// Derived once per open and never changed while the session lives; a new
/// open (e.g. after a viewport resize) derives a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Preview stream resolution.
    pub preview: Size,
    /// Still-capture resolution.
    pub still: Size,
    /// Reference aspect ratio, reduced to lowest terms.
    pub aspect_ratio: Size,
}
