//! Capture request descriptors.

use crate::device::SurfaceId;
use serde::{Deserialize, Serialize};

/// What a request or session is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPurpose {
    /// Continuous preview stream.
    Preview,
    /// One-shot still capture.
    Still,
}

/// Autofocus behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AfMode {
    Off,
    Auto,
    /// Refocuses continuously, tuned for stills.
    ContinuousPicture,
}

/// 3A control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    Off,
    Auto,
}

/// An immutable capture request: target surfaces plus control parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequestDescriptor {
    purpose: RequestPurpose,
    targets: Vec<SurfaceId>,
    af_mode: Option<AfMode>,
    control_mode: Option<ControlMode>,
    jpeg_orientation: Option<u32>,
}

impl CaptureRequestDescriptor {
    /// Starts building a request for `purpose`.
    pub fn builder(purpose: RequestPurpose) -> RequestBuilder {
        RequestBuilder {
            request: Self {
                purpose,
                targets: Vec::new(),
                af_mode: None,
                control_mode: None,
                jpeg_orientation: None,
            },
        }
    }

    /// What the request is for.
    pub fn purpose(&self) -> RequestPurpose {
        self.purpose
    }

    /// Output surfaces, in the order they were added.
    pub fn targets(&self) -> &[SurfaceId] {
        &self.targets
    }

    /// Requested autofocus mode, if any.
    pub fn af_mode(&self) -> Option<AfMode> {
        self.af_mode
    }

    /// Requested 3A mode, if any.
    pub fn control_mode(&self) -> Option<ControlMode> {
        self.control_mode
    }

    /// JPEG orientation in degrees, set on still requests.
    pub fn jpeg_orientation(&self) -> Option<u32> {
        self.jpeg_orientation
    }
}

/// Builder for [`CaptureRequestDescriptor`].
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    request: CaptureRequestDescriptor,
}

impl RequestBuilder {
    /// Adds an output surface. Duplicates are ignored.
    pub fn target(mut self, surface: SurfaceId) -> Self {
        if !self.request.targets.contains(&surface) {
            self.request.targets.push(surface);
        }
        self
    }

    /// Sets the autofocus mode.
    pub fn af_mode(mut self, mode: AfMode) -> Self {
        self.request.af_mode = Some(mode);
        self
    }

    pub fn control_mode(mut self, mode: ControlMode) -> Self {
        self.request.control_mode = Some(mode);
        self
    }

    /// Sets the rotation, in degrees, recorded in the JPEG.
    pub fn jpeg_orientation(mut self, degrees: u32) -> Self {
        self.request.jpeg_orientation = Some(degrees);
        self
    }

    /// Finishes the request.
    pub fn build(self) -> CaptureRequestDescriptor {
        self.request
    }
}
