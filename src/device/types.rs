//! Device description types.

use crate::sizing::Size;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of an output surface (preview texture, image reader).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// Output stream formats a device can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamFormat {
    /// Compressed still images.
    Jpeg,
    /// Implementation-defined format consumed by a preview texture.
    Texture,
}

/// Direction the sensor faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LensFacing {
    /// Faces the user.
    Front,
    /// Faces away from the user.
    Back,
    /// Detachable or USB camera.
    External,
}

/// Supported output resolutions, per format, in the order the device reports them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamCatalog {
    entries: Vec<(StreamFormat, Vec<Size>)>,
}

impl StreamCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the size list for a format.
    pub fn with_sizes(mut self, format: StreamFormat, sizes: Vec<Size>) -> Self {
        self.entries.retain(|(f, _)| *f != format);
        self.entries.push((format, sizes));
        self
    }

    /// Returns the sizes offered for `format`, empty if unsupported.
    pub fn output_sizes(&self, format: StreamFormat) -> &[Size] {
        self.entries
            .iter()
            .find(|(f, _)| *f == format)
            .map(|(_, sizes)| sizes.as_slice())
            .unwrap_or(&[])
    }
}

/// A device as enumerated from the hardware subsystem. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Opaque device identifier.
    pub id: String,
    /// Sensor facing, if reported.
    pub facing: Option<LensFacing>,
    /// Stream configuration catalog, if the device exposes one.
    pub streams: Option<StreamCatalog>,
}

/// Display rotation relative to the sensor's natural orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    /// Natural orientation.
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// JPEG orientation in degrees for this rotation.
    pub const fn degrees(self) -> u32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// Quarter-turn index (0..=3).
    pub const fn quarter_turns(self) -> i32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 1,
            Self::Deg180 => 2,
            Self::Deg270 => 3,
        }
    }

    /// Parses a degree value; only exact quarter turns are accepted.
    pub const fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees {
            0 => Some(Self::Deg0),
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }
}
