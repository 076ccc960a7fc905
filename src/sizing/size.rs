//! Two-dimensional resolution type.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A stream or surface resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Size {
    /// Creates a new size.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns the area in pixels, widened so it cannot overflow.
    #[inline]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Orders two sizes by area.
    #[inline]
    pub fn cmp_area(&self, other: &Size) -> Ordering {
        self.area().cmp(&other.area())
    }

    /// Returns true if this size has exactly the aspect ratio of `reference`.
    ///
    /// Uses cross-multiplication (`h * rw == w * rh`), so 1440x1080 matches
    /// 4032x3024 while 1920x1080 does not. A degenerate reference never matches.
    pub fn has_aspect_of(&self, reference: &Size) -> bool {
        if reference.width == 0 || reference.height == 0 {
            return false;
        }
        u64::from(self.height) * u64::from(reference.width)
            == u64::from(self.width) * u64::from(reference.height)
    }

    /// Returns true if this size fits inside `bound` in both dimensions.
    #[inline]
    pub fn fits_within(&self, bound: &Size) -> bool {
        self.width <= bound.width && self.height <= bound.height
    }

    /// Returns true if this size is at least as large as `target` in both dimensions.
    #[inline]
    pub fn covers(&self, target: &Size) -> bool {
        self.width >= target.width && self.height >= target.height
    }

    /// Returns the same size with width and height exchanged.
    #[inline]
    pub fn transposed(&self) -> Size {
        Size::new(self.height, self.width)
    }

    /// Returns the aspect ratio reduced to lowest terms, e.g. 4032x3024 -> 4x3.
    pub fn reduced_ratio(&self) -> Size {
        let divisor = gcd(self.width, self.height);
        if divisor == 0 {
            return *self;
        }
        Size::new(self.width / divisor, self.height / divisor)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}
