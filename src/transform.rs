//! Preview transform computation.
//!
//! Sensors deliver buffers in their native landscape orientation. When the
//! display is rotated, the preview surface needs a transform that maps the
//! buffer back upright and fills the view. This module computes that
//! transform as a plain 2D affine value the host applies to its surface.

use crate::device::Rotation;
use crate::sizing::Size;

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    /// Left edge.
    pub left: f32,
    /// Top edge; y grows downwards.
    pub top: f32,
    /// Right edge, exclusive.
    pub right: f32,
    /// Bottom edge, exclusive.
    pub bottom: f32,
}

impl Rect {
    /// Creates a rectangle from its edges.
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Horizontal extent.
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    /// Vertical extent.
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Midpoint as `(x, y)`.
    pub fn center(&self) -> (f32, f32) {
        ((self.left + self.right) / 2.0, (self.top + self.bottom) / 2.0)
    }

    /// Returns the rectangle moved by `(dx, dy)`.
    pub fn offset(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.left + dx, self.top + dy, self.right + dx, self.bottom + dy)
    }
}

/// 2D affine transform: `x' = sx*x + kx*y + tx`, `y' = ky*x + sy*y + ty`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    /// `sx`
    pub scale_x: f32,
    /// `kx`
    pub skew_x: f32,
    /// `tx`
    pub trans_x: f32,
    /// `ky`
    pub skew_y: f32,
    /// `sy`
    pub scale_y: f32,
    /// `ty`
    pub trans_y: f32,
}

impl Affine {
    /// Leaves every point where it is.
    pub const IDENTITY: Affine = Affine {
        scale_x: 1.0,
        skew_x: 0.0,
        trans_x: 0.0,
        skew_y: 0.0,
        scale_y: 1.0,
        trans_y: 0.0,
    };

    /// Maps `src` onto `dst`, stretching each axis independently.
    pub fn rect_to_rect(src: Rect, dst: Rect) -> Self {
        if src.width() == 0.0 || src.height() == 0.0 {
            return Self::IDENTITY;
        }
        let sx = dst.width() / src.width();
        let sy = dst.height() / src.height();
        Self {
            scale_x: sx,
            skew_x: 0.0,
            trans_x: dst.left - src.left * sx,
            skew_y: 0.0,
            scale_y: sy,
            trans_y: dst.top - src.top * sy,
        }
    }

    /// Applies `self` first, then `next`.
    pub fn then(&self, next: &Affine) -> Affine {
        Affine {
            scale_x: next.scale_x * self.scale_x + next.skew_x * self.skew_y,
            skew_x: next.scale_x * self.skew_x + next.skew_x * self.scale_y,
            trans_x: next.scale_x * self.trans_x + next.skew_x * self.trans_y + next.trans_x,
            skew_y: next.skew_y * self.scale_x + next.scale_y * self.skew_y,
            scale_y: next.skew_y * self.skew_x + next.scale_y * self.scale_y,
            trans_y: next.skew_y * self.trans_x + next.scale_y * self.trans_y + next.trans_y,
        }
    }

    /// Appends a scale about the pivot `(px, py)`.
    pub fn post_scale(&self, sx: f32, sy: f32, px: f32, py: f32) -> Affine {
        self.then(&Affine {
            scale_x: sx,
            skew_x: 0.0,
            trans_x: px - sx * px,
            skew_y: 0.0,
            scale_y: sy,
            trans_y: py - sy * py,
        })
    }

    /// Appends a rotation by `quarter_turns * 90` degrees about `(px, py)`.
    ///
    /// Quarter turns are exact, so no trigonometric rounding creeps in.
    pub fn post_rotate_quarters(&self, quarter_turns: i32, px: f32, py: f32) -> Affine {
        let (cos, sin) = match quarter_turns.rem_euclid(4) {
            0 => (1.0, 0.0),
            1 => (0.0, 1.0),
            2 => (-1.0, 0.0),
            _ => (0.0, -1.0),
        };
        self.then(&Affine {
            scale_x: cos,
            skew_x: -sin,
            trans_x: px - cos * px + sin * py,
            skew_y: sin,
            scale_y: cos,
            trans_y: py - sin * px - cos * py,
        })
    }

    /// Transforms a point.
    pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.scale_x * x + self.skew_x * y + self.trans_x,
            self.skew_y * x + self.scale_y * y + self.trans_y,
        )
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Computes the surface transform for a `view`-sized surface showing a
/// `preview`-sized buffer under the given display rotation.
pub fn preview_transform(view: Size, preview: Size, rotation: Rotation) -> Affine {
    if view.area() == 0 || preview.area() == 0 {
        return Affine::IDENTITY;
    }
    let view_w = view.width as f32;
    let view_h = view.height as f32;
    let preview_w = preview.width as f32;
    let preview_h = preview.height as f32;

    let view_rect = Rect::new(0.0, 0.0, view_w, view_h);
    let (cx, cy) = view_rect.center();

    match rotation {
        Rotation::Deg90 | Rotation::Deg270 => {
            // Buffer is landscape: swap its sides and centre it on the view.
            let buffer = Rect::new(0.0, 0.0, preview_h, preview_w);
            let (bx, by) = buffer.center();
            let buffer = buffer.offset(cx - bx, cy - by);

            let scale = (view_h / preview_h).max(view_w / preview_w);
            Affine::rect_to_rect(view_rect, buffer)
                .post_scale(scale, scale, cx, cy)
                .post_rotate_quarters(rotation.quarter_turns() - 2, cx, cy)
        }
        Rotation::Deg180 => Affine::IDENTITY.post_rotate_quarters(2, cx, cy),
        Rotation::Deg0 => Affine::IDENTITY,
    }
}
