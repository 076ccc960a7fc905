//! Optimal size selection.

use super::Size;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during size negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    #[error("device offers no candidate sizes")]
    NoCandidates,
}

/// Outcome of a size negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeChoice {
    /// The selected size.
    pub size: Size,
    /// True when no candidate satisfied the bound and aspect ratio, and the
    /// first catalog entry was returned instead. Callers must surface this.
    pub degraded: bool,
}

/// How the still-capture resolution is picked from the JPEG catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StillSizePolicy {
    /// Largest JPEG size by area.
    #[default]
    Largest,
    /// A fixed catalog position; falls back to the largest size when the
    /// catalog is shorter than the index.
    Index(usize),
}

/// Selects the preview size for a viewport.
///
/// Candidates must fit within `max` and match the aspect ratio of `aspect`
/// exactly. Among those, the smallest one covering the viewport wins; if none
/// covers it, the largest one that does not. If nothing survives filtering,
/// the first candidate is returned with `degraded` set.
pub fn choose_optimal_size(
    choices: &[Size],
    viewport: Size,
    max: Size,
    aspect: Size,
) -> Result<SizeChoice, NegotiationError> {
    let first = *choices.first().ok_or(NegotiationError::NoCandidates)?;

    let (big_enough, not_big_enough): (Vec<Size>, Vec<Size>) = choices
        .iter()
        .copied()
        .filter(|option| option.fits_within(&max) && option.has_aspect_of(&aspect))
        .partition(|option| option.covers(&viewport));

    if let Some(size) = big_enough.into_iter().min_by(Size::cmp_area) {
        return Ok(SizeChoice {
            size,
            degraded: false,
        });
    }
    if let Some(size) = not_big_enough.into_iter().max_by(Size::cmp_area) {
        return Ok(SizeChoice {
            size,
            degraded: false,
        });
    }

    tracing::warn!(
        viewport = %viewport,
        bound = %max,
        aspect = %aspect.reduced_ratio(),
        fallback = %first,
        "No suitable preview size, falling back to first candidate"
    );
    Ok(SizeChoice {
        size: first,
        degraded: true,
    })
}

/// Returns the largest size by area, or `None` for an empty list.
pub fn largest_by_area(sizes: &[Size]) -> Option<Size> {
    sizes.iter().copied().max_by(Size::cmp_area)
}

/// Clamps display bounds to a fixed cap in each dimension.
pub fn preview_bound(display: Size, cap: Size) -> Size {
    Size::new(display.width.min(cap.width), display.height.min(cap.height))
}

/// Picks the still-capture size according to `policy`, with bounds checking.
pub fn select_still_size(jpeg_sizes: &[Size], policy: StillSizePolicy) -> Option<Size> {
    match policy {
        StillSizePolicy::Largest => largest_by_area(jpeg_sizes),
        StillSizePolicy::Index(index) => match jpeg_sizes.get(index) {
            Some(size) => Some(*size),
            None => {
                tracing::warn!(
                    index,
                    available = jpeg_sizes.len(),
                    "Still size index out of range, using largest"
                );
                largest_by_area(jpeg_sizes)
            }
        },
    }
}
