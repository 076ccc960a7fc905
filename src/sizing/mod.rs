//! Stream resolution negotiation.
//!
//! Picks preview and still-capture resolutions from a device's catalog of
//! supported sizes. Everything here is pure and integer-only: aspect ratios
//! are compared by cross-multiplication and areas are widened to `u64`, so
//! large sensor resolutions never overflow or round.

mod negotiate;
mod size;

pub use negotiate::{
    choose_optimal_size, largest_by_area, preview_bound, select_still_size, NegotiationError,
    SizeChoice, StillSizePolicy,
};
pub use size::Size;
