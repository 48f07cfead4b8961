//! Column layout for the scroll engine.
//!
//! - `MasonryLayout` - assigns items to equal-width columns
//! - `compute_window` - visible subset and spacers of one column

pub mod masonry;
pub mod window;

pub use masonry::{ColumnAssignment, MasonryLayout};
pub use window::{compute_window, sum_heights, VisibleWindow, WindowParams, WindowSlot};
