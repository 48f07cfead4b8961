//! Visible-window computation for one column.

/// Scroll position and viewport for a window computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowParams {
    pub scroll_top: f32,
    pub viewport_height: f32,
    /// Non-visible items kept after the visible run.
    pub overscan: usize,
    pub row_gutter: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSlot {
    /// Position of the item within the column.
    pub position: usize,
    pub start: f32,
    pub end: f32,
    /// Fraction of the item's height inside the viewport, in [0, 1].
    pub visibility: f32,
    pub overscan: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VisibleWindow {
    pub slots: Vec<WindowSlot>,
    pub top_spacer: f32,
    pub bottom_spacer: f32,
    pub total_height: f32,
}

impl VisibleWindow {
    pub fn first(&self) -> Option<usize> {
        self.slots.first().map(|s| s.position)
    }

    pub fn last(&self) -> Option<usize> {
        self.slots.last().map(|s| s.position)
    }
}

/// Stacked height of `heights` with `gutter` between neighbours.
pub fn sum_heights(heights: &[f32], gutter: f32) -> f32 {
    let n = heights.len() as f32;
    heights.iter().sum::<f32>() + (gutter * (n - 1.0)).max(0.0)
}

/// Fraction of `[start, end]` covered by the viewport starting at `scroll_top`.
pub fn visibility_fraction(start: f32, end: f32, scroll_top: f32, viewport_height: f32) -> f32 {
    let height = end - start;
    if height <= 0.0 {
        return 0.0;
    }
    let covered = end.min(scroll_top + viewport_height) - start.max(scroll_top);
    (covered / height).clamp(0.0, 1.0)
}

/// Computes which items of a column intersect the viewport.
///
/// # Algorithm
/// 1. Walk the items top to bottom, tracking each item's `[start, end]`.
/// 2. An item is visible unless the viewport starts below its end or ends
///    above its start. Touching edges count as visible.
/// 3. Once the visible run has started, up to `overscan` further items are
///    kept. The walk stops at the first item that is neither.
/// 4. Spacers stand in for everything before the first and after the last kept item.
///
/// # Arguments
/// * `heights` - Pixel heights of the column's items, top to bottom
/// * `params` - Scroll offset, viewport height, overscan and gutter
pub fn compute_window(heights: &[f32], params: &WindowParams) -> VisibleWindow {
    let window_start = params.scroll_top.max(0.0);
    let window_end = params.scroll_top + params.viewport_height;

    let mut slots = Vec::new();
    let mut overscanned = 0;
    let mut y = 0.0_f32;

    for (position, &height) in heights.iter().enumerate() {
        let start = y;
        let end = y + height;
        y = end + params.row_gutter;

        let visible = !(window_start > end || window_end < start);
        let keep_as_overscan = !visible && !slots.is_empty() && overscanned < params.overscan;

        if visible || keep_as_overscan {
            if keep_as_overscan {
                overscanned += 1;
            }
            slots.push(WindowSlot {
                position,
                start,
                end,
                visibility: visibility_fraction(start, end, params.scroll_top, params.viewport_height),
                overscan: keep_as_overscan,
            });
        } else if !slots.is_empty() {
            break;
        }
    }

    let total_height = sum_heights(heights, params.row_gutter);
    let (top_spacer, bottom_spacer) = match (
        slots.first().map(|s| s.position),
        slots.last().map(|s| s.position),
    ) {
        (Some(first), Some(last)) => (
            sum_heights(&heights[..first], params.row_gutter),
            sum_heights(&heights[last + 1..], params.row_gutter),
        ),
        _ => (0.0, 0.0),
    };
    VisibleWindow {
        slots,
        top_spacer,
        bottom_spacer,
        total_height,
    }
}
