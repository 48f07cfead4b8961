//! Virtualized multi-column scroll engine.
//!
//! Owns the column assignment, the per-column visible windows and the
//! playback handles checked out for visible items. Every recompute produces
//! a `ScrollFrame` describing what a renderer should draw.

pub mod driver;
pub mod throttle;

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::layout::{compute_window, ColumnAssignment, MasonryLayout, WindowParams};
use crate::models::{Dimensions, MediaItem};
use crate::video::{HandleFactory, PlaybackHandle, ResourcePool};

pub use driver::{
    viewport_channel, PendingViewport, ResizeObserver, ScrollDriver, Size, ViewportEvent,
    ViewportHandle,
};
pub use throttle::Throttle;

/// Distance in pixels below the last visible item under which a column asks
/// for more data.
pub const MORE_THRESHOLD: f32 = 300.0;

/// Called with `(index, handle)` just before a handle goes back to the pool.
pub type OnRelease<'a, H> = dyn FnMut(usize, &mut H) + 'a;

/// One entry of the gallery's append-only list.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollElement {
    pub id: String,
    pub width: u32,
    pub height: u32,
    /// `width`/`height` are the kind's estimate, not the natural size.
    pub estimated: bool,
    pub data: MediaItem,
}

impl ScrollElement {
    /// Items without usable dimensions are laid out at their kind's
    /// estimated aspect (16:9 video, square image).
    pub fn from_item(item: MediaItem) -> Self {
        let natural = item
            .natural_dimensions()
            .filter(|d| d.width > 0 && d.height > 0);
        let dims = natural.unwrap_or_else(|| item.kind.estimated_dimensions());
        Self {
            id: item.name.clone(),
            width: dims.width,
            height: dims.height,
            estimated: natural.is_none(),
            data: item,
        }
    }

    pub fn dimensions(&self) -> Option<Dimensions> {
        if self.width == 0 || self.height == 0 {
            None
        } else {
            Some(Dimensions::new(self.width, self.height))
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScrollConfig {
    pub columns: usize,
    pub row_gutter: f32,
    pub column_gutter: f32,
    pub overscan: usize,
    pub more_threshold: f32,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            columns: 3,
            row_gutter: 8.0,
            column_gutter: 8.0,
            overscan: 2,
            more_threshold: MORE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisibleElement {
    /// Index into the gallery list.
    pub index: usize,
    pub id: String,
    pub column: usize,
    pub top: f32,
    pub width: f32,
    pub height: f32,
    pub visibility: f32,
    pub handle_id: Option<u64>,
    pub overscan: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnFrame {
    pub top_spacer: f32,
    pub bottom_spacer: f32,
    pub height: f32,
    pub visible: Vec<VisibleElement>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScrollFrame {
    pub column_width: f32,
    pub columns: Vec<ColumnFrame>,
    /// Height of the tallest column.
    pub total_height: f32,
    pub signaled_more: bool,
}

impl ScrollFrame {
    pub fn visible(&self) -> impl Iterator<Item = &VisibleElement> {
        self.columns.iter().flat_map(|c| c.visible.iter())
    }

    pub fn visible_count(&self) -> usize {
        self.columns.iter().map(|c| c.visible.len()).sum()
    }
}

struct ColumnState<H> {
    /// Items in the window, with the handle they got when they entered.
    held: HashMap<usize, Option<H>>,
    armed: bool,
    seen_len: usize,
}

impl<H> ColumnState<H> {
    fn new() -> Self {
        Self {
            held: HashMap::new(),
            armed: true,
            seen_len: 0,
        }
    }
}

pub struct Scroll<F: HandleFactory> {
    config: ScrollConfig,
    layout: MasonryLayout,
    pool: ResourcePool<F>,
    ids: Vec<String>,
    dimensions: Vec<Option<Dimensions>>,
    assignment: ColumnAssignment,
    columns: Vec<ColumnState<F::Handle>>,
    viewport: Size,
    scroll_top: f32,
    exhausted: bool,
    signal_more: Box<dyn FnMut()>,
}

impl<F: HandleFactory> Scroll<F> {
    pub fn new(config: ScrollConfig, pool: ResourcePool<F>, signal_more: Box<dyn FnMut()>) -> Self {
        let columns = config.columns.max(1);
        let layout = MasonryLayout::new(columns, config.row_gutter, config.column_gutter);
        debug!(columns, max_handles = pool.max_size(), "Creating scroll engine");
        Self {
            config,
            layout,
            pool,
            ids: Vec::new(),
            dimensions: Vec::new(),
            assignment: ColumnAssignment::new(columns),
            columns: (0..columns).map(|_| ColumnState::new()).collect(),
            viewport: Size::default(),
            scroll_top: 0.0,
            exhausted: false,
            signal_more,
        }
    }

    pub fn pool(&self) -> &ResourcePool<F> {
        &self.pool
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn columns(&self) -> usize {
        self.layout.columns
    }

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    pub fn scroll_top(&self) -> f32 {
        self.scroll_top
    }

    pub fn set_viewport(&mut self, size: Size) {
        self.viewport = size;
    }

    pub fn set_scroll_top(&mut self, scroll_top: f32) {
        self.scroll_top = scroll_top;
    }

    pub fn set_exhausted(&mut self, exhausted: bool) {
        self.exhausted = exhausted;
    }

    /// Changes the column count. Every handle goes back to the pool and all
    /// items are placed again.
    pub fn set_columns(&mut self, columns: usize) {
        self.set_columns_with(columns, &mut |_, _| {});
    }

    /// `set_columns`, calling `on_release` with each item's handle before it
    /// returns to the pool.
    pub fn set_columns_with(&mut self, columns: usize, on_release: &mut OnRelease<'_, F::Handle>) {
        let columns = columns.max(1);
        if columns == self.layout.columns {
            return;
        }
        debug!(from = self.layout.columns, to = columns, "Column count changed");
        self.release_all(on_release);
        self.layout.columns = columns;
        self.assignment = ColumnAssignment::new(columns);
        self.columns = (0..columns).map(|_| ColumnState::new()).collect();
        let column_width = self.layout.column_width(self.viewport.width);
        self.layout
            .assign(&self.dimensions, column_width, &mut self.assignment);
    }

    pub fn apply(&mut self, pending: &PendingViewport) {
        self.apply_with(pending, &mut |_, _| {});
    }

    pub fn apply_with(&mut self, pending: &PendingViewport, on_release: &mut OnRelease<'_, F::Handle>) {
        if let Some(size) = pending.size {
            self.set_viewport(size);
        }
        if let Some(columns) = pending.columns {
            self.set_columns_with(columns, on_release);
        }
        if let Some(scroll_top) = pending.scroll_top {
            self.set_scroll_top(scroll_top);
        }
    }

    /// Catches up with the gallery list. The list only grows; a shorter list
    /// means it was replaced, and the engine starts over.
    pub fn sync_elements(&mut self, elements: &[ScrollElement]) {
        self.sync_elements_with(elements, &mut |_, _| {});
    }

    pub fn sync_elements_with(&mut self, elements: &[ScrollElement], on_release: &mut OnRelease<'_, F::Handle>) {
        if elements.len() < self.ids.len() {
            debug!(known = self.ids.len(), now = elements.len(), "Element list replaced");
            self.release_all(on_release);
            self.ids.clear();
            self.dimensions.clear();
            self.assignment = ColumnAssignment::new(self.layout.columns);
            self.columns = (0..self.layout.columns).map(|_| ColumnState::new()).collect();
        }
        if elements.len() == self.ids.len() {
            return;
        }

        for element in &elements[self.ids.len()..] {
            self.ids.push(element.id.clone());
            self.dimensions.push(element.dimensions());
        }
        let column_width = self.layout.column_width(self.viewport.width);
        self.layout
            .assign(&self.dimensions, column_width, &mut self.assignment);
        trace!(elements = self.ids.len(), "Synced elements");
    }

    /// The handle checked out for a visible item.
    pub fn handle_mut(&mut self, index: usize) -> Option<&mut F::Handle> {
        let column = self.assignment.column_of(index)?;
        self.columns.get_mut(column)?.held.get_mut(&index)?.as_mut()
    }

    /// Recomputes every column's window, checks handles in and out, and
    /// calls `signal_more` when a column runs short.
    pub fn recompute(&mut self) -> ScrollFrame {
        self.recompute_with(&mut |_, _| {})
    }

    /// `recompute`, calling `on_release` with the handle of every item that
    /// left its window before the handle returns to the pool.
    pub fn recompute_with(&mut self, on_release: &mut OnRelease<'_, F::Handle>) -> ScrollFrame {
        let column_width = self.layout.column_width(self.viewport.width);
        let params = WindowParams {
            scroll_top: self.scroll_top,
            viewport_height: self.viewport.height,
            overscan: self.config.overscan,
            row_gutter: self.layout.row_gutter,
        };

        let mut frame = ScrollFrame {
            column_width,
            ..ScrollFrame::default()
        };
        let mut wants_more = false;
        {
            let Scroll {
                columns,
                assignment,
                pool,
                ids,
                dimensions,
                config,
                exhausted,
                ..
            } = self;

            for (column_index, column) in columns.iter_mut().enumerate() {
                let members = assignment.column(column_index);
                let heights: Vec<f32> = members
                    .iter()
                    .map(|&i| MasonryLayout::item_height(dimensions[i], column_width))
                    .collect();
                let window = compute_window(&heights, &params);

                let in_window: HashSet<usize> =
                    window.slots.iter().map(|s| members[s.position]).collect();
                let leaving: Vec<usize> = column
                    .held
                    .keys()
                    .copied()
                    .filter(|i| !in_window.contains(i))
                    .collect();
                for index in leaving {
                    if let Some(Some(mut handle)) = column.held.remove(&index) {
                        on_release(index, &mut handle);
                        pool.release_handle(handle);
                    }
                }

                let mut visible = Vec::with_capacity(window.slots.len());
                for slot in &window.slots {
                    let index = members[slot.position];
                    let handle_id = column
                        .held
                        .entry(index)
                        .or_insert_with(|| pool.request_handle())
                        .as_ref()
                        .map(|h| h.id());
                    visible.push(VisibleElement {
                        index,
                        id: ids[index].clone(),
                        column: column_index,
                        top: slot.start,
                        width: column_width,
                        height: heights[slot.position],
                        visibility: slot.visibility,
                        handle_id,
                        overscan: slot.overscan,
                    });
                }

                if members.len() != column.seen_len {
                    column.seen_len = members.len();
                    column.armed = true;
                }
                if window.bottom_spacer >= config.more_threshold {
                    column.armed = true;
                } else if column.armed && !*exhausted {
                    column.armed = false;
                    wants_more = true;
                    trace!(column = column_index, spacer = window.bottom_spacer, "Column wants more");
                }

                frame.total_height = frame.total_height.max(window.total_height);
                frame.columns.push(ColumnFrame {
                    top_spacer: window.top_spacer,
                    bottom_spacer: window.bottom_spacer,
                    height: window.total_height,
                    visible,
                });
            }
        }

        if wants_more {
            frame.signaled_more = true;
            (self.signal_more)();
        }
        frame
    }

    fn release_all(&mut self, on_release: &mut OnRelease<'_, F::Handle>) {
        for column in &mut self.columns {
            for (index, handle) in column.held.drain() {
                if let Some(mut handle) = handle {
                    on_release(index, &mut handle);
                    self.pool.release_handle(handle);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::feed::testing::item;
    use crate::models::MediaKind;
    use crate::video::VideoHandleFactory;

    fn element(name: &str, width: u32, height: u32) -> ScrollElement {
        let mut data = item(name);
        data.dimensions = Some(Dimensions::new(width, height));
        ScrollElement::from_item(data)
    }

    fn square_elements(count: usize) -> Vec<ScrollElement> {
        (0..count)
            .map(|i| element(&format!("item-{i}"), 100, 100))
            .collect()
    }

    fn engine(
        columns: usize,
        max_handles: usize,
    ) -> (Scroll<VideoHandleFactory>, Rc<Cell<usize>>) {
        let signals = Rc::new(Cell::new(0));
        let counter = Rc::clone(&signals);
        let config = ScrollConfig {
            columns,
            row_gutter: 0.0,
            column_gutter: 0.0,
            overscan: 0,
            more_threshold: MORE_THRESHOLD,
        };
        let mut scroll = Scroll::new(
            config,
            ResourcePool::new(VideoHandleFactory, max_handles),
            Box::new(move || counter.set(counter.get() + 1)),
        );
        // 300px wide columns make square items 300px tall.
        scroll.set_viewport(Size::new(300.0 * columns as f32, 600.0));
        (scroll, signals)
    }

    fn handles_in(frame: &ScrollFrame) -> Vec<u64> {
        frame.visible().filter_map(|v| v.handle_id).collect()
    }

    #[test]
    fn test_checkouts_match_visible_handles_while_scrolling() {
        let (mut scroll, _) = engine(3, 12);
        let mut rng = StdRng::seed_from_u64(9);
        let elements: Vec<ScrollElement> = (0..200)
            .map(|i| element(&format!("item-{i}"), 100, rng.gen_range(40..400)))
            .collect();
        scroll.sync_elements(&elements);

        for _ in 0..500 {
            scroll.set_scroll_top(rng.gen_range(-100.0..40_000.0));
            if rng.gen_bool(0.1) {
                scroll.set_viewport(Size::new(rng.gen_range(300.0..1800.0), rng.gen_range(200.0..1400.0)));
            }
            let frame = scroll.recompute();

            let mut handles = handles_in(&frame);
            assert_eq!(scroll.pool().checked_out(), handles.len());
            assert!(scroll.pool().created() <= 12);
            handles.sort_unstable();
            handles.dedup();
            assert_eq!(handles.len(), scroll.pool().checked_out());
        }

        scroll.set_scroll_top(1.0e9);
        let frame = scroll.recompute();
        assert_eq!(frame.visible_count(), 0);
        assert_eq!(scroll.pool().checked_out(), 0);
        assert_eq!(scroll.pool().free(), scroll.pool().created());
    }

    #[test]
    fn test_item_keeps_handle_while_visible() {
        let (mut scroll, _) = engine(1, 5);
        scroll.sync_elements(&square_elements(10));

        let first = scroll.recompute();
        let before: Vec<(usize, Option<u64>)> =
            first.visible().map(|v| (v.index, v.handle_id)).collect();

        scroll.set_scroll_top(150.0);
        let second = scroll.recompute();
        for v in second.visible() {
            if let Some((_, handle)) = before.iter().find(|(i, _)| *i == v.index) {
                assert_eq!(*handle, v.handle_id);
            }
        }
        // Item 0 spans [0, 300] and is still visible at 150.
        assert_eq!(second.visible().next().map(|v| v.index), Some(0));
    }

    #[test]
    fn test_pool_shortage_leaves_items_without_handle() {
        let (mut scroll, _) = engine(1, 1);
        scroll.sync_elements(&square_elements(10));

        // Viewport 600px tall: items 0, 1 and 2 (touching at 600) are visible.
        let frame = scroll.recompute();
        let handles: Vec<Option<u64>> = frame.visible().map(|v| v.handle_id).collect();
        assert_eq!(handles, vec![Some(0), None, None]);

        // Item 0 leaves; item 1 stays visible and is not offered the freed handle,
        // the newly entering item 3 gets it.
        scroll.set_scroll_top(301.0);
        let frame = scroll.recompute();
        let handles: Vec<(usize, Option<u64>)> =
            frame.visible().map(|v| (v.index, v.handle_id)).collect();
        assert_eq!(handles, vec![(1, None), (2, None), (3, Some(0))]);
        assert_eq!(scroll.pool().checked_out(), 1);
    }

    #[test]
    fn test_signal_more_once_per_crossing() {
        let (mut scroll, signals) = engine(1, 4);

        // Empty column: below threshold.
        assert!(scroll.recompute().signaled_more);
        scroll.recompute();
        assert_eq!(signals.get(), 1);

        // New data that still leaves the column short re-arms it.
        scroll.sync_elements(&square_elements(1));
        scroll.recompute();
        assert_eq!(signals.get(), 2);

        // Plenty of data below the viewport: armed, no signal.
        scroll.sync_elements(&square_elements(10));
        scroll.recompute();
        assert_eq!(signals.get(), 2);

        // Scroll to the end: one signal, then quiet while nothing changes.
        scroll.set_scroll_top(2_700.0);
        scroll.recompute();
        scroll.set_scroll_top(2_690.0);
        scroll.recompute();
        assert_eq!(signals.get(), 3);

        // Back up above the threshold and down again: a fresh crossing.
        scroll.set_scroll_top(0.0);
        scroll.recompute();
        scroll.set_scroll_top(2_700.0);
        scroll.recompute();
        assert_eq!(signals.get(), 4);
    }

    #[test]
    fn test_dimensionless_items_use_estimated_aspect() {
        let mut video = item("clip");
        video.dimensions = None;
        let element = ScrollElement::from_item(video);
        assert!(element.estimated);
        assert_eq!(element.dimensions(), Some(Dimensions::new(16, 9)));

        let mut still = item("still");
        still.kind = MediaKind::Image;
        still.dimensions = Some(Dimensions::new(0, 0));
        let element = ScrollElement::from_item(still);
        assert!(element.estimated);
        assert_eq!(element.dimensions(), Some(Dimensions::new(1, 1)));

        assert!(!square_elements(1)[0].estimated);
    }

    #[test]
    fn test_dimensionless_library_is_windowed() {
        let (mut scroll, signals) = engine(3, 20);
        let elements: Vec<ScrollElement> = (0..300)
            .map(|i| {
                let mut data = item(&format!("clip-{i}"));
                data.dimensions = None;
                ScrollElement::from_item(data)
            })
            .collect();
        scroll.sync_elements(&elements);

        let frame = scroll.recompute();
        // 300px columns draw 16:9 clips 168.75px tall: four per column fit in 600px.
        assert_eq!(frame.visible_count(), 12);
        assert!(frame.visible().all(|v| v.height > 0.0 && v.handle_id.is_some()));
        assert!(frame.total_height > 16_000.0);
        assert!(!frame.signaled_more);
        assert_eq!(signals.get(), 0);
    }

    #[test]
    fn test_exhausted_engine_never_signals() {
        let (mut scroll, signals) = engine(2, 4);
        scroll.set_exhausted(true);
        scroll.sync_elements(&square_elements(1));
        let frame = scroll.recompute();
        assert!(!frame.signaled_more);
        assert_eq!(signals.get(), 0);
    }

    #[test]
    fn test_column_change_releases_and_reassigns() {
        let (mut scroll, _) = engine(3, 20);
        scroll.sync_elements(&square_elements(12));
        scroll.recompute();
        assert!(scroll.pool().checked_out() > 0);

        scroll.set_columns(2);
        assert_eq!(scroll.pool().checked_out(), 0);
        assert_eq!(scroll.columns(), 2);

        let frame = scroll.recompute();
        assert_eq!(frame.columns.len(), 2);
        assert_eq!(scroll.pool().checked_out(), handles_in(&frame).len());
        assert_eq!(frame.columns[0].visible[0].index, 0);
        assert_eq!(frame.columns[1].visible[0].index, 1);
    }

    #[test]
    fn test_replaced_list_starts_over() {
        let (mut scroll, _) = engine(2, 8);
        scroll.sync_elements(&square_elements(6));
        scroll.recompute();

        scroll.sync_elements(&square_elements(2));
        assert_eq!(scroll.len(), 2);
        assert_eq!(scroll.pool().checked_out(), 0);
        let frame = scroll.recompute();
        assert_eq!(frame.visible_count(), 2);
    }

    #[test]
    fn test_handle_mut_reaches_visible_item() {
        let (mut scroll, _) = engine(1, 2);
        scroll.sync_elements(&square_elements(3));
        scroll.recompute();

        let handle = scroll.handle_mut(0).unwrap();
        handle.load("file:///a.mp4");
        assert_eq!(scroll.handle_mut(0).and_then(|h| h.source().map(str::to_string)), Some("file:///a.mp4".into()));
        assert!(scroll.handle_mut(2).is_none());
    }

    #[test]
    fn test_apply_pending_viewport() {
        let (mut scroll, _) = engine(3, 2);
        let mut pending = PendingViewport::default();
        pending.absorb(ViewportEvent::Resized(Size::new(500.0, 400.0)));
        pending.absorb(ViewportEvent::Scrolled(42.0));
        pending.absorb(ViewportEvent::ColumnsChanged(2));
        scroll.apply(&pending);

        assert_eq!(scroll.viewport(), Size::new(500.0, 400.0));
        assert_eq!(scroll.scroll_top(), 42.0);
        assert_eq!(scroll.columns(), 2);
    }
}
