//! Glue between the gallery, the scroll engine and the per-item cells.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::config::Settings;
use crate::gallery::cell::{Cell as ItemCell, RenderBinder};
use crate::gallery::Gallery;
use crate::scroll::{PendingViewport, Scroll, ScrollConfig, ScrollDriver, ScrollFrame};
use crate::video::{HandleFactory, PlaybackHandle, ResourcePool};

/// Fills allowed per step before handing the frame back.
const MAX_FILL_ROUNDS: usize = 32;

pub struct GalleryView<F: HandleFactory, B: RenderBinder<F::Handle>> {
    gallery: Rc<Gallery>,
    scroll: Scroll<F>,
    cells: HashMap<usize, ItemCell>,
    binder: B,
    settings: Settings,
    more_requested: Rc<std::cell::Cell<bool>>,
}

impl<F: HandleFactory, B: RenderBinder<F::Handle>> GalleryView<F, B> {
    pub fn new(gallery: Rc<Gallery>, config: ScrollConfig, factory: F, binder: B, settings: Settings) -> Self {
        let more_requested = Rc::new(std::cell::Cell::new(false));
        let flag = Rc::clone(&more_requested);
        let pool = ResourcePool::new(factory, settings.max_video_elements);
        let scroll = Scroll::new(config, pool, Box::new(move || flag.set(true)));
        Self {
            gallery,
            scroll,
            cells: HashMap::new(),
            binder,
            settings,
            more_requested,
        }
    }

    pub fn gallery(&self) -> &Rc<Gallery> {
        &self.gallery
    }

    pub fn scroll(&self) -> &Scroll<F> {
        &self.scroll
    }

    pub fn binder(&self) -> &B {
        &self.binder
    }

    pub fn cell(&self, index: usize) -> Option<&ItemCell> {
        self.cells.get(&index)
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Applies a batch of viewport changes and produces the next frame.
    ///
    /// Whenever the frame asked for more data, `buffer_size` elements are
    /// pulled and the frame is recomputed, until no column runs short or the
    /// feed stops producing.
    pub async fn step(&mut self, pending: Option<&PendingViewport>) -> ScrollFrame {
        if let Some(pending) = pending {
            let mut on_release = unbind_released::<F::Handle, B>(&mut self.cells, &mut self.binder);
            self.scroll.apply_with(pending, &mut on_release);
        }

        let mut rounds = 0;
        loop {
            let frame = self.refresh();
            if !self.more_requested.replace(false) || rounds == MAX_FILL_ROUNDS {
                return frame;
            }
            rounds += 1;
            let added = self.gallery.fill(self.gallery.buffer_size()).await;
            if added == 0 {
                trace!("Feed produced nothing");
                return frame;
            }
        }
    }

    /// Renders an initial frame, then one frame per batch until the driver
    /// closes.
    pub async fn run(&mut self, driver: &ScrollDriver, mut on_frame: impl FnMut(&ScrollFrame)) {
        let frame = self.step(None).await;
        on_frame(&frame);
        while let Some(batch) = driver.next_batch().await {
            let frame = self.step(Some(&batch)).await;
            on_frame(&frame);
        }
        debug!("Viewport driver closed");
    }

    /// Detaches every bound handle from the renderer.
    pub fn shutdown(&mut self) {
        for (&index, cell) in &self.cells {
            if cell.bound_handle().is_some() {
                if let Some(handle) = self.scroll.handle_mut(index) {
                    self.binder.unbind(handle);
                }
            }
        }
        self.cells.clear();
    }

    fn refresh(&mut self) -> ScrollFrame {
        self.scroll.set_exhausted(self.gallery.is_exhausted());
        let frame = {
            let elements = self.gallery.elements();
            let mut on_release = unbind_released::<F::Handle, B>(&mut self.cells, &mut self.binder);
            self.scroll.sync_elements_with(&elements, &mut on_release);
            self.scroll.recompute_with(&mut on_release)
        };
        self.update_cells(&frame);
        frame
    }

    fn update_cells(&mut self, frame: &ScrollFrame) {
        let visible: HashSet<usize> = frame.visible().map(|v| v.index).collect();
        self.cells.retain(|index, _| visible.contains(index));

        let elements = self.gallery.elements();
        for v in frame.visible() {
            let Some(element) = elements.get(v.index) else {
                continue;
            };
            let cell = self
                .cells
                .entry(v.index)
                .or_insert_with(|| ItemCell::new(v.index, element));
            let handle = self.scroll.handle_mut(v.index);
            cell.update(v, handle, &mut self.binder, &self.settings);
        }
    }
}

/// Unbinds a handle from the cell it was bound to before the engine takes it back.
fn unbind_released<'a, H: PlaybackHandle, B: RenderBinder<H>>(
    cells: &'a mut HashMap<usize, ItemCell>,
    binder: &'a mut B,
) -> impl FnMut(usize, &mut H) + 'a {
    move |index: usize, handle: &mut H| {
        let Some(cell) = cells.get_mut(&index) else {
            return;
        };
        if cell.bound_handle() == Some(handle.id()) {
            binder.unbind(handle);
            cell.detach();
        }
    }
}
