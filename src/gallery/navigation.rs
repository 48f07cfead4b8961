use std::cell::Cell;
use std::rc::Rc;

use tracing::debug;

use crate::gallery::Gallery;
use crate::scroll::ScrollElement;

/// Steps through the gallery from an activated item.
///
/// Reads the gallery's list by index. Only stepping forward past the last
/// known element pulls from the feed.
pub struct NavigationSession {
    gallery: Rc<Gallery>,
    index: Cell<usize>,
}

impl NavigationSession {
    pub(crate) fn new(gallery: Rc<Gallery>, index: usize) -> Self {
        Self {
            gallery,
            index: Cell::new(index),
        }
    }

    pub fn index(&self) -> usize {
        self.index.get()
    }

    pub fn current(&self) -> Option<ScrollElement> {
        self.gallery.element_at(self.index.get())
    }

    pub async fn next(&self) -> Option<ScrollElement> {
        let target = self.index.get() + 1;
        if target >= self.gallery.len() {
            debug!(index = target, "Navigation reached the frontier");
            self.gallery.get_next_element().await?;
        }
        let element = self.gallery.element_at(target)?;
        self.index.set(target);
        Some(element)
    }

    pub fn previous(&self) -> Option<ScrollElement> {
        let target = self.index.get().checked_sub(1)?;
        let element = self.gallery.element_at(target)?;
        self.index.set(target);
        Some(element)
    }
}
