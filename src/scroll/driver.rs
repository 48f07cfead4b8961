//! Viewport events and their coalescing.
//!
//! Scroll and resize notifications are queued on a flume channel instead of
//! being handled where they arrive. The driver takes the first queued event,
//! waits out the throttle, drains whatever else arrived meanwhile and hands
//! back a single batch, so a burst of events costs one recompute.

use flume::{Receiver, Sender};
use tracing::trace;

use crate::feed::Subscription;
use crate::scroll::throttle::Throttle;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewportEvent {
    Scrolled(f32),
    Resized(Size),
    ColumnsChanged(usize),
    /// New elements were appended.
    ContentChanged,
}

/// Net effect of a batch of events. Later events win.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PendingViewport {
    pub scroll_top: Option<f32>,
    pub size: Option<Size>,
    pub columns: Option<usize>,
    pub content_changed: bool,
    pub events: usize,
}

impl PendingViewport {
    pub fn absorb(&mut self, event: ViewportEvent) {
        self.events += 1;
        match event {
            ViewportEvent::Scrolled(y) => self.scroll_top = Some(y),
            ViewportEvent::Resized(size) => self.size = Some(size),
            ViewportEvent::ColumnsChanged(n) => self.columns = Some(n),
            ViewportEvent::ContentChanged => self.content_changed = true,
        }
    }
}

/// Source of container size changes.
pub trait ResizeObserver {
    fn observe(&self, callback: Box<dyn Fn(Size)>) -> Subscription;
    fn unobserve(&self, subscription: Subscription);
}

/// Sending side, cheap to clone.
#[derive(Clone)]
pub struct ViewportHandle {
    tx: Sender<ViewportEvent>,
}

impl ViewportHandle {
    pub fn scrolled(&self, scroll_top: f32) -> bool {
        self.send(ViewportEvent::Scrolled(scroll_top))
    }

    pub fn resized(&self, size: Size) -> bool {
        self.send(ViewportEvent::Resized(size))
    }

    pub fn set_columns(&self, columns: usize) -> bool {
        self.send(ViewportEvent::ColumnsChanged(columns))
    }

    pub fn content_changed(&self) -> bool {
        self.send(ViewportEvent::ContentChanged)
    }

    /// Forwards every size reported by `observer` into the queue.
    pub fn follow_resizes(&self, observer: &dyn ResizeObserver) -> Subscription {
        let handle = self.clone();
        observer.observe(Box::new(move |size| {
            handle.resized(size);
        }))
    }

    /// False once the driver is gone.
    fn send(&self, event: ViewportEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

pub struct ScrollDriver {
    rx: Receiver<ViewportEvent>,
    throttle: Throttle,
}

/// Creates a connected handle/driver pair.
pub fn viewport_channel(throttle: Throttle) -> (ViewportHandle, ScrollDriver) {
    let (tx, rx) = flume::unbounded();
    (ViewportHandle { tx }, ScrollDriver { rx, throttle })
}

impl ScrollDriver {
    pub fn throttle(&self) -> Throttle {
        self.throttle
    }

    /// Waits for the next batch. `None` once every handle is dropped and the
    /// queue is empty.
    pub async fn next_batch(&self) -> Option<PendingViewport> {
        let first = self.rx.recv_async().await.ok()?;
        let mut pending = PendingViewport::default();
        pending.absorb(first);

        self.throttle.wait().await;

        while let Ok(event) = self.rx.try_recv() {
            pending.absorb(event);
        }
        trace!(events = pending.events, "Coalesced viewport events");
        Some(pending)
    }
}
