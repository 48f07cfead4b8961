//! The gallery: an append-only list of elements pulled from the composed
//! feed, plus the activation and navigation entry points around it.

pub mod cell;
pub mod navigation;
pub mod view;

use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;

use futures::channel::oneshot;
use tracing::{debug, info, warn};

use crate::feed::{ComposedFeed, Disposer, Feed, FeedResult, FeedState};
use crate::scroll::ScrollElement;

pub use cell::{CellState, LoggingBinder, PlaybackOptions, RenderBinder, RenderableLoadError};
pub use navigation::NavigationSession;
pub use view::GalleryView;

/// An item was opened from the gallery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub item_id: String,
    pub handle_id: Option<u64>,
}

pub trait ActivationSink {
    fn activated(&self, activation: Activation);
}

/// What the user should be told about the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GalleryStatus {
    /// Nothing is enabled; point the user at the feed settings.
    NoFeeds,
    Loading,
    Failed,
    /// End of stream.
    Exhausted,
    Ready,
}

/// Clears the in-flight flag even if the fill is dropped half way.
struct FetchGuard<'a>(&'a Cell<bool>);

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

pub struct Gallery {
    feed: Rc<ComposedFeed>,
    elements: RefCell<Vec<ScrollElement>>,
    fetching: Cell<bool>,
    buffer_size: usize,
    sink: RefCell<Option<Rc<dyn ActivationSink>>>,
}

impl Gallery {
    pub fn new(feed: Rc<ComposedFeed>, buffer_size: usize) -> Rc<Self> {
        info!(feed = %feed.id(), children = feed.len(), buffer_size, "Creating gallery");
        Rc::new(Self {
            feed,
            elements: RefCell::new(Vec::new()),
            fetching: Cell::new(false),
            buffer_size: buffer_size.max(1),
            sink: RefCell::new(None),
        })
    }

    pub fn feed(&self) -> &Rc<ComposedFeed> {
        &self.feed
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn set_activation_sink(&self, sink: Rc<dyn ActivationSink>) {
        *self.sink.borrow_mut() = Some(sink);
    }

    pub fn elements(&self) -> Ref<'_, Vec<ScrollElement>> {
        self.elements.borrow()
    }

    pub fn element_at(&self, index: usize) -> Option<ScrollElement> {
        self.elements.borrow().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.elements.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.borrow().is_empty()
    }

    pub fn is_fetching(&self) -> bool {
        self.fetching.get()
    }

    pub fn is_exhausted(&self) -> bool {
        self.feed.state() == FeedState::Exhausted
    }

    pub fn status(&self) -> GalleryStatus {
        if self.feed.is_empty() {
            return GalleryStatus::NoFeeds;
        }
        match self.feed.state() {
            FeedState::Loading => GalleryStatus::Loading,
            FeedState::Error => GalleryStatus::Failed,
            FeedState::Exhausted => GalleryStatus::Exhausted,
            FeedState::Ok => GalleryStatus::Ready,
        }
    }

    /// Pulls one item and appends it.
    ///
    /// A loading feed is waited on for exactly one transition; the pull is
    /// retried only if that transition lands on ok.
    pub async fn get_next_element(&self) -> Option<ScrollElement> {
        match self.feed.state() {
            FeedState::Ok => self.pull().await,
            FeedState::Loading => {
                if self.wait_for_transition().await == Some(FeedState::Ok) {
                    self.pull().await
                } else {
                    None
                }
            }
            FeedState::Error | FeedState::Exhausted => None,
        }
    }

    /// Pulls up to `count` elements one after another. A fill already in
    /// progress makes this a no-op. Returns how many were appended.
    pub async fn fill(&self, count: usize) -> usize {
        if self.fetching.replace(true) {
            debug!("Fill already in progress");
            return 0;
        }
        let _guard = FetchGuard(&self.fetching);

        let mut added = 0;
        while added < count {
            if self.get_next_element().await.is_none() {
                break;
            }
            added += 1;
        }
        debug!(added, requested = count, total = self.len(), "Fill finished");
        added
    }

    /// Reports the activation and opens a navigation session at the item.
    pub fn activate(self: &Rc<Self>, item_id: &str, handle_id: Option<u64>) -> Option<NavigationSession> {
        let index = self.elements.borrow().iter().position(|e| e.id == item_id)?;
        let sink = self.sink.borrow().clone();
        if let Some(sink) = sink {
            sink.activated(Activation {
                item_id: item_id.to_string(),
                handle_id,
            });
        }
        info!(item = item_id, index, "Item activated");
        Some(NavigationSession::new(Rc::clone(self), index))
    }

    /// The listener is removed when this future completes or is dropped.
    async fn wait_for_transition(&self) -> Option<FeedState> {
        let (tx, rx) = oneshot::channel();
        let tx = RefCell::new(Some(tx));
        let subscription = self.feed.listen_for_changes(Rc::new(move |_, new| {
            if let Some(tx) = tx.borrow_mut().take() {
                let _ = tx.send(new);
            }
        }));
        let feed: Rc<dyn Feed> = self.feed.clone();
        let _disposer = Disposer::new(&feed, subscription);
        rx.await.ok()
    }

    async fn pull(&self) -> Option<ScrollElement> {
        match self.feed.get_next().await {
            FeedResult::Ok(item) => {
                let element = ScrollElement::from_item(item);
                self.elements.borrow_mut().push(element.clone());
                Some(element)
            }
            FeedResult::None => None,
            FeedResult::Error(e) => {
                warn!(error = %e, "Feed returned an error");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;

    use super::*;
    use crate::feed::testing::ManualFeed;
    use crate::models::Filter;

    fn gallery_with(feeds: &[Rc<ManualFeed>]) -> Rc<Gallery> {
        let composed = ComposedFeed::new("main feed", Filter::default(), 1.0);
        for feed in feeds {
            composed.register_feed(&feed.factory());
        }
        Gallery::new(composed, 2)
    }

    #[derive(Default)]
    struct RecordingSink {
        seen: RefCell<Vec<Activation>>,
    }

    impl ActivationSink for RecordingSink {
        fn activated(&self, activation: Activation) {
            self.seen.borrow_mut().push(activation);
        }
    }

    #[tokio::test]
    async fn test_ok_feed_appends_elements() {
        let feed = ManualFeed::with_items("a", 1.0, &["one", "two"]);
        let gallery = gallery_with(&[feed]);

        let first = gallery.get_next_element().await.unwrap();
        assert_eq!(first.id, "one");
        assert_eq!(first.width, 160);
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery.fill(5).await, 1);
        assert_eq!(gallery.element_at(1).map(|e| e.id), Some("two".to_string()));
    }

    #[tokio::test]
    async fn test_loading_feed_retries_once_when_ready() {
        let feed = ManualFeed::with_items("a", 1.0, &["one"]);
        feed.set_state(FeedState::Loading);
        let gallery = gallery_with(&[Rc::clone(&feed)]);
        assert_eq!(gallery.status(), GalleryStatus::Loading);

        let (element, _) = tokio::join!(gallery.get_next_element(), async {
            tokio::task::yield_now().await;
            feed.set_state(FeedState::Ok);
        });
        assert_eq!(element.map(|e| e.id), Some("one".to_string()));
        assert_eq!(gallery.feed().listener_count(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_wait_removes_its_listener() {
        let feed = ManualFeed::with_items("a", 1.0, &["one"]);
        feed.set_state(FeedState::Loading);
        let gallery = gallery_with(&[Rc::clone(&feed)]);

        for _ in 0..5 {
            assert!(gallery.get_next_element().now_or_never().is_none());
        }
        assert_eq!(gallery.feed().listener_count(), 0);

        feed.set_state(FeedState::Ok);
        assert_eq!(gallery.feed().listener_count(), 0);
        assert_eq!(gallery.get_next_element().await.map(|e| e.id), Some("one".to_string()));
    }

    #[tokio::test]
    async fn test_loading_feed_that_fails_yields_nothing() {
        let feed = ManualFeed::with_items("a", 1.0, &["one"]);
        feed.set_state(FeedState::Loading);
        let gallery = gallery_with(&[Rc::clone(&feed)]);

        let (element, _) = tokio::join!(gallery.get_next_element(), async {
            tokio::task::yield_now().await;
            feed.set_state(FeedState::Exhausted);
        });
        assert!(element.is_none());
        assert_eq!(feed.pulls.get(), 0);
        assert_eq!(gallery.status(), GalleryStatus::Exhausted);
    }

    #[tokio::test]
    async fn test_concurrent_fill_is_ignored() {
        let feed = ManualFeed::with_items("a", 1.0, &["one", "two", "three"]);
        feed.set_state(FeedState::Loading);
        let gallery = gallery_with(&[Rc::clone(&feed)]);

        let (first, second) = tokio::join!(gallery.fill(2), async {
            let second = gallery.fill(5).await;
            feed.set_state(FeedState::Ok);
            second
        });
        assert_eq!(second, 0);
        assert_eq!(first, 2);
        assert!(!gallery.is_fetching());
        assert_eq!(gallery.len(), 2);
    }

    #[tokio::test]
    async fn test_terminal_states_yield_nothing() {
        let failed = ManualFeed::with_items("a", 1.0, &["one"]);
        failed.set_state(FeedState::Error);
        let gallery = gallery_with(&[Rc::clone(&failed)]);
        assert_eq!(gallery.status(), GalleryStatus::Failed);
        assert!(gallery.get_next_element().await.is_none());
        assert_eq!(failed.pulls.get(), 0);
    }

    #[test]
    fn test_status_without_feeds() {
        let gallery = gallery_with(&[]);
        assert_eq!(gallery.status(), GalleryStatus::NoFeeds);

        let ready = gallery_with(&[ManualFeed::with_items("a", 1.0, &[])]);
        assert_eq!(ready.status(), GalleryStatus::Ready);
    }

    #[tokio::test]
    async fn test_activation_reaches_sink_and_opens_session() {
        let feed = ManualFeed::with_items("a", 1.0, &["one", "two"]);
        let gallery = gallery_with(&[feed]);
        let sink = Rc::new(RecordingSink::default());
        gallery.set_activation_sink(sink.clone());
        gallery.fill(2).await;

        let session = gallery.activate("two", Some(4)).unwrap();
        assert_eq!(session.index(), 1);
        assert_eq!(
            sink.seen.borrow().as_slice(),
            &[Activation {
                item_id: "two".into(),
                handle_id: Some(4)
            }]
        );
        assert!(gallery.activate("missing", None).is_none());
        assert_eq!(sink.seen.borrow().len(), 1);
    }
}
