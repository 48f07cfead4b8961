//! Feeds: lazily paginated, stateful item streams.
//!
//! A feed is pulled one item at a time with `get_next` and pushes its state
//! changes to listeners. Source feeds wrap a backend, composed feeds
//! interleave their children by weight.

pub mod composed;
pub mod events;
pub mod frequency;
pub mod paginated;
pub mod registry;

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::models::{Filter, MediaItem};

pub use composed::ComposedFeed;
pub use events::{Disposer, Listeners, StateCallback, Subscription};
pub use paginated::{Page, PageSource, PaginatedFeed};
pub use registry::FeedRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedState {
    Loading,
    Ok,
    Error,
    Exhausted,
}

impl FeedState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for FeedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single backend page fetch. Cloneable so every waiter on a
/// shared in-flight fetch receives it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("transient fetch failure: {0}")]
    Transient(String),
    #[error("source has no more data")]
    NoMoreData,
    #[error("http error: {0}")]
    Http(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FeedError {
    #[error("source failed: {0}")]
    Source(#[from] FetchError),
}

/// Outcome of `Feed::get_next`. Failures never surface as a rejected future.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedResult {
    Ok(MediaItem),
    None,
    Error(FeedError),
}

impl FeedResult {
    pub fn into_item(self) -> Option<MediaItem> {
        match self {
            Self::Ok(item) => Some(item),
            Self::None | Self::Error(_) => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

#[async_trait(?Send)]
pub trait Feed {
    fn id(&self) -> &str;
    fn state(&self) -> FeedState;
    fn filter(&self) -> &Filter;
    /// Relative weight when interleaved by a parent composition.
    fn frequency(&self) -> f64;
    fn listen_for_changes(&self, callback: StateCallback) -> Subscription;
    fn stop_listening_for_changes(&self, subscription: Subscription);
    async fn get_next(&self) -> FeedResult;
}

/// Builds a feed bound to the given filter.
pub type FeedFactory = Rc<dyn Fn(&Filter) -> Rc<dyn Feed>>;

/// Identity, state and listeners shared by the feed implementations.
pub struct FeedCore {
    id: String,
    filter: Filter,
    frequency: f64,
    state: Cell<FeedState>,
    listeners: Listeners,
}

impl FeedCore {
    pub fn new(id: impl Into<String>, filter: Filter, frequency: f64, initial: FeedState) -> Self {
        Self {
            id: id.into(),
            filter,
            frequency,
            state: Cell::new(initial),
            listeners: Listeners::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn state(&self) -> FeedState {
        self.state.get()
    }

    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    /// Moves to `new` and notifies. Exhaustion is terminal: once exhausted the
    /// state never changes again. Returns whether anything changed.
    pub fn set_state(&self, new: FeedState) -> bool {
        if self.state.get() == FeedState::Exhausted && new != FeedState::Exhausted {
            warn!(feed = %self.id, to = %new, "Ignoring transition out of exhausted");
            return false;
        }
        self.replace_state(new)
    }

    /// Moves to `new` without the terminal check. Used for derived states,
    /// which follow their inputs in every direction.
    pub fn replace_state(&self, new: FeedState) -> bool {
        let old = self.state.get();
        if old == new {
            return false;
        }
        self.state.set(new);
        debug!(feed = %self.id, from = %old, to = %new, "Feed state changed");
        self.listeners.notify(old, new);
        true
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Hand-driven feed for exercising compositions.

    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;
    use crate::models::{ItemSource, MediaKind, SrcVariant};

    pub fn item(name: &str) -> MediaItem {
        MediaItem {
            name: name.to_string(),
            kind: MediaKind::Video,
            source: ItemSource::Remote {
                feed_url: "https://media.test/feed".into(),
            },
            src_variants: vec![SrcVariant {
                url: format!("https://media.test/{name}.mp4"),
                dimensions: None,
            }],
            dimensions: Some(crate::models::Dimensions::new(160, 90)),
        }
    }

    pub struct ManualFeed {
        core: FeedCore,
        items: RefCell<VecDeque<MediaItem>>,
        pub pulls: Cell<usize>,
    }

    impl ManualFeed {
        pub fn new(id: &str, frequency: f64, state: FeedState) -> Rc<Self> {
            Rc::new(Self {
                core: FeedCore::new(id, Filter::default(), frequency, state),
                items: RefCell::new(VecDeque::new()),
                pulls: Cell::new(0),
            })
        }

        pub fn with_items(id: &str, frequency: f64, names: &[&str]) -> Rc<Self> {
            let feed = Self::new(id, frequency, FeedState::Ok);
            feed.items
                .borrow_mut()
                .extend(names.iter().map(|n| item(n)));
            feed
        }

        pub fn set_state(&self, state: FeedState) {
            self.core.set_state(state);
        }

        /// Factory that hands out this very instance.
        pub fn factory(self: &Rc<Self>) -> FeedFactory {
            let feed = Rc::clone(self);
            Rc::new(move |_: &Filter| -> Rc<dyn Feed> { feed.clone() })
        }
    }

    #[async_trait(?Send)]
    impl Feed for ManualFeed {
        fn id(&self) -> &str {
            self.core.id()
        }

        fn state(&self) -> FeedState {
            self.core.state()
        }

        fn filter(&self) -> &Filter {
            self.core.filter()
        }

        fn frequency(&self) -> f64 {
            self.core.frequency()
        }

        fn listen_for_changes(&self, callback: StateCallback) -> Subscription {
            self.core.listeners().subscribe(callback)
        }

        fn stop_listening_for_changes(&self, subscription: Subscription) {
            self.core.listeners().unsubscribe(subscription);
        }

        async fn get_next(&self) -> FeedResult {
            self.pulls.set(self.pulls.get() + 1);
            if self.core.state() != FeedState::Ok {
                return FeedResult::None;
            }
            let next = self.items.borrow_mut().pop_front();
            match next {
                Some(item) => FeedResult::Ok(item),
                None => FeedResult::None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[test]
    fn test_exhausted_is_terminal() {
        let core = FeedCore::new("a", Filter::default(), 1.0, FeedState::Ok);
        assert!(core.set_state(FeedState::Exhausted));
        assert!(!core.set_state(FeedState::Ok));
        assert!(!core.set_state(FeedState::Loading));
        assert_eq!(core.state(), FeedState::Exhausted);
    }

    #[test]
    fn test_notifies_only_on_change_with_old_and_new() {
        let core = FeedCore::new("a", Filter::default(), 1.0, FeedState::Loading);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        core.listeners()
            .subscribe(Rc::new(move |old, new| sink.borrow_mut().push((old, new))));

        core.set_state(FeedState::Ok);
        core.set_state(FeedState::Ok);
        core.set_state(FeedState::Error);
        core.set_state(FeedState::Ok);

        assert_eq!(
            *seen.borrow(),
            vec![
                (FeedState::Loading, FeedState::Ok),
                (FeedState::Ok, FeedState::Error),
                (FeedState::Error, FeedState::Ok),
            ]
        );
    }

    #[test]
    fn test_replace_state_may_leave_exhausted() {
        let core = FeedCore::new("composed", Filter::default(), 1.0, FeedState::Exhausted);
        assert!(core.replace_state(FeedState::Ok));
        assert_eq!(core.state(), FeedState::Ok);
    }

    #[test]
    fn test_fetch_error_converts_to_feed_error() {
        let err: FeedError = FetchError::Http("502".into()).into();
        assert_eq!(err.to_string(), "source failed: http error: 502");
        assert_eq!(FeedResult::Error(err).into_item(), None);
    }
}
