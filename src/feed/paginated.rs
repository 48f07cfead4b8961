//! Generic paginated source feed.
//!
//! Wraps a `PageSource` and hands out its items one at a time, fetching the
//! next page only when the buffer runs dry. Concurrent pulls share a single
//! in-flight fetch.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use async_trait::async_trait;
use futures::future::{FutureExt, LocalBoxFuture, Shared};
use tracing::{debug, info, trace, warn};

use crate::feed::{
    Feed, FeedCore, FeedResult, FeedState, FetchError, StateCallback, Subscription,
};
use crate::models::{Filter, MediaItem};

/// One backend page. `next_token` is `None` on the final page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub next_token: Option<String>,
    pub items: Vec<MediaItem>,
}

/// A backend that serves pages by continuation token. The first token is "".
#[async_trait(?Send)]
pub trait PageSource {
    fn name(&self) -> &str;
    async fn fetch_page(&self, token: &str) -> Result<Page, FetchError>;
}

type SharedFetch = Shared<LocalBoxFuture<'static, Result<Page, FetchError>>>;

struct Cursor {
    token: String,
    buffer: Vec<MediaItem>,
    position: usize,
    /// The last applied page carried no continuation token.
    final_page_seen: bool,
}

struct InFlight {
    generation: u64,
    fetch: SharedFetch,
}

pub struct PaginatedFeed<S: PageSource + 'static> {
    core: FeedCore,
    source: Rc<S>,
    cursor: RefCell<Cursor>,
    in_flight: RefCell<Option<InFlight>>,
    generation: Cell<u64>,
    fetches: Cell<usize>,
}

impl<S: PageSource + 'static> PaginatedFeed<S> {
    pub fn new(id: impl Into<String>, filter: Filter, frequency: f64, source: S) -> Rc<Self> {
        Self::with_initial_state(id, filter, frequency, FeedState::Ok, source)
    }

    /// Sources that need setup before their first page start in `Loading`
    /// and call `mark_ready` once they can serve.
    pub fn with_initial_state(
        id: impl Into<String>,
        filter: Filter,
        frequency: f64,
        initial: FeedState,
        source: S,
    ) -> Rc<Self> {
        Rc::new(Self {
            core: FeedCore::new(id, filter, frequency, initial),
            source: Rc::new(source),
            cursor: RefCell::new(Cursor {
                token: String::new(),
                buffer: Vec::new(),
                position: 0,
                final_page_seen: false,
            }),
            in_flight: RefCell::new(None),
            generation: Cell::new(0),
            fetches: Cell::new(0),
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Number of backend fetches started so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.get()
    }

    /// Items buffered but not yet handed out.
    pub fn buffered(&self) -> usize {
        let cursor = self.cursor.borrow();
        cursor.buffer.len() - cursor.position
    }

    pub fn mark_ready(&self) {
        if self.core.state() == FeedState::Loading {
            self.core.set_state(FeedState::Ok);
        }
    }

    /// A source that could not be set up. Only leaves `Loading`.
    pub fn mark_failed(&self) {
        if self.core.state() == FeedState::Loading {
            self.core.set_state(FeedState::Error);
        }
    }

    fn take_buffered(&self) -> Option<MediaItem> {
        let mut cursor = self.cursor.borrow_mut();
        let item = cursor.buffer.get(cursor.position).cloned()?;
        cursor.position += 1;
        Some(item)
    }

    fn join_or_start_fetch(&self) -> (u64, SharedFetch) {
        let mut in_flight = self.in_flight.borrow_mut();
        if let Some(pending) = in_flight.as_ref() {
            trace!(feed = %self.core.id(), "Joining in-flight fetch");
            return (pending.generation, pending.fetch.clone());
        }

        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        self.fetches.set(self.fetches.get() + 1);

        let token = self.cursor.borrow().token.clone();
        debug!(feed = %self.core.id(), source = self.source.name(), token = %token, "Fetching page");
        let source = Rc::clone(&self.source);
        let fetch = async move { source.fetch_page(&token).await }
            .boxed_local()
            .shared();
        *in_flight = Some(InFlight {
            generation,
            fetch: fetch.clone(),
        });
        (generation, fetch)
    }

    /// Applies a finished fetch unless another waiter already did.
    fn settle(&self, generation: u64, outcome: Result<Page, FetchError>) {
        {
            let mut in_flight = self.in_flight.borrow_mut();
            match in_flight.as_ref() {
                Some(pending) if pending.generation == generation => *in_flight = None,
                _ => return,
            }
        }

        match outcome {
            Ok(page) if page.items.is_empty() => {
                self.exhaust("backend returned an empty page");
            }
            Ok(page) => {
                let mut cursor = self.cursor.borrow_mut();
                trace!(
                    feed = %self.core.id(),
                    items = page.items.len(),
                    last = page.next_token.is_none(),
                    "Applying page"
                );
                cursor.buffer.extend(page.items);
                cursor.final_page_seen = page.next_token.is_none();
                cursor.token = page.next_token.unwrap_or_default();
            }
            Err(e) => {
                warn!(feed = %self.core.id(), error = %e, "Page fetch failed");
                self.exhaust("fetch failed");
            }
        }
    }

    fn exhaust(&self, reason: &str) {
        if self.core.set_state(FeedState::Exhausted) {
            info!(feed = %self.core.id(), reason, "Feed exhausted");
        }
    }
}

#[async_trait(?Send)]
impl<S: PageSource + 'static> Feed for PaginatedFeed<S> {
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
        loop {
            if self.core.state() != FeedState::Ok {
                return FeedResult::None;
            }
            if let Some(item) = self.take_buffered() {
                return FeedResult::Ok(item);
            }
            if self.cursor.borrow().final_page_seen {
                self.exhaust("final page consumed");
                return FeedResult::None;
            }

            let (generation, fetch) = self.join_or_start_fetch();
            let outcome = fetch.await;
            self.settle(generation, outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::feed::testing::item;

    /// Serves scripted pages and records every token it was asked for.
    struct ScriptedSource {
        pages: RefCell<VecDeque<Result<Page, FetchError>>>,
        tokens: RefCell<Vec<String>>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Result<Page, FetchError>>) -> Self {
            Self {
                pages: RefCell::new(pages.into()),
                tokens: RefCell::new(Vec::new()),
            }
        }
    }

    #[async_trait(?Send)]
    impl PageSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn fetch_page(&self, token: &str) -> Result<Page, FetchError> {
            self.tokens.borrow_mut().push(token.to_string());
            tokio::task::yield_now().await;
            self.pages
                .borrow_mut()
                .pop_front()
                .unwrap_or(Err(FetchError::NoMoreData))
        }
    }

    fn page(names: &[&str], next: Option<&str>) -> Result<Page, FetchError> {
        Ok(Page {
            next_token: next.map(str::to_string),
            items: names.iter().map(|n| item(n)).collect(),
        })
    }

    fn names(results: Vec<FeedResult>) -> Vec<Option<String>> {
        results
            .into_iter()
            .map(|r| r.into_item().map(|i| i.name))
            .collect()
    }

    #[tokio::test]
    async fn test_concurrent_pulls_share_one_fetch() {
        let feed = PaginatedFeed::new(
            "remote",
            Filter::default(),
            1.0,
            ScriptedSource::new(vec![page(&["a", "b", "c"], Some("t1"))]),
        );

        let (first, second) = futures::join!(feed.get_next(), feed.get_next());

        assert_eq!(feed.fetch_count(), 1);
        let mut got = names(vec![first, second]);
        got.sort();
        assert_eq!(got, vec![Some("a".to_string()), Some("b".to_string())]);
        assert_eq!(feed.buffered(), 1);
    }

    #[tokio::test]
    async fn test_tokens_follow_continuations() {
        let feed = PaginatedFeed::new(
            "remote",
            Filter::default(),
            1.0,
            ScriptedSource::new(vec![
                page(&["a"], Some("next-1")),
                page(&["b"], Some("next-2")),
                page(&["c"], None),
            ]),
        );

        let mut pulled = Vec::new();
        for _ in 0..3 {
            pulled.push(feed.get_next().await);
        }
        assert_eq!(
            names(pulled),
            vec![Some("a".into()), Some("b".into()), Some("c".into())]
        );
        assert_eq!(
            *feed.source().tokens.borrow(),
            vec!["".to_string(), "next-1".to_string(), "next-2".to_string()]
        );

        // Final page seen: no further backend call.
        assert!(feed.get_next().await.is_none());
        assert_eq!(feed.fetch_count(), 3);
        assert_eq!(feed.state(), FeedState::Exhausted);
    }

    #[tokio::test]
    async fn test_failure_exhausts_without_retry() {
        let feed = PaginatedFeed::new(
            "remote",
            Filter::default(),
            1.0,
            ScriptedSource::new(vec![
                page(&["a"], Some("t1")),
                Err(FetchError::Http("503".into())),
                page(&["never"], None),
            ]),
        );

        assert!(feed.get_next().await.into_item().is_some());
        assert!(feed.get_next().await.is_none());
        assert_eq!(feed.state(), FeedState::Exhausted);

        for _ in 0..3 {
            assert!(feed.get_next().await.is_none());
        }
        assert_eq!(feed.fetch_count(), 2);
        assert_eq!(feed.state(), FeedState::Exhausted);
    }

    #[tokio::test]
    async fn test_empty_page_exhausts() {
        let feed = PaginatedFeed::new(
            "remote",
            Filter::default(),
            1.0,
            ScriptedSource::new(vec![page(&[], Some("t1"))]),
        );
        assert!(feed.get_next().await.is_none());
        assert_eq!(feed.state(), FeedState::Exhausted);
    }

    #[tokio::test]
    async fn test_loading_feed_yields_nothing_until_ready() {
        let feed = PaginatedFeed::with_initial_state(
            "local",
            Filter::default(),
            1.0,
            FeedState::Loading,
            ScriptedSource::new(vec![page(&["a"], None)]),
        );
        assert!(feed.get_next().await.is_none());
        assert_eq!(feed.fetch_count(), 0);

        feed.mark_ready();
        assert_eq!(feed.state(), FeedState::Ok);
        assert_eq!(
            feed.get_next().await.into_item().map(|i| i.name),
            Some("a".to_string())
        );
    }
}
