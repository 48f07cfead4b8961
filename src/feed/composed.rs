//! A feed made of feeds.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, trace};

use crate::feed::frequency::pick_weighted_with;
use crate::feed::{
    Feed, FeedCore, FeedFactory, FeedResult, FeedState, StateCallback, Subscription,
};
use crate::models::Filter;

/// Aggregate state of a set of children. Exhausted wins over loading, which
/// wins over error; an empty set is ok.
pub fn derive_state(states: impl IntoIterator<Item = FeedState>) -> FeedState {
    let mut any_loading = false;
    let mut any_error = false;
    for state in states {
        match state {
            FeedState::Exhausted => return FeedState::Exhausted,
            FeedState::Loading => any_loading = true,
            FeedState::Error => any_error = true,
            FeedState::Ok => {}
        }
    }
    if any_loading {
        FeedState::Loading
    } else if any_error {
        FeedState::Error
    } else {
        FeedState::Ok
    }
}

struct Child {
    feed: Rc<dyn Feed>,
    subscription: Subscription,
}

/// Interleaves child feeds by frequency.
///
/// The composed state is derived from the children and recomputed whenever
/// one of them changes state. Because it is itself a `Feed`, compositions
/// nest.
pub struct ComposedFeed {
    core: FeedCore,
    children: RefCell<Vec<Child>>,
    rng: RefCell<StdRng>,
    this: Weak<ComposedFeed>,
}

impl ComposedFeed {
    pub fn new(id: impl Into<String>, filter: Filter, frequency: f64) -> Rc<Self> {
        Self::with_rng(id, filter, frequency, StdRng::from_entropy())
    }

    /// Deterministic picks, for tests and replays.
    pub fn with_rng(id: impl Into<String>, filter: Filter, frequency: f64, rng: StdRng) -> Rc<Self> {
        let id = id.into();
        Rc::new_cyclic(|this| Self {
            core: FeedCore::new(id, filter, frequency, derive_state(std::iter::empty::<FeedState>())),
            children: RefCell::new(Vec::new()),
            rng: RefCell::new(rng),
            this: this.clone(),
        })
    }

    /// Instantiates a child with this composition's filter and starts following it.
    /// Returns the child's id.
    pub fn register_feed(&self, factory: &FeedFactory) -> String {
        let feed = factory(self.core.filter());
        let id = feed.id().to_string();

        let this = self.this.clone();
        let bridge: StateCallback = Rc::new(move |old, new| {
            if let Some(composed) = this.upgrade() {
                trace!(composed = %composed.core.id(), %old, %new, "Child state changed");
                composed.recompute();
            }
        });
        let subscription = feed.listen_for_changes(bridge);

        debug!(composed = %self.core.id(), child = %id, "Registered feed");
        self.children.borrow_mut().push(Child { feed, subscription });
        self.recompute();
        id
    }

    /// Removes every child with `id`. Returns whether anything was removed.
    pub fn unregister_feed(&self, id: &str) -> bool {
        let removed: Vec<Child> = {
            let mut children = self.children.borrow_mut();
            let (removed, kept): (Vec<Child>, Vec<Child>) =
                children.drain(..).partition(|c| c.feed.id() == id);
            *children = kept;
            removed
        };
        if removed.is_empty() {
            return false;
        }
        for child in &removed {
            child.feed.stop_listening_for_changes(child.subscription);
        }
        debug!(composed = %self.core.id(), child = %id, "Unregistered feed");
        self.recompute();
        true
    }

    pub fn child_ids(&self) -> Vec<String> {
        self.children
            .borrow()
            .iter()
            .map(|c| c.feed.id().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.children.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.borrow().is_empty()
    }

    /// Listeners on the composition itself, not on its children.
    pub fn listener_count(&self) -> usize {
        self.core.listeners().len()
    }

    /// Drops every child and its subscription.
    pub fn clear(&self) {
        let children = std::mem::take(&mut *self.children.borrow_mut());
        for child in &children {
            child.feed.stop_listening_for_changes(child.subscription);
        }
        self.recompute();
    }

    fn recompute(&self) {
        let states: Vec<FeedState> = self
            .children
            .borrow()
            .iter()
            .map(|c| c.feed.state())
            .collect();
        self.core.replace_state(derive_state(states));
    }
}

impl Drop for ComposedFeed {
    fn drop(&mut self) {
        for child in self.children.get_mut().iter() {
            child.feed.stop_listening_for_changes(child.subscription);
        }
    }
}

#[async_trait(?Send)]
impl Feed for ComposedFeed {
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
        if self.core.state() != FeedState::Ok {
            return FeedResult::None;
        }
        let chosen = {
            let weighted: Vec<(Rc<dyn Feed>, f64)> = self
                .children
                .borrow()
                .iter()
                .map(|c| (Rc::clone(&c.feed), c.feed.frequency()))
                .collect();
            let mut rng = self.rng.borrow_mut();
            pick_weighted_with(&weighted, &mut *rng).cloned()
        };
        match chosen {
            Some(feed) => {
                trace!(composed = %self.core.id(), child = %feed.id(), "Pulling from child");
                feed.get_next().await
            }
            None => FeedResult::None,
        }
    }
}
