//! State-change listeners shared by every feed.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::feed::{Feed, FeedState};

/// Called with `(old, new)` after a feed changed state.
pub type StateCallback = Rc<dyn Fn(FeedState, FeedState)>;

/// Token returned by `Listeners::subscribe` and by other observer registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

impl Subscription {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Ordered set of state listeners.
///
/// Notification runs over a snapshot of the registered callbacks, so a
/// callback may unsubscribe itself (or subscribe others) while being called.
#[derive(Default)]
pub struct Listeners {
    next_id: Cell<u64>,
    entries: RefCell<Vec<(u64, StateCallback)>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: StateCallback) -> Subscription {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.entries.borrow_mut().push((id, callback));
        Subscription(id)
    }

    /// Returns false when the subscription was already gone.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|(id, _)| *id != subscription.0);
        entries.len() != before
    }

    pub fn notify(&self, old: FeedState, new: FeedState) {
        let snapshot: Vec<StateCallback> = self
            .entries
            .borrow()
            .iter()
            .map(|(_, cb)| Rc::clone(cb))
            .collect();
        for callback in snapshot {
            callback(old, new);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

/// Unsubscribes from a feed when dropped.
pub struct Disposer {
    feed: Weak<dyn Feed>,
    subscription: Option<Subscription>,
}

impl Disposer {
    pub fn new(feed: &Rc<dyn Feed>, subscription: Subscription) -> Self {
        Self {
            feed: Rc::downgrade(feed),
            subscription: Some(subscription),
        }
    }
}

impl Drop for Disposer {
    fn drop(&mut self) {
        if let (Some(subscription), Some(feed)) = (self.subscription.take(), self.feed.upgrade()) {
            feed.stop_listening_for_changes(subscription);
        }
    }
}
