//! Named feed factories and the persisted set of enabled ones.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{bail, Result};
use tracing::{debug, info};

use crate::feed::{ComposedFeed, FeedFactory};
use crate::models::{load_json, save_json, Filter, KeyValueStore};

pub const ENABLED_FEEDS_KEY: &str = "enabledFeeds";
pub const MAIN_FEED_NAME: &str = "main feed";

struct RegisteredFeed {
    name: String,
    factory: FeedFactory,
}

pub struct FeedRegistry {
    store: Rc<dyn KeyValueStore>,
    registered: RefCell<Vec<RegisteredFeed>>,
    enabled: RefCell<Vec<String>>,
}

impl FeedRegistry {
    pub fn load(store: Rc<dyn KeyValueStore>) -> Self {
        let enabled: Vec<String> = load_json(store.as_ref(), ENABLED_FEEDS_KEY);
        debug!(?enabled, "Loaded enabled feeds");
        Self {
            store,
            registered: RefCell::new(Vec::new()),
            enabled: RefCell::new(enabled),
        }
    }

    /// Adds a factory under `name`. The first registration of a name wins.
    pub fn register_feed(&self, name: impl Into<String>, factory: FeedFactory) -> bool {
        let name = name.into();
        let mut registered = self.registered.borrow_mut();
        if registered.iter().any(|r| r.name == name) {
            debug!(feed = %name, "Feed already registered");
            return false;
        }
        registered.push(RegisteredFeed { name, factory });
        true
    }

    pub fn unregister_feed(&self, name: &str) -> bool {
        let mut registered = self.registered.borrow_mut();
        let before = registered.len();
        registered.retain(|r| r.name != name);
        registered.len() != before
    }

    pub fn feed_names(&self) -> Vec<String> {
        self.registered
            .borrow()
            .iter()
            .map(|r| r.name.clone())
            .collect()
    }

    pub fn enabled_feeds(&self) -> Vec<String> {
        self.enabled.borrow().clone()
    }

    pub fn is_feed_enabled(&self, name: &str) -> bool {
        self.enabled.borrow().iter().any(|n| n == name)
    }

    /// Flips `name` in the enabled set and persists it. Returns the new value.
    pub fn switch_feed_enablement(&self, name: &str) -> Result<bool> {
        let enable = !self.is_feed_enabled(name);
        self.set_feed_enabled(name, enable)?;
        Ok(enable)
    }

    pub fn set_feed_enabled(&self, name: &str, enable: bool) -> Result<()> {
        if enable && !self.registered.borrow().iter().any(|r| r.name == name) {
            bail!("No feed registered under {name:?}");
        }
        {
            let mut enabled = self.enabled.borrow_mut();
            enabled.retain(|n| n != name);
            if enable {
                enabled.push(name.to_string());
            }
        }
        info!(feed = %name, enable, "Feed enablement changed");
        save_json(self.store.as_ref(), ENABLED_FEEDS_KEY, &*self.enabled.borrow())
    }

    /// Fresh composition of the enabled feeds, in registration order.
    pub fn build_composed(&self, filter: &Filter) -> Rc<ComposedFeed> {
        let composed = ComposedFeed::new(MAIN_FEED_NAME, filter.clone(), 1.0);
        let factories: Vec<FeedFactory> = self
            .registered
            .borrow()
            .iter()
            .filter(|r| self.is_feed_enabled(&r.name))
            .map(|r| Rc::clone(&r.factory))
            .collect();
        for factory in &factories {
            composed.register_feed(factory);
        }
        debug!(filter = %filter.as_string(), feeds = composed.len(), "Built composed feed");
        composed
    }
}
