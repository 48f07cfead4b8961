//! User-configured remote JSON feeds.
//!
//! Every configured URL becomes one paginated child of a composition named
//! `REMOTE_FEED_NAME`. Adding or removing a feed persists the list and, when
//! a composition is live, registers or unregisters the child right away.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::config::{RemoteFeedConfig, RemoteFeedSettings};
use crate::feed::{ComposedFeed, Feed, FeedFactory, FetchError, Page, PageSource, PaginatedFeed};
use crate::models::{Dimensions, Filter, ItemSource, KeyValueStore, MediaItem, MediaKind, SrcVariant};
use crate::sources::HTTP_CLIENT;

pub const REMOTE_FEED_NAME: &str = "Remote files feed";

#[derive(Debug, Deserialize)]
pub struct RemotePage {
    #[serde(default)]
    pub iterator: Option<String>,
    #[serde(default)]
    pub items: Vec<RemoteItem>,
}

#[derive(Debug, Deserialize)]
pub struct RemoteItem {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: Option<MediaKind>,
    #[serde(default)]
    pub src: Vec<RemoteSrc>,
    #[serde(default)]
    pub dimensions: Option<Dimensions>,
}

#[derive(Debug, Deserialize)]
pub struct RemoteSrc {
    pub url: String,
    #[serde(default)]
    pub dimensions: Option<Dimensions>,
}

/// Turns a decoded response into a page. Relative source URLs resolve
/// against `base`; items without a name are named by a hash of their first
/// source.
pub fn page_from_wire(base: &Url, wire: RemotePage) -> Page {
    let feed_url = base.to_string();
    let items = wire
        .items
        .into_iter()
        .enumerate()
        .map(|(position, item)| {
            let src_variants: Vec<SrcVariant> = item
                .src
                .into_iter()
                .filter_map(|src| match base.join(&src.url) {
                    Ok(url) => Some(SrcVariant {
                        url: url.to_string(),
                        dimensions: src.dimensions,
                    }),
                    Err(e) => {
                        warn!(url = %src.url, error = %e, "Skipping unresolvable source");
                        None
                    }
                })
                .collect();

            let kind = item
                .kind
                .or_else(|| src_variants.first().and_then(|v| kind_from_url(&v.url)))
                .unwrap_or(MediaKind::Image);
            let name = item.name.unwrap_or_else(|| {
                let key = src_variants
                    .first()
                    .map(|v| v.url.clone())
                    .unwrap_or_else(|| format!("{feed_url}#{position}"));
                format!("{:016x}", xxh3_64(key.as_bytes()))
            });

            MediaItem {
                name,
                kind,
                source: ItemSource::Remote {
                    feed_url: feed_url.clone(),
                },
                src_variants,
                dimensions: item.dimensions,
            }
        })
        .collect();

    Page {
        next_token: wire.iterator.filter(|t| !t.is_empty()),
        items,
    }
}

fn kind_from_url(url: &str) -> Option<MediaKind> {
    let path = Url::parse(url).ok()?.path().to_string();
    let ext = path.rsplit_once('.')?.1;
    MediaKind::from_extension(ext)
}

/// `GET url?iterator=<token>`.
pub struct RemoteSource {
    name: String,
    url: Url,
    client: reqwest::Client,
}

impl RemoteSource {
    pub fn new(name: impl Into<String>, url: Url) -> Self {
        Self {
            name: name.into(),
            url,
            client: HTTP_CLIENT.clone(),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn page_url(&self, token: &str) -> Url {
        let mut url = self.url.clone();
        if !token.is_empty() {
            url.query_pairs_mut().append_pair("iterator", token);
        }
        url
    }
}

#[async_trait(?Send)]
impl PageSource for RemoteSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_page(&self, token: &str) -> Result<Page, FetchError> {
        let url = self.page_url(token);
        debug!(feed = %self.name, %url, "Requesting remote page");
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let wire: RemotePage =
            serde_json::from_slice(&body).map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(page_from_wire(&self.url, wire))
    }
}

pub struct RemoteFeeds {
    store: Rc<dyn KeyValueStore>,
    settings: RefCell<RemoteFeedSettings>,
    live: RefCell<Weak<ComposedFeed>>,
}

impl RemoteFeeds {
    pub fn load(store: Rc<dyn KeyValueStore>) -> Rc<Self> {
        let settings = RemoteFeedSettings::load(store.as_ref());
        debug!(feeds = settings.feeds.len(), "Loaded remote feeds");
        Rc::new(Self {
            store,
            settings: RefCell::new(settings),
            live: RefCell::new(Weak::new()),
        })
    }

    pub fn feeds(&self) -> Vec<RemoteFeedConfig> {
        self.settings.borrow().feeds.clone()
    }

    /// The composition most recently built by `factory`, if still alive.
    pub fn live(&self) -> Option<Rc<ComposedFeed>> {
        self.live.borrow().upgrade()
    }

    pub fn factory(self: &Rc<Self>) -> FeedFactory {
        let remote = Rc::clone(self);
        Rc::new(move |filter: &Filter| -> Rc<dyn Feed> { remote.build(filter) })
    }

    pub fn build(&self, filter: &Filter) -> Rc<ComposedFeed> {
        let composed = ComposedFeed::new(REMOTE_FEED_NAME, filter.clone(), 1.0);
        for config in self.feeds() {
            if let Some(factory) = child_factory(&config) {
                composed.register_feed(&factory);
            }
        }
        *self.live.borrow_mut() = Rc::downgrade(&composed);
        composed
    }

    pub fn add_feed(&self, name: &str, url: &str) -> Result<()> {
        let parsed = Url::parse(url).with_context(|| format!("Invalid feed URL {url:?}"))?;
        if self.settings.borrow().feeds.iter().any(|f| f.name == name) {
            bail!("A remote feed named {name:?} already exists");
        }
        let config = RemoteFeedConfig {
            url: parsed.to_string(),
            name: name.to_string(),
            selected: true,
        };
        self.settings.borrow_mut().feeds.push(config.clone());
        self.settings.borrow().save(self.store.as_ref())?;
        info!(feed = %name, %url, "Added remote feed");

        if let (Some(live), Some(factory)) = (self.live(), child_factory(&config)) {
            live.register_feed(&factory);
        }
        Ok(())
    }

    pub fn remove_feed(&self, name: &str) -> Result<bool> {
        let removed = {
            let mut settings = self.settings.borrow_mut();
            let before = settings.feeds.len();
            settings.feeds.retain(|f| f.name != name);
            settings.feeds.len() != before
        };
        if !removed {
            return Ok(false);
        }
        self.settings.borrow().save(self.store.as_ref())?;
        info!(feed = %name, "Removed remote feed");
        if let Some(live) = self.live() {
            live.unregister_feed(name);
        }
        Ok(true)
    }
}

fn child_factory(config: &RemoteFeedConfig) -> Option<FeedFactory> {
    let url = match Url::parse(&config.url) {
        Ok(url) => url,
        Err(e) => {
            warn!(feed = %config.name, url = %config.url, error = %e, "Skipping remote feed with bad URL");
            return None;
        }
    };
    let name = config.name.clone();
    let factory: FeedFactory = Rc::new(move |filter: &Filter| -> Rc<dyn Feed> {
        PaginatedFeed::new(name.clone(), filter.clone(), 1.0, RemoteSource::new(name.clone(), url.clone()))
    });
    Some(factory)
}
