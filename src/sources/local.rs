//! Local directory lane.
//!
//! `LocalLibrary` enumerates a directory once (off the runtime thread) and
//! keeps the resulting item list. Feeds created before enumeration finishes
//! start out `Loading` and are flipped to ok, or error, when it lands. Each
//! feed pages through its own filtered view of the list, 50 items at a time,
//! using the offset as continuation token.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::LocalFeedSettings;
use crate::feed::{Feed, FeedFactory, FeedState, FetchError, Page, PageSource, PaginatedFeed};
use crate::models::{
    normalize_extension, Filter, ItemSource, MediaItem, MediaKind, SqliteStore, SrcVariant, TagStore,
};
use crate::sources::probe::DimensionProbe;

pub const LOCAL_FEED_NAME: &str = "Local files feed";
pub const PAGE_SIZE: usize = 50;

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub recursive: bool,
    /// Maximum directory depth (0 = unlimited).
    pub max_depth: usize,
    pub follow_symlinks: bool,
    /// Shuffle instead of sorting by path.
    pub randomize: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            recursive: true,
            max_depth: 0,
            follow_symlinks: false,
            randomize: false,
        }
    }
}

/// Walks `root` and builds an item for every file with a media extension.
/// Unreadable entries are skipped.
pub fn scan_directory(root: &Path, config: &ScanConfig, probe: &DimensionProbe) -> Result<Vec<MediaItem>> {
    if !root.is_dir() {
        return Err(anyhow!("{} is not a directory", root.display()));
    }
    info!(root = %root.display(), "Scanning directory");

    let mut walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    if !config.recursive {
        walker = walker.max_depth(1);
    } else if config.max_depth > 0 {
        walker = walker.max_depth(config.max_depth);
    }

    let mut items = Vec::new();
    for entry in walker.into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_dir() {
            continue;
        }
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let Some(kind) = MediaKind::from_extension(ext) else {
            continue;
        };

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read metadata");
                continue;
            }
        };
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let size = metadata.len();

        let url = match reqwest::Url::from_file_path(path) {
            Ok(url) => url,
            Err(()) => {
                warn!(path = %path.display(), "Path cannot be expressed as a file URL");
                continue;
            }
        };
        let name = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned();

        items.push(MediaItem {
            name,
            kind,
            source: ItemSource::Local {
                path: path.to_path_buf(),
                extension: normalize_extension(ext),
                mtime,
                size,
            },
            src_variants: vec![SrcVariant {
                url: url.to_string(),
                dimensions: None,
            }],
            dimensions: probe.dimensions(path, kind, mtime, size),
        });
    }

    if config.randomize {
        items.shuffle(&mut rand::thread_rng());
    } else {
        items.sort_by(|a, b| a.name.cmp(&b.name));
    }
    info!(root = %root.display(), items = items.len(), "Scan complete");
    Ok(items)
}

enum Library {
    Pending,
    Ready(Rc<Vec<MediaItem>>),
    Failed(String),
}

pub struct LocalLibrary {
    settings: RefCell<LocalFeedSettings>,
    config: ScanConfig,
    probe: DimensionProbe,
    tags: Option<Rc<TagStore>>,
    state: RefCell<Library>,
    waiting: RefCell<Vec<Weak<PaginatedFeed<LocalSource>>>>,
}

impl LocalLibrary {
    pub fn new(
        settings: LocalFeedSettings,
        cache: Option<Arc<SqliteStore>>,
        tags: Option<Rc<TagStore>>,
    ) -> Rc<Self> {
        let config = ScanConfig {
            randomize: settings.randomize,
            ..ScanConfig::default()
        };
        Rc::new(Self {
            settings: RefCell::new(settings),
            config,
            probe: DimensionProbe::new(cache),
            tags,
            state: RefCell::new(Library::Pending),
            waiting: RefCell::new(Vec::new()),
        })
    }

    pub fn directory(&self) -> Option<PathBuf> {
        self.settings.borrow().directory.clone()
    }

    pub fn set_directory(&self, directory: PathBuf) {
        self.settings.borrow_mut().directory = Some(directory);
    }

    pub fn settings(&self) -> LocalFeedSettings {
        self.settings.borrow().clone()
    }

    pub fn is_loaded(&self) -> bool {
        matches!(*self.state.borrow(), Library::Ready(_))
    }

    pub fn len(&self) -> usize {
        match &*self.state.borrow() {
            Library::Ready(items) => items.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enumerates the directory again and wakes every feed still waiting.
    /// Returns the number of items found.
    pub async fn reload(&self) -> Result<usize> {
        let scanned = match self.directory() {
            Some(root) => {
                let config = ScanConfig {
                    randomize: self.settings.borrow().randomize,
                    ..self.config.clone()
                };
                let probe = self.probe.clone();
                tokio::task::spawn_blocking(move || scan_directory(&root, &config, &probe))
                    .await
                    .context("Scan task panicked")
                    .and_then(|r| r)
            }
            None => Err(anyhow!("No local directory configured")),
        };

        let waiting: Vec<_> = std::mem::take(&mut *self.waiting.borrow_mut());
        match scanned {
            Ok(items) => {
                let count = items.len();
                *self.state.borrow_mut() = Library::Ready(Rc::new(items));
                for feed in waiting.iter().filter_map(Weak::upgrade) {
                    feed.mark_ready();
                }
                Ok(count)
            }
            Err(e) => {
                warn!(error = %e, "Local library failed to load");
                *self.state.borrow_mut() = Library::Failed(e.to_string());
                for feed in waiting.iter().filter_map(Weak::upgrade) {
                    feed.mark_failed();
                }
                Err(e)
            }
        }
    }

    pub fn create_feed(self: &Rc<Self>, filter: &Filter) -> Rc<PaginatedFeed<LocalSource>> {
        let initial = match &*self.state.borrow() {
            Library::Pending => FeedState::Loading,
            Library::Ready(_) => FeedState::Ok,
            Library::Failed(_) => FeedState::Error,
        };
        let source = LocalSource {
            library: Rc::clone(self),
            filter: filter.clone(),
            view: RefCell::new(None),
        };
        let feed = PaginatedFeed::with_initial_state(LOCAL_FEED_NAME, filter.clone(), 1.0, initial, source);
        if initial == FeedState::Loading {
            self.waiting.borrow_mut().push(Rc::downgrade(&feed));
        }
        debug!(filter = %filter.as_string(), state = %initial, "Created local feed");
        feed
    }

    pub fn factory(self: &Rc<Self>) -> FeedFactory {
        let library = Rc::clone(self);
        Rc::new(move |filter: &Filter| -> Rc<dyn Feed> { library.create_feed(filter) })
    }

    fn snapshot(&self) -> Result<Rc<Vec<MediaItem>>, FetchError> {
        match &*self.state.borrow() {
            Library::Ready(items) => Ok(Rc::clone(items)),
            Library::Pending => Err(FetchError::Transient("library not loaded yet".into())),
            Library::Failed(reason) => Err(FetchError::Io(reason.clone())),
        }
    }

    fn tags_for(&self, id: &str) -> Vec<String> {
        self.tags
            .as_ref()
            .map(|tags| tags.tags_for_id(id))
            .unwrap_or_default()
    }
}

/// Pages over the library items that carry all of the filter's tags.
pub struct LocalSource {
    library: Rc<LocalLibrary>,
    filter: Filter,
    view: RefCell<Option<Rc<Vec<MediaItem>>>>,
}

impl LocalSource {
    fn view(&self) -> Result<Rc<Vec<MediaItem>>, FetchError> {
        if let Some(view) = self.view.borrow().as_ref() {
            return Ok(Rc::clone(view));
        }
        let items = self.library.snapshot()?;
        let view = if self.filter.is_empty() {
            items
        } else {
            let kept: Vec<MediaItem> = items
                .iter()
                .filter(|item| self.filter.matches(&self.library.tags_for(&item.name)))
                .cloned()
                .collect();
            debug!(filter = %self.filter.as_string(), kept = kept.len(), of = items.len(), "Filtered local items");
            Rc::new(kept)
        };
        *self.view.borrow_mut() = Some(Rc::clone(&view));
        Ok(view)
    }
}

#[async_trait(?Send)]
impl PageSource for LocalSource {
    fn name(&self) -> &str {
        LOCAL_FEED_NAME
    }

    async fn fetch_page(&self, token: &str) -> Result<Page, FetchError> {
        let offset = if token.is_empty() {
            0
        } else {
            token
                .parse::<usize>()
                .map_err(|_| FetchError::Decode(format!("bad offset token {token:?}")))?
        };
        let view = self.view()?;
        let end = (offset + PAGE_SIZE).min(view.len());
        let items = view.get(offset..end).map(<[MediaItem]>::to_vec).unwrap_or_default();
        let next_token = (end < view.len()).then(|| end.to_string());
        Ok(Page { next_token, items })
    }
}
