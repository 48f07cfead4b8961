use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use feedwall::config::{AppConfig, LocalFeedSettings, Settings};
use feedwall::feed::FeedRegistry;
use feedwall::gallery::{Gallery, GalleryStatus, GalleryView, LoggingBinder};
use feedwall::models::{Filter, KeyValueStore, SqliteStore, TagStore};
use feedwall::scroll::{viewport_channel, ScrollConfig, ScrollFrame, Throttle};
use feedwall::sources::{
    LocalLibrary, RemoteFeeds, ScrolllerSource, LOCAL_FEED_NAME, REMOTE_FEED_NAME,
    SCROLLLER_FEED_NAME,
};
use feedwall::video::VideoHandleFactory;

/// Page-downs performed by the scripted session.
const SCRIPTED_PAGES: u32 = 8;
const SCRIPT_INTERVAL: Duration = Duration::from_millis(250);

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(
            "feedwall=info".parse().unwrap_or_else(|_| LevelFilter::INFO.into()),
        ))
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "feedwall failed");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let config = AppConfig::from_env()?;
    let directory = std::env::args_os().nth(1).map(PathBuf::from);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, session(config, directory))
}

async fn session(config: AppConfig, directory: Option<PathBuf>) -> Result<()> {
    let store = Arc::new(SqliteStore::open_or_rebuild(&config.db_path)?);
    let kv: Rc<dyn KeyValueStore> = Rc::new(Arc::clone(&store));
    info!(path = %config.db_path.display(), "Opened store");

    let mut settings = Settings::load(kv.as_ref());
    settings.set_current_tab("gallery");
    if let Err(e) = settings.save(kv.as_ref()) {
        warn!(error = %e, "Failed to save settings");
    }

    let mut local_settings = LocalFeedSettings::load(kv.as_ref());
    if let Some(directory) = directory {
        local_settings.directory = Some(directory);
        local_settings.save(kv.as_ref())?;
    }

    let tags = Rc::new(TagStore::load(Rc::clone(&kv)));
    let filter = if settings.allow_tags {
        Filter::load(kv.as_ref())
    } else {
        Filter::default()
    };
    let library = LocalLibrary::new(local_settings, Some(Arc::clone(&store)), Some(tags));
    let remote = RemoteFeeds::load(Rc::clone(&kv));

    let registry = FeedRegistry::load(Rc::clone(&kv));
    registry.register_feed(LOCAL_FEED_NAME, library.factory());
    registry.register_feed(REMOTE_FEED_NAME, remote.factory());
    registry.register_feed(SCROLLLER_FEED_NAME, ScrolllerSource::factory());
    if registry.enabled_feeds().is_empty() {
        registry.set_feed_enabled(LOCAL_FEED_NAME, true)?;
    }
    info!(enabled = ?registry.enabled_feeds(), "Feeds ready");

    if registry.is_feed_enabled(LOCAL_FEED_NAME) {
        let library = Rc::clone(&library);
        tokio::task::spawn_local(async move {
            match library.reload().await {
                Ok(count) => info!(count, "Local library loaded"),
                Err(e) => warn!(error = %e, "Local library unavailable"),
            }
        });
    }

    let gallery = Gallery::new(registry.build_composed(&filter), settings.buffer_size);
    let scroll_config = ScrollConfig {
        columns: config.columns,
        ..ScrollConfig::default()
    };
    let mut view = GalleryView::new(
        Rc::clone(&gallery),
        scroll_config,
        VideoHandleFactory,
        LoggingBinder::default(),
        settings,
    );

    let (handle, driver) = viewport_channel(Throttle::new(config.throttle));
    handle.resized(config.viewport);
    let page = config.viewport.height * 0.9;
    let script = tokio::task::spawn_local(async move {
        for step in 1..=SCRIPTED_PAGES {
            tokio::time::sleep(SCRIPT_INTERVAL).await;
            if !handle.scrolled(page * step as f32) {
                break;
            }
        }
    });

    view.run(&driver, log_frame).await;
    script.await.context("Scroll script panicked")?;
    view.shutdown();

    let status = gallery.status();
    if status == GalleryStatus::NoFeeds {
        warn!("No feeds enabled");
    }
    info!(
        ?status,
        elements = gallery.len(),
        binds = view.binder().binds,
        unbinds = view.binder().unbinds,
        "Scripted scroll finished"
    );
    match store.get_stats() {
        Ok(stats) => debug!(
            kv = stats.kv_count,
            dimensions = stats.dimension_count,
            bytes = stats.db_size_bytes,
            "Store stats"
        ),
        Err(e) => warn!(error = %e, "Failed to read store stats"),
    }
    Ok(())
}

fn log_frame(frame: &ScrollFrame) {
    info!(
        columns = frame.columns.len(),
        visible = frame.visible_count(),
        total_height = frame.total_height,
        more = frame.signaled_more,
        "Frame"
    );
    for element in frame.visible() {
        debug!(
            index = element.index,
            id = %element.id,
            column = element.column,
            top = element.top,
            height = element.height,
            visibility = element.visibility,
            handle = ?element.handle_id,
            "Visible"
        );
    }
}
