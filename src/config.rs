//! Process configuration and persisted user settings.
//!
//! `AppConfig` comes from the environment and is fixed for the life of the
//! process. The settings structs are JSON blobs in the key-value store and
//! fall back to their defaults when missing or unreadable.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{load_json, save_json, KeyValueStore, SqliteStore};
use crate::scroll::Size;

pub const SETTINGS_KEY: &str = "settings";
pub const LOCAL_FEED_SETTINGS_KEY: &str = "localFeedSettings";
pub const REMOTE_FEED_SETTINGS_KEY: &str = "remoteFeedSettings";

const DEFAULT_COLUMNS: usize = 3;
const DEFAULT_VIEWPORT: Size = Size {
    width: 1280.0,
    height: 800.0,
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub columns: usize,
    pub throttle: Duration,
    pub viewport: Size,
}

impl AppConfig {
    /// Reads `FEEDWALL_DB`, `FEEDWALL_COLUMNS`, `FEEDWALL_THROTTLE_MS` and
    /// `FEEDWALL_VIEWPORT` (`WIDTHxHEIGHT`). Unparseable values fall back to
    /// the defaults with a warning.
    pub fn from_env() -> Result<Self> {
        let db_path = match std::env::var_os("FEEDWALL_DB") {
            Some(path) => PathBuf::from(path),
            None => SqliteStore::default_db_path().context("Failed to resolve database path")?,
        };

        let columns = env_parse("FEEDWALL_COLUMNS")
            .filter(|c: &usize| *c > 0)
            .unwrap_or(DEFAULT_COLUMNS);
        let throttle = Duration::from_millis(env_parse("FEEDWALL_THROTTLE_MS").unwrap_or(0));
        let viewport = std::env::var("FEEDWALL_VIEWPORT")
            .ok()
            .and_then(|v| {
                let parsed = parse_viewport(&v);
                if parsed.is_none() {
                    warn!(value = %v, "Ignoring malformed FEEDWALL_VIEWPORT");
                }
                parsed
            })
            .unwrap_or(DEFAULT_VIEWPORT);

        Ok(Self {
            db_path,
            columns,
            throttle,
            viewport,
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(name, value = %raw, "Ignoring malformed environment variable");
            None
        }
    }
}

/// Parses `"1280x800"`.
pub fn parse_viewport(value: &str) -> Option<Size> {
    let (w, h) = value.trim().split_once(['x', 'X'])?;
    let width = w.trim().parse::<f32>().ok().filter(|v| *v > 0.0)?;
    let height = h.trim().parse::<f32>().ok().filter(|v| *v > 0.0)?;
    Some(Size::new(width, height))
}

/// User preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub allow_tags: bool,
    pub autoplay: bool,
    pub show_controls_in_gallery_view: bool,
    /// Items pulled per `signal_more`.
    pub buffer_size: usize,
    /// Pool capacity for playback handles.
    pub max_video_elements: usize,
    pub persist_tab: bool,
    pub current_tab: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            allow_tags: false,
            autoplay: true,
            show_controls_in_gallery_view: false,
            buffer_size: 2,
            max_video_elements: 20,
            persist_tab: true,
            current_tab: None,
        }
    }
}

impl Settings {
    pub fn load(store: &dyn KeyValueStore) -> Self {
        load_json(store, SETTINGS_KEY)
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        save_json(store, SETTINGS_KEY, self)
    }

    pub fn set_persist_tab(&mut self, persist: bool) {
        self.persist_tab = persist;
        if !persist {
            self.current_tab = None;
        }
    }

    /// Remembers the open tab, unless tab persistence is off.
    pub fn set_current_tab(&mut self, tab: impl Into<String>) {
        if self.persist_tab {
            self.current_tab = Some(tab.into());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalFeedSettings {
    /// Directory to browse.
    #[serde(rename = "glob")]
    pub directory: Option<PathBuf>,
    pub randomize: bool,
}

impl LocalFeedSettings {
    pub fn load(store: &dyn KeyValueStore) -> Self {
        load_json(store, LOCAL_FEED_SETTINGS_KEY)
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        save_json(store, LOCAL_FEED_SETTINGS_KEY, self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFeedConfig {
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub selected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteFeedSettings {
    #[serde(default)]
    pub feeds: Vec<RemoteFeedConfig>,
}

impl RemoteFeedSettings {
    pub fn load(store: &dyn KeyValueStore) -> Self {
        load_json(store, REMOTE_FEED_SETTINGS_KEY)
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        save_json(store, REMOTE_FEED_SETTINGS_KEY, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MemoryStore;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::load(&MemoryStore::new());
        assert!(settings.autoplay);
        assert!(!settings.allow_tags);
        assert_eq!(settings.buffer_size, 2);
        assert_eq!(settings.max_video_elements, 20);
        assert!(settings.persist_tab);
    }

    #[test]
    fn test_partial_settings_fill_in_defaults() {
        let store = MemoryStore::new();
        store.set(SETTINGS_KEY, r#"{"autoplay":false,"bufferSize":6}"#).unwrap();
        let settings = Settings::load(&store);
        assert!(!settings.autoplay);
        assert_eq!(settings.buffer_size, 6);
        assert_eq!(settings.max_video_elements, 20);
    }

    #[test]
    fn test_settings_round_trip_through_store() {
        let store = MemoryStore::new();
        let mut settings = Settings::default();
        settings.set_current_tab("gallery");
        settings.save(&store).unwrap();

        let raw = store.get(SETTINGS_KEY).unwrap().unwrap();
        assert!(raw.contains("\"currentTab\":\"gallery\""));
        assert_eq!(Settings::load(&store), settings);
    }

    #[test]
    fn test_disabling_tab_persistence_forgets_tab() {
        let mut settings = Settings::default();
        settings.set_current_tab("settings");
        settings.set_persist_tab(false);
        assert_eq!(settings.current_tab, None);
        settings.set_current_tab("gallery");
        assert_eq!(settings.current_tab, None);
    }

    #[test]
    fn test_local_feed_settings_use_glob_key() {
        let store = MemoryStore::new();
        store
            .set(LOCAL_FEED_SETTINGS_KEY, r#"{"glob":"/media/clips","randomize":true}"#)
            .unwrap();
        let local = LocalFeedSettings::load(&store);
        assert_eq!(local.directory, Some(PathBuf::from("/media/clips")));
        assert!(local.randomize);
    }

    #[test]
    fn test_remote_settings_selected_defaults_false() {
        let store = MemoryStore::new();
        store
            .set(
                REMOTE_FEED_SETTINGS_KEY,
                r#"{"feeds":[{"url":"https://example.test/feed","name":"example"}]}"#,
            )
            .unwrap();
        let remote = RemoteFeedSettings::load(&store);
        assert_eq!(remote.feeds.len(), 1);
        assert!(!remote.feeds[0].selected);
    }

    #[test]
    fn test_parse_viewport() {
        assert_eq!(parse_viewport("1280x800"), Some(Size::new(1280.0, 800.0)));
        assert_eq!(parse_viewport(" 640 X 480 "), Some(Size::new(640.0, 480.0)));
        assert_eq!(parse_viewport("0x480"), None);
        assert_eq!(parse_viewport("wide"), None);
    }
}
