//! Key-value persistence for user settings, plus the local dimension cache.
//!
//! Everything the gallery remembers between runs goes through the small
//! `KeyValueStore` contract: JSON blobs stored under well-known keys. The
//! SQLite implementation also keeps a `media_dimensions` table so local files
//! are only probed once per (path, mtime, size).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::models::Dimensions;

/// Minimal get/set contract the service objects persist through.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }
}

/// Reads a JSON value, falling back to `T::default()` when the key is missing,
/// unreadable, or holds something that no longer parses.
pub fn load_json<T>(store: &dyn KeyValueStore, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    match store.get(key) {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Stored value is corrupt, using defaults");
                T::default()
            }
        },
        Ok(None) => T::default(),
        Err(e) => {
            warn!(key, error = %e, "Failed to read stored value, using defaults");
            T::default()
        }
    }
}

pub fn save_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)
        .with_context(|| format!("Failed to serialize value for key {key}"))?;
    store.set(key, &raw)
}

/// SQLite-backed store.
///
/// The database lives at `XDG_CONFIG_HOME/feedwall/store.sqlite` by default and
/// uses WAL mode. The connection sits behind a mutex so the store can be shared
/// with the blocking scan task.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

/// Row counts and file size for debugging.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub kv_count: i64,
    pub dimension_count: i64,
    pub db_size_bytes: i64,
}

impl SqliteStore {
    pub fn open_default() -> Result<Self> {
        let db_path = Self::default_db_path()?;
        Self::open(&db_path)
    }

    pub fn default_db_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("", "", "feedwall")
            .context("Failed to determine project directories")?;

        let config_dir = proj_dirs.config_dir();
        std::fs::create_dir_all(config_dir)
            .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;

        Ok(config_dir.join("store.sqlite"))
    }

    /// Opens or creates the database at `path`.
    ///
    /// Pragmas:
    /// - journal_mode = WAL
    /// - synchronous = NORMAL
    /// - temp_store = MEMORY
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA cache_size = -16000;
            ",
        )
        .context("Failed to configure SQLite pragmas")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_tables()?;

        info!("Opened settings store at {:?}", path);
        Ok(store)
    }

    /// Opens the database, moving it aside and starting fresh if it cannot be read.
    pub fn open_or_rebuild(path: &Path) -> Result<Self> {
        match Self::open(path) {
            Ok(store) => Ok(store),
            Err(e) => {
                warn!(error = %e, "Settings store failed to open");
                Self::handle_corruption(path)
            }
        }
    }

    fn create_tables(&self) -> Result<()> {
        self.conn
            .lock()
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Probed dimensions of local files, valid while mtime and size match
            CREATE TABLE IF NOT EXISTS media_dimensions (
                path TEXT PRIMARY KEY NOT NULL,
                mtime INTEGER NOT NULL,
                size INTEGER NOT NULL,
                width INTEGER NOT NULL,
                height INTEGER NOT NULL
            );
            ",
            )
            .context("Failed to create database tables")?;

        debug!("Database tables created/verified");
        Ok(())
    }

    // =========================================================================
    // Dimension cache
    // =========================================================================

    /// Cached dimensions for a file, if the cached row still matches its mtime and size.
    pub fn cached_dimensions(&self, path: &Path, mtime: i64, size: u64) -> Result<Option<Dimensions>> {
        let row = self
            .conn
            .lock()
            .query_row(
                "SELECT width, height FROM media_dimensions
                 WHERE path = ?1 AND mtime = ?2 AND size = ?3",
                params![path.to_string_lossy(), mtime, size as i64],
                |row| Ok(Dimensions::new(row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("Failed to query cached dimensions")?;
        Ok(row)
    }

    pub fn remember_dimensions(
        &self,
        path: &Path,
        mtime: i64,
        size: u64,
        dimensions: Dimensions,
    ) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "
            INSERT INTO media_dimensions (path, mtime, size, width, height)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(path) DO UPDATE SET
                mtime = excluded.mtime,
                size = excluded.size,
                width = excluded.width,
                height = excluded.height
            ",
                params![
                    path.to_string_lossy(),
                    mtime,
                    size as i64,
                    dimensions.width,
                    dimensions.height,
                ],
            )
            .context("Failed to store dimensions")?;
        Ok(())
    }

    pub fn get_stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock();
        let kv_count: i64 = conn.query_row("SELECT COUNT(*) FROM kv", [], |r| r.get(0))?;
        let dimension_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM media_dimensions", [], |r| r.get(0))?;
        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |r| r.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |r| r.get(0))?;

        Ok(StoreStats {
            kv_count,
            dimension_count,
            db_size_bytes: page_count * page_size,
        })
    }

    pub fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    /// Moves a corrupted database aside and creates a fresh one in its place.
    pub fn handle_corruption(path: &Path) -> Result<Self> {
        warn!("Handling potential database corruption at {:?}", path);

        let backup_path = path.with_extension("sqlite.corrupted");
        if path.exists() {
            std::fs::rename(path, &backup_path).with_context(|| {
                format!("Failed to backup corrupted database to {:?}", backup_path)
            })?;
            warn!("Backed up corrupted database to {:?}", backup_path);
        }

        Self::open(path)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .lock()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .with_context(|| format!("Failed to read key {key}"))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "
            INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            ",
                params![key, value, Self::now()],
            )
            .with_context(|| format!("Failed to write key {key}"))?;
        Ok(())
    }
}

/// In-memory store, used by tests and when no database is wanted.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}
