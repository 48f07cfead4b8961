//! Natural dimensions of local media.
//!
//! Images are measured from their header. Videos are never decoded here, so
//! their dimensions are only known once something recorded them in the
//! store. Results are memoized in an LRU and, when a store is attached,
//! persisted by (path, mtime, size).

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::ImageReader;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::models::{Dimensions, MediaKind, SqliteStore};

const MEMO_CAPACITY: usize = 4096;

type Memo = LruCache<PathBuf, (i64, u64, Option<Dimensions>)>;

#[derive(Clone)]
pub struct DimensionProbe {
    store: Option<Arc<SqliteStore>>,
    memo: Arc<Mutex<Memo>>,
}

impl DimensionProbe {
    pub fn new(store: Option<Arc<SqliteStore>>) -> Self {
        let capacity = NonZeroUsize::new(MEMO_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            memo: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub fn dimensions(&self, path: &Path, kind: MediaKind, mtime: i64, size: u64) -> Option<Dimensions> {
        if let Some(&(m, s, dims)) = self.memo.lock().get(path) {
            if m == mtime && s == size {
                return dims;
            }
        }
        let dims = self.lookup(path, kind, mtime, size);
        self.memo.lock().put(path.to_path_buf(), (mtime, size, dims));
        dims
    }

    /// Records dimensions learned elsewhere, e.g. from a player that opened
    /// the file.
    pub fn remember(&self, path: &Path, mtime: i64, size: u64, dimensions: Dimensions) {
        self.memo
            .lock()
            .put(path.to_path_buf(), (mtime, size, Some(dimensions)));
        if let Some(store) = &self.store {
            if let Err(e) = store.remember_dimensions(path, mtime, size, dimensions) {
                warn!(path = %path.display(), error = %e, "Failed to cache dimensions");
            }
        }
    }

    fn lookup(&self, path: &Path, kind: MediaKind, mtime: i64, size: u64) -> Option<Dimensions> {
        if let Some(store) = &self.store {
            match store.cached_dimensions(path, mtime, size) {
                Ok(Some(dims)) => {
                    trace!(path = %path.display(), "Dimension cache hit");
                    return Some(dims);
                }
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Dimension cache lookup failed"),
            }
        }

        let dims = match kind {
            MediaKind::Image => read_image_dimensions(path)?,
            MediaKind::Video => return None,
        };
        self.remember(path, mtime, size, dims);
        Some(dims)
    }
}

/// Reads only as much of the file as the decoder needs for the header.
pub fn read_image_dimensions(path: &Path) -> Option<Dimensions> {
    let reader = match ImageReader::open(path).and_then(|r| r.with_guessed_format()) {
        Ok(reader) => reader,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to open image");
            return None;
        }
    };
    match reader.into_dimensions() {
        Ok((width, height)) if width > 0 && height > 0 => Some(Dimensions::new(width, height)),
        Ok(_) => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read image dimensions");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_png(path: &Path, width: u32, height: u32) {
        image::RgbImage::new(width, height).save(path).unwrap();
    }

    #[test]
    fn test_reads_image_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wide.png");
        write_png(&path, 4, 3);
        assert_eq!(read_image_dimensions(&path), Some(Dimensions::new(4, 3)));
    }

    #[test]
    fn test_broken_image_has_no_dimensions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();
        assert_eq!(read_image_dimensions(&path), None);
    }

    #[test]
    fn test_probe_persists_to_store() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SqliteStore::open(&dir.path().join("store.sqlite")).unwrap());
        let path = dir.path().join("a.png");
        write_png(&path, 8, 2);

        let probe = DimensionProbe::new(Some(Arc::clone(&store)));
        assert_eq!(probe.dimensions(&path, MediaKind::Image, 10, 99), Some(Dimensions::new(8, 2)));
        assert_eq!(store.get_stats().unwrap().dimension_count, 1);

        // A fresh probe finds the row even after the file is gone.
        std::fs::remove_file(&path).unwrap();
        let cold = DimensionProbe::new(Some(Arc::clone(&store)));
        assert_eq!(cold.dimensions(&path, MediaKind::Image, 10, 99), Some(Dimensions::new(8, 2)));
        // A different mtime misses.
        assert_eq!(cold.dimensions(&path, MediaKind::Image, 11, 99), None);
    }

    #[test]
    fn test_video_dimensions_come_only_from_cache() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"\0\0\0\x18ftypmp42").unwrap();

        let probe = DimensionProbe::new(None);
        assert_eq!(probe.dimensions(&path, MediaKind::Video, 1, 12), None);

        probe.remember(&path, 1, 12, Dimensions::new(1920, 1080));
        assert_eq!(probe.dimensions(&path, MediaKind::Video, 1, 12), Some(Dimensions::new(1920, 1080)));
    }
}
