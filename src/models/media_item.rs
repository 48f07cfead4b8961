use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" | "png" | "webp" | "gif" | "bmp" => Some(Self::Image),
            "mp4" | "m4v" | "mov" | "avi" | "mkv" | "webm" | "flv" | "ebml" => Some(Self::Video),
            _ => None,
        }
    }

    /// Layout stand-in for items whose natural size is unknown.
    pub fn estimated_dimensions(self) -> Dimensions {
        match self {
            Self::Video => Dimensions::new(16, 9),
            Self::Image => Dimensions::new(1, 1),
        }
    }
}

/// Canonical spelling for container extensions that have aliases.
pub fn normalize_extension(ext: &str) -> String {
    match ext.to_lowercase().as_str() {
        "ebml" => "webm".to_string(),
        "m4v" => "mp4".to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    /// Height of the item when drawn `width` pixels wide. Zero when the
    /// natural width is unknown.
    pub fn height_for_width(&self, width: f32) -> f32 {
        if self.width == 0 {
            0.0
        } else {
            width * self.height as f32 / self.width as f32
        }
    }
}

/// One encoding of an item, in preference order within `MediaItem::src_variants`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrcVariant {
    pub url: String,
    #[serde(default)]
    pub dimensions: Option<Dimensions>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceType {
    Local,
    Remote,
    Aggregator,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Aggregator => "aggregator",
        }
    }
}

/// Where an item came from, with the fields only that backend knows about.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemSource {
    Local {
        path: PathBuf,
        extension: String,
        mtime: i64,
        size: u64,
    },
    Remote {
        feed_url: String,
    },
    Aggregator {
        post_id: u64,
        subreddit: String,
        title: String,
    },
}

impl ItemSource {
    pub fn source_type(&self) -> SourceType {
        match self {
            Self::Local { .. } => SourceType::Local,
            Self::Remote { .. } => SourceType::Remote,
            Self::Aggregator { .. } => SourceType::Aggregator,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    /// Unique id within the gallery.
    pub name: String,
    pub kind: MediaKind,
    pub source: ItemSource,
    pub src_variants: Vec<SrcVariant>,
    pub dimensions: Option<Dimensions>,
}

impl MediaItem {
    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }

    pub fn source_type(&self) -> SourceType {
        self.source.source_type()
    }

    /// URL of the preferred encoding, if the item has any.
    pub fn primary_src(&self) -> Option<&str> {
        self.src_variants.first().map(|v| v.url.as_str())
    }

    /// Natural dimensions, falling back to the first variant that knows them.
    pub fn natural_dimensions(&self) -> Option<Dimensions> {
        self.dimensions
            .or_else(|| self.src_variants.iter().find_map(|v| v.dimensions))
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.natural_dimensions()
            .map(|d| d.aspect_ratio())
            .unwrap_or(1.0)
    }
}
