//! Backends that feed the gallery: a local directory, user-configured remote
//! JSON feeds and the scrolller aggregator.

pub mod local;
pub mod probe;
pub mod remote;
pub mod scrolller;

use std::time::Duration;

use once_cell::sync::Lazy;
use tracing::warn;

pub use local::{LocalLibrary, LocalSource, ScanConfig, LOCAL_FEED_NAME};
pub use probe::DimensionProbe;
pub use remote::{RemoteFeeds, RemoteSource, REMOTE_FEED_NAME};
pub use scrolller::{ScrolllerSource, SCROLLLER_FEED_NAME};

const USER_AGENT: &str = concat!("feedwall/", env!("CARGO_PKG_VERSION"));

/// Client shared by every HTTP backend.
pub static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
});
