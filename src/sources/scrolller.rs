//! Scrolller aggregator lane: a paginated GraphQL feed of subreddit posts.

use std::rc::Rc;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE, ORIGIN};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::feed::{Feed, FeedFactory, FetchError, Page, PageSource, PaginatedFeed};
use crate::models::{Dimensions, Filter, ItemSource, MediaItem, MediaKind, SrcVariant};
use crate::sources::HTTP_CLIENT;

pub const SCROLLLER_FEED_NAME: &str = "scrolller";
pub const SCROLLLER_ENDPOINT: &str = "https://api.scrolller.com/api/v2/graphql";
const PAGE_LIMIT: u32 = 30;

const DISCOVER_QUERY: &str = "query DiscoverFilteredSubredditsQuery($filter: MediaFilter $limit: Int $iterator: String $hostsDown: [HostDisk] $includeFilters: [Int] $excludeFilters: [Int] $isNsfw: Boolean) { \
discoverFilteredSubreddits(isNsfw: $isNsfw filter: $filter limit: $limit iterator: $iterator includeFilters: $includeFilters excludeFilters: $excludeFilters) { \
iterator items { __typename id url title \
children(limit: 2 iterator: null filter: VIDEO disabledHosts: $hostsDown) { \
iterator items { __typename id url title subredditTitle isNsfw hasAudio mediaSources { url width height isOptimized } } } } } }";

#[derive(Debug, Deserialize)]
pub struct GraphqlResponse {
    #[serde(default)]
    pub data: Option<ResponseData>,
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
pub struct GraphqlError {
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseData {
    pub discover_filtered_subreddits: Discover,
}

#[derive(Debug, Deserialize)]
pub struct Discover {
    #[serde(default)]
    pub iterator: Option<String>,
    #[serde(default)]
    pub items: Vec<Subreddit>,
}

#[derive(Debug, Deserialize)]
pub struct Subreddit {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub children: Option<Children>,
}

#[derive(Debug, Deserialize)]
pub struct Children {
    #[serde(default)]
    pub items: Vec<SubredditPost>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubredditPost {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub subreddit_title: Option<String>,
    #[serde(default)]
    pub media_sources: Vec<MediaSource>,
}

#[derive(Debug, Deserialize)]
pub struct MediaSource {
    pub url: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

/// Picks the first source that is neither a still nor the unoptimized mp4,
/// else the first one.
fn preferred_source(sources: &[MediaSource]) -> Option<&MediaSource> {
    sources
        .iter()
        .find(|s| !(s.url.contains(".jpg") || s.url.contains(".mp4")))
        .or_else(|| sources.first())
}

fn post_to_item(post: SubredditPost, subreddit: &str) -> Option<MediaItem> {
    let Some(source) = preferred_source(&post.media_sources) else {
        warn!(post = post.id, "Skipping post without media sources");
        return None;
    };
    let dimensions = (source.width > 0 && source.height > 0)
        .then(|| Dimensions::new(source.width, source.height));
    Some(MediaItem {
        name: post.id.to_string(),
        kind: MediaKind::Video,
        src_variants: vec![SrcVariant {
            url: source.url.clone(),
            dimensions,
        }],
        dimensions,
        source: ItemSource::Aggregator {
            post_id: post.id,
            subreddit: post.subreddit_title.unwrap_or_else(|| subreddit.to_string()),
            title: post.title.unwrap_or_default(),
        },
    })
}

/// Flattens every subreddit's posts into one page.
pub fn page_from_response(response: GraphqlResponse) -> Result<Page, FetchError> {
    let Some(data) = response.data else {
        let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
        return Err(FetchError::Decode(if messages.is_empty() {
            "response carried no data".to_string()
        } else {
            messages.join("; ")
        }));
    };
    let discover = data.discover_filtered_subreddits;
    let mut items = Vec::new();
    for subreddit in discover.items {
        let title = subreddit.title.unwrap_or_default();
        let posts = subreddit.children.map(|c| c.items).unwrap_or_default();
        items.extend(posts.into_iter().filter_map(|post| post_to_item(post, &title)));
    }
    Ok(Page {
        next_token: discover.iterator.filter(|t| !t.is_empty()),
        items,
    })
}

pub struct ScrolllerSource {
    endpoint: String,
    client: reqwest::Client,
    is_nsfw: bool,
}

impl Default for ScrolllerSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrolllerSource {
    pub fn new() -> Self {
        Self::with_endpoint(SCROLLLER_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: HTTP_CLIENT.clone(),
            is_nsfw: false,
        }
    }

    pub fn request_body(&self, token: &str) -> Value {
        let iterator = (!token.is_empty()).then_some(token);
        json!({
            "query": DISCOVER_QUERY,
            "variables": {
                "limit": PAGE_LIMIT,
                "iterator": iterator,
                "filter": "VIDEO",
                "isNsfw": self.is_nsfw,
                "hostsDown": null,
                "includeFilters": [],
                "excludeFilters": []
            },
            "authorization": null
        })
    }

    pub fn factory() -> FeedFactory {
        Rc::new(|filter: &Filter| -> Rc<dyn Feed> {
            PaginatedFeed::new(SCROLLLER_FEED_NAME, filter.clone(), 1.0, ScrolllerSource::new())
        })
    }
}

#[async_trait(?Send)]
impl PageSource for ScrolllerSource {
    fn name(&self) -> &str {
        SCROLLLER_FEED_NAME
    }

    async fn fetch_page(&self, token: &str) -> Result<Page, FetchError> {
        debug!(token, "Requesting scrolller page");
        let body = serde_json::to_vec(&self.request_body(token))
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        let response = self
            .client
            .post(self.endpoint.as_str())
            .header(ACCEPT, HeaderValue::from_static("*/*"))
            .header(CONTENT_TYPE, HeaderValue::from_static("text/plain;charset=UTF-8"))
            .header(ORIGIN, HeaderValue::from_static("https://www.scrolller.com"))
            .body(body)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let decoded: GraphqlResponse =
            serde_json::from_slice(&response).map_err(|e| FetchError::Decode(e.to_string()))?;
        page_from_response(decoded)
    }
}
