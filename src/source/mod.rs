//! Source adapters.
//!
//! Each external service plugs into the pipeline through one of three narrow
//! traits. Adapters know the wire format; everything else (retries, proxies,
//! dedup, persistence) lives in the pipeline.

mod extract;
mod gnews;
mod mediacloud;
mod redirect;
mod youtube;
mod youtube_comments;

pub use extract::HtmlExtractor;
pub use gnews::GoogleNewsSource;
pub use mediacloud::MediaCloudSource;
pub use redirect::RedirectDecoder;
pub use youtube::YoutubeSource;
pub use youtube_comments::YoutubeCommentsSource;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{SourceKind, SourcesConfig};
use crate::fetch::FetchError;
use crate::http::HttpClient;
use crate::proxy::Proxy;
use crate::record::{Page, Scope};

/// How a source walks its result space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paging {
    /// Each page names the next; inherently sequential.
    Token,
    /// Independent date chunks fetched in parallel.
    Chunked,
}

/// A paginated search endpoint.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Prefix for collection names (`{name}_{key}`).
    fn name(&self) -> &str;

    fn paging(&self) -> Paging;

    /// Fetch one page for `key` within `scope`.
    async fn fetch_page(
        &self,
        key: &str,
        scope: &Scope,
        proxy: Option<&Proxy>,
    ) -> Result<Page, FetchError>;
}

/// Resolves an intermediate (redirect) locator into its real target.
#[async_trait]
pub trait Decoder: Send + Sync {
    /// `Ok(None)` means the service answered but produced no target.
    async fn decode_one(
        &self,
        locator: &str,
        proxy: Option<&Proxy>,
    ) -> Result<Option<String>, FetchError>;
}

/// Pulls the main text out of a document.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// `Ok(None)` means the document had no extractable text.
    async fn extract_content(
        &self,
        locator: &str,
        proxy: Option<&Proxy>,
    ) -> Result<Option<String>, FetchError>;
}

/// Build the adapter for a configured source kind.
pub fn page_source(
    kind: SourceKind,
    config: &SourcesConfig,
    http: HttpClient,
) -> Result<Arc<dyn PageSource>, FetchError> {
    let source: Arc<dyn PageSource> = match kind {
        SourceKind::Youtube => Arc::new(YoutubeSource::new(
            http,
            youtube_key(config)?,
            config.youtube.clone(),
        )),
        SourceKind::YoutubeComments => Arc::new(YoutubeCommentsSource::new(
            http,
            youtube_key(config)?,
            config.youtube.clone(),
        )),
        SourceKind::Mediacloud => {
            let api_key = config.mediacloud.api_key.clone().ok_or_else(|| {
                FetchError::terminal("MediaCloud API key not configured (MEDIA_CLOUD_API_KEY)")
            })?;
            Arc::new(MediaCloudSource::new(http, api_key, config.mediacloud.clone()))
        }
        SourceKind::Gnews => Arc::new(GoogleNewsSource::new(http, config.gnews.clone())),
    };
    Ok(source)
}

fn youtube_key(config: &SourcesConfig) -> Result<String, FetchError> {
    config
        .youtube
        .api_key
        .clone()
        .ok_or_else(|| FetchError::terminal("YouTube API key not configured (YOUTUBE_API_KEY)"))
}

/// Extract a value from nested JSON using dot-notation path.
pub fn extract_path<'a>(data: &'a Value, path: &str) -> &'a Value {
    if path.is_empty() {
        return data;
    }

    let mut current = data;
    for key in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(key).unwrap_or(&Value::Null),
            Value::Array(arr) => match key.parse::<usize>() {
                Ok(idx) => arr.get(idx).unwrap_or(&Value::Null),
                Err(_) => &Value::Null,
            },
            _ => &Value::Null,
        };
    }

    current
}

/// String at `path`, if present and non-empty.
pub fn path_str<'a>(data: &'a Value, path: &str) -> Option<&'a str> {
    extract_path(data, path)
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
