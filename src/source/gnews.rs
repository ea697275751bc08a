//! Google News RSS search over one date chunk.
//!
//! The feed carries at most ~100 items per query and has no continuation,
//! so ranges are split into chunks and each chunk is a single page.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::{PageSource, Paging};
use crate::config::GnewsConfig;
use crate::fetch::FetchError;
use crate::http::HttpClient;
use crate::proxy::Proxy;
use crate::record::{DateWindow, Page, RawRecord, Scope};

pub struct GoogleNewsSource {
    http: HttpClient,
    config: GnewsConfig,
}

impl GoogleNewsSource {
    pub fn new(http: HttpClient, config: GnewsConfig) -> Self {
        Self { http, config }
    }

    fn query(&self, key: &str, window: Option<DateWindow>) -> Vec<(&'static str, String)> {
        let q = match window {
            Some(w) => format!("{} after:{} before:{}", key, w.start, w.end),
            None => key.to_string(),
        };
        vec![
            ("q", q),
            ("hl", self.config.language.clone()),
            ("gl", self.config.country.clone()),
            (
                "ceid",
                format!("{}:{}", self.config.country, self.config.language),
            ),
        ]
    }
}

#[async_trait]
impl PageSource for GoogleNewsSource {
    fn name(&self) -> &str {
        "gnews"
    }

    fn paging(&self) -> Paging {
        Paging::Chunked
    }

    async fn fetch_page(
        &self,
        key: &str,
        scope: &Scope,
        proxy: Option<&Proxy>,
    ) -> Result<Page, FetchError> {
        let window = match scope {
            Scope::Chunk(window) => Some(*window),
            Scope::Cursor { window, .. } => *window,
        };
        let xml = self
            .http
            .get_text(&self.config.base_url, &self.query(key, window), proxy)
            .await?;
        let records = parse_feed(&xml)?;
        debug!("gnews '{}' {:?}: {} items", key, window, records.len());
        Ok(Page::last(records))
    }
}

/// Map every feed entry to a raw record.
///
/// An unparseable body is usually a consent or rate-limit page, so it is
/// reported as transient and the chunk is retried on another proxy.
pub fn parse_feed(xml: &str) -> Result<Vec<RawRecord>, FetchError> {
    let feed = feed_rs::parser::parse(xml.as_bytes())
        .map_err(|e| FetchError::transient(format!("Unreadable news feed: {}", e)))?;

    let records = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry.links.first().map(|l| l.href.clone());
            let title = entry.title.map(|t| t.content);
            let payload = json!({
                "publisher": title.as_deref().and_then(publisher),
                "title": title,
                "url": link,
                "published_date": entry.published.or(entry.updated).map(|d| d.to_rfc3339()),
                "description": entry.summary.map(|t| t.content),
                "publisher_url": entry.source,
            });
            RawRecord {
                locator: link,
                payload,
            }
        })
        .collect();

    Ok(records)
}

/// Google News appends the outlet to each headline as `" - Outlet"`.
fn publisher(title: &str) -> Option<String> {
    let (_, outlet) = title.rsplit_once(" - ")?;
    let outlet = outlet.trim();
    (!outlet.is_empty()).then(|| outlet.to_string())
}
