//! YouTube Data API v3 video search.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{path_str, PageSource, Paging};
use crate::config::YoutubeConfig;
use crate::fetch::FetchError;
use crate::http::HttpClient;
use crate::proxy::Proxy;
use crate::record::{DateWindow, Page, RawRecord, Scope};

/// Token-paginated `search.list` over videos matching a keyword.
pub struct YoutubeSource {
    http: HttpClient,
    api_key: String,
    config: YoutubeConfig,
}

impl YoutubeSource {
    pub fn new(http: HttpClient, api_key: String, config: YoutubeConfig) -> Self {
        Self {
            http,
            api_key,
            config,
        }
    }

    fn query(&self, key: &str, window: Option<DateWindow>, cursor: Option<&str>) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("part", "snippet".to_string()),
            ("q", key.to_string()),
            ("type", "video".to_string()),
            ("maxResults", self.config.page_size.clamp(1, 50).to_string()),
            ("key", self.api_key.clone()),
        ];
        if let Some(token) = cursor {
            query.push(("pageToken", token.to_string()));
        }
        if let Some(window) = window {
            query.push(("publishedAfter", format!("{}T00:00:00Z", window.start)));
            query.push(("publishedBefore", format!("{}T00:00:00Z", window.end)));
        }
        if let Some(region) = &self.config.region_code {
            query.push(("regionCode", region.clone()));
        }
        if let Some(lang) = &self.config.relevance_language {
            query.push(("relevanceLanguage", lang.clone()));
        }
        query
    }
}

#[async_trait]
impl PageSource for YoutubeSource {
    fn name(&self) -> &str {
        "youtube"
    }

    fn paging(&self) -> Paging {
        Paging::Token
    }

    async fn fetch_page(
        &self,
        key: &str,
        scope: &Scope,
        proxy: Option<&Proxy>,
    ) -> Result<Page, FetchError> {
        let (window, cursor) = match scope {
            Scope::Cursor { window, cursor } => (*window, cursor.as_deref()),
            Scope::Chunk(window) => (Some(*window), None),
        };
        let url = format!("{}/search", self.config.base_url.trim_end_matches('/'));
        let body = self
            .http
            .get_json(&url, &self.query(key, window, cursor), proxy)
            .await?;
        Ok(parse_search_response(&body))
    }
}

/// Turn a `search.list` response into a page of video records.
///
/// The locator is the short `youtu.be/{id}` link: the watch URL carries the
/// id in its query string, which canonicalization strips.
pub fn parse_search_response(body: &Value) -> Page {
    let records = body
        .get("items")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(video_record).collect())
        .unwrap_or_default();

    Page {
        records,
        next: path_str(body, "nextPageToken").map(str::to_string),
    }
}

fn video_record(item: &Value) -> Option<RawRecord> {
    let video_id = path_str(item, "id.videoId")?;
    let payload = json!({
        "video_id": video_id,
        "url": format!("https://www.youtube.com/watch?v={}", video_id),
        "title": path_str(item, "snippet.title"),
        "description": path_str(item, "snippet.description"),
        "channel_id": path_str(item, "snippet.channelId"),
        "channel_title": path_str(item, "snippet.channelTitle"),
        "published_at": path_str(item, "snippet.publishedAt"),
    });
    Some(RawRecord::new(format!("https://youtu.be/{}", video_id), payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_items_and_next_token() {
        let body = json!({
            "nextPageToken": "CAUQAA",
            "items": [
                {"id": {"kind": "youtube#video", "videoId": "abc123"},
                 "snippet": {"title": "Noticias", "channelTitle": "Canal", "publishedAt": "2024-03-01T10:00:00Z"}},
                {"id": {"kind": "youtube#channel", "channelId": "UCxyz"}},
                {"id": {"kind": "youtube#video", "videoId": "def456"}, "snippet": {}}
            ]
        });

        let page = parse_search_response(&body);
        assert_eq!(page.next.as_deref(), Some("CAUQAA"));
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].locator.as_deref(), Some("https://youtu.be/abc123"));
        assert_eq!(page.records[0].payload["title"], "Noticias");
        assert_eq!(
            page.records[0].payload["url"],
            "https://www.youtube.com/watch?v=abc123"
        );
    }

    #[test]
    fn last_page_has_no_token() {
        let page = parse_search_response(&json!({"items": []}));
        assert!(page.records.is_empty());
        assert!(page.next.is_none());
    }

    #[test]
    fn distinct_videos_get_distinct_identities() {
        let body = json!({"items": [
            {"id": {"videoId": "a"}}, {"id": {"videoId": "b"}}
        ]});
        let ids: Vec<_> = parse_search_response(&body)
            .records
            .into_iter()
            .filter_map(|r| r.identify())
            .map(|r| r.identity)
            .collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }
}
