//! YouTube comment threads for one video.
//!
//! Keys are video ids. Each top-level thread becomes one record whose
//! locator is the thread id, so re-listing a video only adds new threads.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{extract_path, path_str, PageSource, Paging};
use crate::config::YoutubeConfig;
use crate::fetch::FetchError;
use crate::http::HttpClient;
use crate::proxy::Proxy;
use crate::record::{Page, RawRecord, Scope};

/// Token-paginated `commentThreads.list`.
pub struct YoutubeCommentsSource {
    http: HttpClient,
    api_key: String,
    config: YoutubeConfig,
}

impl YoutubeCommentsSource {
    pub fn new(http: HttpClient, api_key: String, config: YoutubeConfig) -> Self {
        Self {
            http,
            api_key,
            config,
        }
    }

    fn query(&self, video_id: &str, cursor: Option<&str>) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("part", "snippet".to_string()),
            ("videoId", video_id.trim().to_string()),
            (
                "maxResults",
                self.config.comments_page_size.clamp(1, 100).to_string(),
            ),
            ("textFormat", "plainText".to_string()),
            ("key", self.api_key.clone()),
        ];
        if let Some(token) = cursor {
            query.push(("pageToken", token.to_string()));
        }
        query
    }
}

#[async_trait]
impl PageSource for YoutubeCommentsSource {
    fn name(&self) -> &str {
        "youtube_comments"
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
        // Threads are listed whole; a date window does not narrow them.
        let cursor = match scope {
            Scope::Cursor { cursor, .. } => cursor.as_deref(),
            Scope::Chunk(_) => None,
        };
        let url = format!(
            "{}/commentThreads",
            self.config.base_url.trim_end_matches('/')
        );
        let body = self
            .http
            .get_json(&url, &self.query(key, cursor), proxy)
            .await?;
        Ok(parse_comment_threads(&body))
    }
}

pub fn parse_comment_threads(body: &Value) -> Page {
    let records = body
        .get("items")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(thread_record).collect())
        .unwrap_or_default();

    Page {
        records,
        next: path_str(body, "nextPageToken").map(str::to_string),
    }
}

fn thread_record(item: &Value) -> Option<RawRecord> {
    let thread_id = path_str(item, "id")?;
    let comment = |field: &str| {
        let path = format!("snippet.topLevelComment.snippet.{}", field);
        extract_path(item, &path).clone()
    };
    let payload = json!({
        "comment_id": thread_id,
        "video_id": path_str(item, "snippet.videoId"),
        "author": comment("authorDisplayName"),
        "author_channel_id": comment("authorChannelId.value"),
        "text": comment("textDisplay"),
        "like_count": comment("likeCount"),
        "reply_count": extract_path(item, "snippet.totalReplyCount"),
        "published_at": comment("publishedAt"),
        "updated_at": comment("updatedAt"),
    });
    Some(RawRecord::new(thread_id, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body() -> Value {
        json!({
            "nextPageToken": "QURTSl9p",
            "pageInfo": {"totalResults": 2, "resultsPerPage": 100},
            "items": [
                {
                    "id": "UgzA1b2C3",
                    "snippet": {
                        "videoId": "abc123",
                        "totalReplyCount": 4,
                        "topLevelComment": {"snippet": {
                            "authorDisplayName": "@vecina",
                            "authorChannelId": {"value": "UCvec"},
                            "textDisplay": "Se inundó la colonia otra vez",
                            "likeCount": 12,
                            "publishedAt": "2024-03-02T15:04:05Z"
                        }}
                    }
                },
                {"snippet": {"videoId": "abc123"}},
                {"id": "UgzD4e5F6", "snippet": {"videoId": "abc123", "topLevelComment": {"snippet": {}}}}
            ]
        })
    }

    #[test]
    fn threads_become_records_keyed_by_thread_id() {
        let page = parse_comment_threads(&body());
        assert_eq!(page.next.as_deref(), Some("QURTSl9p"));
        assert_eq!(page.records.len(), 2);

        let first = &page.records[0];
        assert_eq!(first.locator.as_deref(), Some("UgzA1b2C3"));
        assert_eq!(first.payload["video_id"], "abc123");
        assert_eq!(first.payload["author"], "@vecina");
        assert_eq!(first.payload["author_channel_id"], "UCvec");
        assert_eq!(first.payload["text"], "Se inundó la colonia otra vez");
        assert_eq!(first.payload["like_count"], 12);
        assert_eq!(first.payload["reply_count"], 4);

        assert!(page.records[1].payload["text"].is_null());
    }

    #[test]
    fn thread_ids_are_usable_identities() {
        let ids: Vec<_> = parse_comment_threads(&body())
            .records
            .into_iter()
            .filter_map(|r| r.identify())
            .map(|r| r.identity)
            .collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn query_caps_page_size_and_carries_cursor() {
        let http = HttpClient::new(crate::http::DEFAULT_TIMEOUT, None).unwrap();
        let config = YoutubeConfig {
            comments_page_size: 500,
            ..YoutubeConfig::default()
        };
        let source = YoutubeCommentsSource::new(http, "k".to_string(), config);

        let query = source.query(" abc123 ", Some("QURTSl9p"));
        let get = |name: &str| {
            query
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("videoId"), Some("abc123"));
        assert_eq!(get("maxResults"), Some("100"));
        assert_eq!(get("textFormat"), Some("plainText"));
        assert_eq!(get("pageToken"), Some("QURTSl9p"));
        assert_eq!(source.query("abc123", None).len(), 5);
    }
}
