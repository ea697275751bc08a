//! MediaCloud online-news search (`story-list`).

use async_trait::async_trait;
use serde_json::Value;

use super::{path_str, PageSource, Paging};
use crate::config::MediaCloudConfig;
use crate::fetch::FetchError;
use crate::http::HttpClient;
use crate::proxy::Proxy;
use crate::record::{DateWindow, Page, RawRecord, Scope};

pub struct MediaCloudSource {
    http: HttpClient,
    api_key: String,
    config: MediaCloudConfig,
}

impl MediaCloudSource {
    pub fn new(http: HttpClient, api_key: String, config: MediaCloudConfig) -> Self {
        Self {
            http,
            api_key,
            config,
        }
    }

    fn query(&self, key: &str, window: DateWindow, cursor: Option<&str>) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("q", key.to_string()),
            ("start", window.start.to_string()),
            ("end", window.end.to_string()),
            ("platform", self.config.platform.clone()),
        ];
        if !self.config.collection_ids.is_empty() {
            let ids: Vec<String> = self
                .config
                .collection_ids
                .iter()
                .map(u64::to_string)
                .collect();
            query.push(("cs", ids.join(",")));
        }
        if let Some(token) = cursor {
            query.push(("pagination_token", token.to_string()));
        }
        query
    }
}

#[async_trait]
impl PageSource for MediaCloudSource {
    fn name(&self) -> &str {
        "mediacloud"
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
        let window = window
            .ok_or_else(|| FetchError::terminal("MediaCloud search needs a date window"))?;

        let url = format!("{}/story-list", self.config.base_url.trim_end_matches('/'));
        let body = self
            .http
            .get_json_authorized(
                &url,
                &self.query(key, window, cursor),
                &format!("Token {}", self.api_key),
                proxy,
            )
            .await?;
        Ok(parse_story_list(&body))
    }
}

/// Turn a `story-list` response into a page; stories without a URL are kept
/// so the pipeline can count and drop them.
pub fn parse_story_list(body: &Value) -> Page {
    let records = body
        .get("stories")
        .and_then(Value::as_array)
        .map(|stories| {
            stories
                .iter()
                .map(|story| RawRecord {
                    locator: path_str(story, "url").map(str::to_string),
                    payload: story.clone(),
                })
                .collect()
        })
        .unwrap_or_default();

    Page {
        records,
        next: path_str(body, "pagination_token").map(str::to_string),
    }
}
