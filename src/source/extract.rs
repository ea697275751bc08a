//! Full-text extraction from article HTML.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::ContentExtractor;
use crate::fetch::FetchError;
use crate::http::HttpClient;
use crate::proxy::Proxy;

/// Paragraphs shorter than this are usually bylines, captions or share links.
const MIN_PARAGRAPH_CHARS: usize = 40;

pub struct HtmlExtractor {
    http: HttpClient,
}

impl HtmlExtractor {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ContentExtractor for HtmlExtractor {
    async fn extract_content(
        &self,
        locator: &str,
        proxy: Option<&Proxy>,
    ) -> Result<Option<String>, FetchError> {
        let html = self.http.get_text(locator, &[], proxy).await?;
        Ok(extract_text(&html))
    }
}

/// Runs of whitespace collapsed to a single space.
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

fn element_text(el: ElementRef<'_>) -> String {
    let joined: String = el.text().collect::<Vec<_>>().join(" ");
    WHITESPACE.replace_all(joined.trim(), " ").into_owned()
}

/// Main text of an HTML document, or `None` if nothing article-like is found.
///
/// Prefers paragraphs inside `<article>`; falls back to every paragraph on
/// the page. Short fragments are dropped.
pub fn extract_text(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let scoped = Selector::parse("article p").ok()?;
    let anywhere = Selector::parse("p").ok()?;

    let mut paragraphs: Vec<String> = document
        .select(&scoped)
        .map(element_text)
        .filter(|p| p.chars().count() >= MIN_PARAGRAPH_CHARS)
        .collect();
    if paragraphs.is_empty() {
        paragraphs = document
            .select(&anywhere)
            .map(element_text)
            .filter(|p| p.chars().count() >= MIN_PARAGRAPH_CHARS)
            .collect();
    }

    if paragraphs.is_empty() {
        None
    } else {
        Some(paragraphs.join("\n\n"))
    }
}
