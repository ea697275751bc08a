//! Pagination drivers.
//!
//! Two cursor styles appear across sources:
//! - token listings, where each page names the next one and the chain is
//!   inherently sequential;
//! - time-chunked searches, where `[start, end)` is split up front into
//!   independent sub-ranges that can all be fetched in parallel.

use std::future::Future;

use chrono::Duration as ChronoDuration;
use tracing::debug;

use crate::fetch::FetchError;
use crate::record::{DateWindow, Page, RawRecord};

/// State of a token-based listing.
///
/// Callers ask for the next cursor, fetch it however they like (usually via
/// a `RetryPolicy`), then hand the page back with [`TokenPager::accept`].
#[derive(Debug, Clone)]
pub struct TokenPager {
    cursor: Option<String>,
    limit: Option<usize>,
    collected: usize,
    pages: usize,
    done: bool,
}

impl TokenPager {
    /// `limit` caps the total number of records; `None` means no cap.
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            cursor: None,
            limit,
            collected: 0,
            pages: 0,
            done: matches!(limit, Some(0)),
        }
    }

    /// Cursor for the next fetch, or `None` once the listing is finished.
    ///
    /// The outer option is "is there another page"; the inner one is the
    /// token (`None` for the first page).
    pub fn next_cursor(&self) -> Option<Option<String>> {
        if self.done {
            None
        } else {
            Some(self.cursor.clone())
        }
    }

    /// Record a fetched page and return the records that fit under the limit.
    pub fn accept(&mut self, page: Page) -> Vec<RawRecord> {
        self.pages += 1;
        let mut records = page.records;

        if let Some(limit) = self.limit {
            let room = limit.saturating_sub(self.collected);
            records.truncate(room);
        }
        self.collected += records.len();

        let limit_reached = self.limit.is_some_and(|l| self.collected >= l);
        if records.is_empty() || limit_reached {
            self.done = true;
        }
        match page.next {
            Some(next) if !next.is_empty() => self.cursor = Some(next),
            _ => self.done = true,
        }

        records
    }

    pub fn collected(&self) -> usize {
        self.collected
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

/// Drive a token listing to completion and collect every record.
///
/// A failed page fetch aborts the listing with that error.
pub async fn drive_tokens<F, Fut>(limit: Option<usize>, mut fetch: F) -> Result<Vec<RawRecord>, FetchError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page, FetchError>>,
{
    let mut pager = TokenPager::new(limit);
    let mut all = Vec::new();

    while let Some(cursor) = pager.next_cursor() {
        let page = fetch(cursor).await?;
        all.extend(pager.accept(page));
        debug!(
            "Fetched page {} ({} records so far)",
            pager.pages(),
            pager.collected()
        );
    }

    Ok(all)
}

/// Split `[start, end)` into consecutive chunks of `chunk_days`.
///
/// The last chunk may be shorter. A zero chunk size is treated as one day.
pub fn split_range(window: DateWindow, chunk_days: u32) -> Vec<DateWindow> {
    let step = ChronoDuration::days(i64::from(chunk_days.max(1)));
    let mut chunks = Vec::new();
    let mut current = window.start;

    while current < window.end {
        let next = (current + step).min(window.end);
        chunks.push(DateWindow::new(current, next));
        current = next;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn records(n: usize, page: usize) -> Vec<RawRecord> {
        (0..n)
            .map(|i| RawRecord::new(format!("https://example.com/{}/{}", page, i), json!({})))
            .collect()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn token_listing_stops_when_next_is_absent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let all = drive_tokens(None, move |cursor| {
            let c = c.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                match (n, cursor.as_deref()) {
                    (0, None) => Ok(Page::with_next(records(100, 0), "p2")),
                    (1, Some("p2")) => Ok(Page::with_next(records(100, 1), "p3")),
                    (2, Some("p3")) => Ok(Page::last(records(47, 2))),
                    _ => panic!("unexpected fetch {} with {:?}", n, cursor),
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(all.len(), 247);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn token_listing_respects_limit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let all = drive_tokens(Some(150), move |_| {
            let c = c.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                Ok(Page::with_next(records(100, n), format!("p{}", n + 1)))
            }
        })
        .await
        .unwrap();

        assert_eq!(all.len(), 150);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_page_ends_listing() {
        let all = drive_tokens(None, |_| async { Ok(Page::with_next(Vec::new(), "more")) })
            .await
            .unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn page_error_propagates() {
        let result = drive_tokens(None, |cursor| async move {
            match cursor {
                None => Ok(Page::with_next(records(10, 0), "p2")),
                Some(_) => Err(FetchError::Exhausted {
                    attempts: 5,
                    last: "503".into(),
                }),
            }
        })
        .await;
        assert!(result.unwrap_err().is_exhausted());
    }

    #[test]
    fn zero_limit_fetches_nothing() {
        let pager = TokenPager::new(Some(0));
        assert!(pager.next_cursor().is_none());
    }

    #[test]
    fn ninety_five_days_in_ten_day_chunks() {
        let start = date(2020, 1, 1);
        let end = start + ChronoDuration::days(95);
        let chunks = split_range(DateWindow::new(start, end), 10);

        assert_eq!(chunks.len(), 10);
        assert_eq!(chunks[0].start, start);
        assert_eq!(chunks.last().unwrap().end, end);
        assert_eq!(chunks.last().unwrap().days(), 5);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end, pair[1].start, "gap or overlap");
        }
        assert!(chunks[..9].iter().all(|c| c.days() == 10));
    }

    #[test]
    fn empty_or_inverted_window_has_no_chunks() {
        let d = date(2021, 6, 1);
        assert!(split_range(DateWindow::new(d, d), 10).is_empty());
        assert!(split_range(DateWindow::new(d, date(2021, 5, 1)), 10).is_empty());
    }

    #[test]
    fn zero_chunk_size_is_one_day() {
        let chunks = split_range(DateWindow::new(date(2022, 1, 1), date(2022, 1, 4)), 0);
        assert_eq!(chunks.len(), 3);
    }
}
