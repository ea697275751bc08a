//! The generic fetch → dedup → persist → enrich pipeline.
//!
//! Every source is driven through the same machinery: proxies come from the
//! rotator per request, each unit is retried by the [`RetryPolicy`], units
//! fan out through the [`Scheduler`], and every batch lands in the store via
//! identity-keyed insert-if-absent.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::fetch::{FetchError, RetryPolicy};
use crate::pagination::{split_range, TokenPager};
use crate::proxy::{Proxy, ProxyRotator};
use crate::record::{
    collection_name, DateWindow, FieldUpdate, NewRecord, Page, RawRecord, Record, Scope,
    CONTENT_FIELD, DECODED_URL_FIELD,
};
use crate::scheduler::{Scheduler, UnitOutcome};
use crate::source::{ContentExtractor, Decoder, PageSource, Paging};
use crate::store::{RecordStore, StoreError};

/// Failure of a unit or a whole key.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A unit that was given up on, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbandonedUnit {
    pub label: String,
    pub reason: String,
}

/// Outcome of ingesting one key.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub collection: String,
    /// Units attempted (pages or chunks).
    pub units: usize,
    /// Records returned by the source.
    pub fetched: usize,
    /// Records dropped for lacking a usable locator.
    pub rejected: usize,
    /// Records that were new to the store.
    pub inserted: usize,
    pub abandoned: Vec<AbandonedUnit>,
}

impl IngestReport {
    fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            ..Default::default()
        }
    }

    /// True when no unit was abandoned.
    pub fn is_clean(&self) -> bool {
        self.abandoned.is_empty()
    }

    fn absorb(&mut self, batch: BatchOutcome) {
        self.fetched += batch.fetched;
        self.rejected += batch.rejected;
        self.inserted += batch.inserted;
    }
}

/// Outcome of one enrichment pass over a collection.
#[derive(Debug, Clone, Default)]
pub struct EnrichReport {
    pub collection: String,
    pub field: &'static str,
    /// Records lacking the field when the pass started.
    pub candidates: usize,
    /// Records that already carried the field.
    pub already_enriched: usize,
    pub updated: usize,
    /// Resolved, but with nothing to store.
    pub empty: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct BatchOutcome {
    fetched: usize,
    rejected: usize,
    inserted: usize,
}

/// Assign identities and insert whatever is new.
async fn persist(
    store: &dyn RecordStore,
    collection: &str,
    raw: Vec<RawRecord>,
) -> Result<BatchOutcome, StoreError> {
    let fetched = raw.len();
    let identified: Vec<NewRecord> = raw.into_iter().filter_map(RawRecord::identify).collect();
    let rejected = fetched - identified.len();
    if rejected > 0 {
        warn!(
            "{}: dropped {} record(s) without a usable locator",
            collection, rejected
        );
    }

    let inserted = if identified.is_empty() {
        0
    } else {
        store.insert_new(collection, identified).await?
    };

    Ok(BatchOutcome {
        fetched,
        rejected,
        inserted,
    })
}

/// Fetch one page through the retry policy, drawing a fresh proxy per attempt.
async fn fetch_with_retry(
    source: Arc<dyn PageSource>,
    proxies: &ProxyRotator,
    retry: &RetryPolicy,
    key: &str,
    scope: Scope,
    label: &str,
) -> Result<Page, FetchError> {
    retry
        .run(label, |_| {
            let source = source.clone();
            let scope = scope.clone();
            let key = key.to_string();
            let proxy = proxies.next();
            async move { source.fetch_page(&key, &scope, proxy.as_ref()).await }
        })
        .await
}

/// What an enrichment pass resolves.
#[derive(Clone)]
enum Enricher {
    Decode(Arc<dyn Decoder>),
    Extract(Arc<dyn ContentExtractor>),
}

impl Enricher {
    fn field(&self) -> &'static str {
        match self {
            Enricher::Decode(_) => DECODED_URL_FIELD,
            Enricher::Extract(_) => CONTENT_FIELD,
        }
    }

    /// Locator to resolve for a record.
    fn locator(&self, record: &Record) -> Option<String> {
        let locator = match self {
            Enricher::Decode(_) => record.url(),
            Enricher::Extract(_) => record
                .enrichment_str(DECODED_URL_FIELD)
                .or_else(|| record.url()),
        };
        locator.map(str::to_string)
    }

    /// An empty answer from a redirect service is usually a transient block.
    fn retry_empty(&self) -> bool {
        matches!(self, Enricher::Decode(_))
    }

    async fn resolve(
        &self,
        locator: &str,
        proxy: Option<&Proxy>,
    ) -> Result<Option<String>, FetchError> {
        match self {
            Enricher::Decode(decoder) => decoder.decode_one(locator, proxy).await,
            Enricher::Extract(extractor) => extractor.extract_content(locator, proxy).await,
        }
    }
}

/// Store, proxies, retry policies and schedulers bound together.
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn RecordStore>,
    proxies: ProxyRotator,
    page_retry: RetryPolicy,
    enrich_retry: RetryPolicy,
    scheduler: Scheduler,
    enrich_scheduler: Scheduler,
}

impl Pipeline {
    pub fn new(store: Arc<dyn RecordStore>, proxies: ProxyRotator) -> Self {
        Self::from_settings(store, proxies, &Settings::default())
    }

    pub fn from_settings(
        store: Arc<dyn RecordStore>,
        proxies: ProxyRotator,
        settings: &Settings,
    ) -> Self {
        Self {
            store,
            proxies,
            page_retry: settings.page_retry,
            enrich_retry: settings.enrich_retry,
            scheduler: settings.scheduler(),
            enrich_scheduler: settings.enrich_scheduler(),
        }
    }

    pub fn with_page_retry(mut self, retry: RetryPolicy) -> Self {
        self.page_retry = retry;
        self
    }

    pub fn with_enrich_retry(mut self, retry: RetryPolicy) -> Self {
        self.enrich_retry = retry;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_enrich_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.enrich_scheduler = scheduler;
        self
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn enrich_scheduler(&self) -> &Scheduler {
        &self.enrich_scheduler
    }

    /// Ingest one key with whichever paging style the source uses.
    pub async fn ingest(
        &self,
        source: Arc<dyn PageSource>,
        key: &str,
        window: Option<DateWindow>,
        limit: Option<usize>,
        chunk_days: u32,
    ) -> Result<IngestReport, PipelineError> {
        match source.paging() {
            Paging::Token => self.ingest_tokens(source, key, window, limit).await,
            Paging::Chunked => {
                let window = window.ok_or_else(|| {
                    FetchError::terminal(format!(
                        "{} is searched in date chunks and needs a start and end",
                        source.name()
                    ))
                })?;
                self.ingest_chunks(source, key, window, chunk_days).await
            }
        }
    }

    /// Walk a token listing, persisting each page as it arrives.
    ///
    /// A page that exhausts its retries ends the listing; everything before
    /// it is already stored and the abandoned page is reported.
    pub async fn ingest_tokens(
        &self,
        source: Arc<dyn PageSource>,
        key: &str,
        window: Option<DateWindow>,
        limit: Option<usize>,
    ) -> Result<IngestReport, PipelineError> {
        let collection = collection_name(source.name(), key);
        let mut report = IngestReport::new(&collection);
        let mut pager = TokenPager::new(limit);

        while let Some(cursor) = pager.next_cursor() {
            if pager.pages() > 0 && !self.scheduler.request_delay().is_zero() {
                tokio::time::sleep(self.scheduler.request_delay()).await;
            }

            let scope = Scope::Cursor { window, cursor };
            let label = format!("{} {}", collection, scope);
            report.units += 1;

            let page = match fetch_with_retry(
                source.clone(),
                &self.proxies,
                &self.page_retry,
                key,
                scope,
                &label,
            )
            .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!("{}: abandoning listing: {}", label, e);
                    report.abandoned.push(AbandonedUnit {
                        label,
                        reason: e.to_string(),
                    });
                    break;
                }
            };

            // The cursor has already advanced, so a failed write loses only this page.
            let records = pager.accept(page);
            let batch = match persist(self.store.as_ref(), &collection, records).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!("{}: write failed, page abandoned: {}", label, e);
                    report.abandoned.push(AbandonedUnit {
                        label,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            debug!(
                "{}: {} fetched, {} new (total {})",
                label,
                batch.fetched,
                batch.inserted,
                pager.collected()
            );
            report.absorb(batch);
        }

        info!(
            "{}: {} page(s), {} fetched, {} new",
            collection, report.units, report.fetched, report.inserted
        );
        Ok(report)
    }

    /// Split the window into chunks and fetch them in parallel.
    ///
    /// Each chunk is persisted as soon as it completes. A chunk that fails,
    /// including a failed write, is reported as abandoned; its siblings are
    /// unaffected.
    pub async fn ingest_chunks(
        &self,
        source: Arc<dyn PageSource>,
        key: &str,
        window: DateWindow,
        chunk_days: u32,
    ) -> Result<IngestReport, PipelineError> {
        let collection = collection_name(source.name(), key);
        let mut report = IngestReport::new(&collection);
        let chunks = split_range(window, chunk_days);
        report.units = chunks.len();
        if chunks.is_empty() {
            warn!("{}: empty date window {}", collection, window);
            return Ok(report);
        }

        let label_prefix = collection.clone();
        let work = {
            let store = self.store.clone();
            let proxies = self.proxies.clone();
            let retry = self.page_retry;
            let collection = collection.clone();
            let key = key.to_string();
            move |chunk: DateWindow| {
                let store = store.clone();
                let proxies = proxies.clone();
                let source = source.clone();
                let collection = collection.clone();
                let key = key.clone();
                async move {
                    let label = format!("{} {}", collection, chunk);
                    let page = fetch_with_retry(
                        source,
                        &proxies,
                        &retry,
                        &key,
                        Scope::Chunk(chunk),
                        &label,
                    )
                    .await?;
                    let batch = persist(store.as_ref(), &collection, page.records).await?;
                    info!(
                        "{}: {} fetched, {} new",
                        label, batch.fetched, batch.inserted
                    );
                    Ok::<_, PipelineError>(batch)
                }
            }
        };

        let reports = self
            .scheduler
            .run(
                chunks,
                move |chunk: &DateWindow| format!("{} {}", label_prefix, chunk),
                work,
            )
            .await;

        for unit in reports {
            match unit.outcome {
                UnitOutcome::Done(batch) => report.absorb(batch),
                UnitOutcome::Failed(e) => report.abandoned.push(AbandonedUnit {
                    label: unit.label,
                    reason: e.to_string(),
                }),
                UnitOutcome::Panicked(msg) => report.abandoned.push(AbandonedUnit {
                    label: unit.label,
                    reason: format!("panicked: {}", msg),
                }),
            }
        }

        info!(
            "{}: {} chunk(s), {} fetched, {} new, {} abandoned",
            collection,
            report.units,
            report.fetched,
            report.inserted,
            report.abandoned.len()
        );
        Ok(report)
    }

    /// Resolve redirect links for records lacking `decoded_url`.
    pub async fn decode_pass(
        &self,
        decoder: Arc<dyn Decoder>,
        collection: &str,
    ) -> Result<EnrichReport, PipelineError> {
        self.enrich(Enricher::Decode(decoder), collection).await
    }

    /// Extract full text for records lacking `content`.
    pub async fn extract_pass(
        &self,
        extractor: Arc<dyn ContentExtractor>,
        collection: &str,
    ) -> Result<EnrichReport, PipelineError> {
        self.enrich(Enricher::Extract(extractor), collection).await
    }

    async fn enrich(
        &self,
        enricher: Enricher,
        collection: &str,
    ) -> Result<EnrichReport, PipelineError> {
        let field = enricher.field();
        let records = self.store.get_records(collection).await?;

        let mut report = EnrichReport {
            collection: collection.to_string(),
            field,
            ..Default::default()
        };

        let mut units = Vec::new();
        for record in &records {
            if record.has_enrichment(field) {
                report.already_enriched += 1;
                continue;
            }
            match enricher.locator(record) {
                Some(locator) => units.push((record.identity.clone(), locator)),
                None => debug!("{}: record {} has no locator", collection, record.identity),
            }
        }
        report.candidates = units.len();
        if units.is_empty() {
            debug!("{}: nothing to enrich for {}", collection, field);
            return Ok(report);
        }
        info!(
            "{}: enriching {} record(s) with {}",
            collection,
            units.len(),
            field
        );

        let work = {
            let store = self.store.clone();
            let proxies = self.proxies.clone();
            let retry = self.enrich_retry;
            let collection = collection.to_string();
            move |(identity, locator): (String, String)| {
                let store = store.clone();
                let proxies = proxies.clone();
                let enricher = enricher.clone();
                let collection = collection.clone();
                async move {
                    let label = format!("{} {} {}", collection, field, short_id(&identity));
                    let value = retry
                        .run(&label, |_| {
                            let enricher = enricher.clone();
                            let locator = locator.clone();
                            let proxy = proxies.next();
                            async move {
                                match enricher.resolve(&locator, proxy.as_ref()).await? {
                                    Some(value) => Ok(Some(value)),
                                    None if enricher.retry_empty() => {
                                        Err(FetchError::transient(format!("no result for {}", locator)))
                                    }
                                    None => Ok(None),
                                }
                            }
                        })
                        .await?;

                    let Some(value) = value else {
                        return Ok::<_, PipelineError>(false);
                    };
                    let touched = store
                        .update_fields(&collection, vec![FieldUpdate::single(identity, field, value)])
                        .await?;
                    Ok(touched > 0)
                }
            }
        };

        let reports = self
            .enrich_scheduler
            .run(units, |(identity, _)| short_id(identity).to_string(), work)
            .await;

        for unit in reports {
            match unit.outcome {
                UnitOutcome::Done(true) => report.updated += 1,
                UnitOutcome::Done(false) => report.empty += 1,
                UnitOutcome::Failed(_) | UnitOutcome::Panicked(_) => report.failed += 1,
            }
        }

        info!(
            "{}: {} updated, {} empty, {} failed ({} already had {})",
            collection, report.updated, report.empty, report.failed, report.already_enriched, field
        );
        Ok(report)
    }
}

fn short_id(identity: &str) -> &str {
    identity.get(..12).unwrap_or(identity)
}
