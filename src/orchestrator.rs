//! Task orchestrator.
//!
//! Walks the keys of a job one at a time: skip keys whose collection is
//! already complete, ingest the rest, then run the configured enrichment
//! passes. A failing key is logged and recorded; the loop always moves on.
//! Emits events for progress tracking and leaves presentation to the caller.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::{ConfigError, EnrichPass, JobConfig};
use crate::pipeline::{EnrichReport, Pipeline, PipelineError};
use crate::record::{collection_name, DateWindow};
use crate::source::{ContentExtractor, Decoder, PageSource};

/// Events emitted while a run progresses.
/// Fields are populated for every event, even if a consumer ignores some.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum RunEvent {
    /// Run started
    Started { run_id: String, total_keys: usize },
    /// Key skipped because its collection is already complete
    KeySkipped { collection: String },
    /// Key ingestion started
    KeyStarted { collection: String },
    /// Key ingested; `abandoned` units keep it from being marked complete
    KeyIngested {
        collection: String,
        fetched: usize,
        inserted: usize,
        abandoned: usize,
    },
    /// Key failed outright
    KeyFailed { collection: String, error: String },
    /// An enrichment pass finished
    Enriched {
        collection: String,
        field: &'static str,
        updated: usize,
        failed: usize,
    },
    /// Run complete
    Complete {
        succeeded: usize,
        failed: usize,
        skipped: usize,
    },
}

/// One failure recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyFailure {
    pub collection: String,
    /// `ingest`, `decode`, `extract` or `store`.
    pub stage: String,
    pub error: String,
}

/// Tally of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    /// Keys that were attempted (not skipped).
    pub processed: usize,
    /// Keys ingested without an abandoned unit.
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub inserted: usize,
    pub enriched: usize,
    pub failures: Vec<KeyFailure>,
}

impl RunSummary {
    fn fail(&mut self, collection: &str, stage: &str, error: impl ToString) {
        self.failures.push(KeyFailure {
            collection: collection.to_string(),
            stage: stage.to_string(),
            error: error.to_string(),
        });
    }
}

/// The unit-of-work space for one run: a source and its keys.
#[derive(Clone)]
pub struct IngestJob {
    pub source: Arc<dyn PageSource>,
    pub keys: Vec<String>,
    pub window: Option<DateWindow>,
    pub limit: Option<usize>,
    pub chunk_days: u32,
    pub enrich: Vec<EnrichPass>,
    pub skip_complete: bool,
}

impl IngestJob {
    pub fn new(source: Arc<dyn PageSource>, keys: Vec<String>) -> Self {
        Self {
            source,
            keys,
            window: None,
            limit: None,
            chunk_days: 10,
            enrich: Vec::new(),
            skip_complete: true,
        }
    }

    /// Expand a configured job (keys × qualifiers) for the given source.
    pub fn from_config(job: &JobConfig, source: Arc<dyn PageSource>) -> Result<Self, ConfigError> {
        Ok(Self {
            source,
            keys: job.search_keys(),
            window: job.window()?,
            limit: job.limit,
            chunk_days: job.chunk_days,
            enrich: job.enrich.clone(),
            skip_complete: job.skip_complete,
        })
    }

    pub fn with_window(mut self, window: DateWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn with_enrich(mut self, passes: Vec<EnrichPass>) -> Self {
        self.enrich = passes;
        self
    }
}

/// Drives a job's keys through the pipeline.
pub struct Orchestrator {
    pipeline: Pipeline,
    decoder: Option<Arc<dyn Decoder>>,
    extractor: Option<Arc<dyn ContentExtractor>>,
}

impl Orchestrator {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            decoder: None,
            extractor: None,
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ContentExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Run every key of `job`. Never fails: per-key problems end up in the
    /// summary's `failures`.
    pub async fn run(&self, job: &IngestJob, event_tx: mpsc::Sender<RunEvent>) -> RunSummary {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("run", run_id = %run_id, source = job.source.name());
        self.run_keys(job, run_id, event_tx).instrument(span).await
    }

    async fn run_keys(
        &self,
        job: &IngestJob,
        run_id: String,
        event_tx: mpsc::Sender<RunEvent>,
    ) -> RunSummary {
        let mut summary = RunSummary {
            run_id: run_id.clone(),
            ..Default::default()
        };

        let _ = event_tx
            .send(RunEvent::Started {
                run_id,
                total_keys: job.keys.len(),
            })
            .await;
        info!(
            "Starting {} with {} key(s)",
            job.source.name(),
            job.keys.len()
        );

        for key in &job.keys {
            self.run_key(job, key, &event_tx, &mut summary).await;
        }

        info!(
            "Run finished: {} succeeded, {} failed, {} skipped, {} inserted, {} enriched",
            summary.succeeded, summary.failed, summary.skipped, summary.inserted, summary.enriched
        );
        let _ = event_tx
            .send(RunEvent::Complete {
                succeeded: summary.succeeded,
                failed: summary.failed,
                skipped: summary.skipped,
            })
            .await;

        summary
    }

    async fn run_key(
        &self,
        job: &IngestJob,
        key: &str,
        event_tx: &mpsc::Sender<RunEvent>,
        summary: &mut RunSummary,
    ) {
        let collection = collection_name(job.source.name(), key);
        let store = self.pipeline.store();

        if job.skip_complete {
            match store.is_complete(&collection).await {
                Ok(true) => {
                    info!("{}: already complete, skipping", collection);
                    summary.skipped += 1;
                    let _ = event_tx
                        .send(RunEvent::KeySkipped { collection })
                        .await;
                    return;
                }
                Ok(false) => {}
                Err(e) => {
                    // Without the marker we cannot tell; ingesting again is safe.
                    warn!("{}: could not read completion marker: {}", collection, e);
                }
            }
        }

        summary.processed += 1;
        let _ = event_tx
            .send(RunEvent::KeyStarted {
                collection: collection.clone(),
            })
            .await;

        let report = match self
            .pipeline
            .ingest(
                job.source.clone(),
                key,
                job.window,
                job.limit,
                job.chunk_days,
            )
            .await
        {
            Ok(report) => report,
            Err(e) => {
                error!("{}: ingestion failed: {}", collection, e);
                summary.failed += 1;
                summary.fail(&collection, "ingest", &e);
                let _ = event_tx
                    .send(RunEvent::KeyFailed {
                        collection,
                        error: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        summary.inserted += report.inserted;
        let _ = event_tx
            .send(RunEvent::KeyIngested {
                collection: collection.clone(),
                fetched: report.fetched,
                inserted: report.inserted,
                abandoned: report.abandoned.len(),
            })
            .await;

        if report.is_clean() {
            match store.mark_complete(&collection).await {
                Ok(()) => summary.succeeded += 1,
                Err(e) => {
                    warn!("{}: could not set completion marker: {}", collection, e);
                    summary.failed += 1;
                    summary.fail(&collection, "store", &e);
                }
            }
        } else {
            warn!(
                "{}: {} unit(s) abandoned, leaving key incomplete",
                collection,
                report.abandoned.len()
            );
            summary.failed += 1;
            for unit in &report.abandoned {
                summary.fail(&collection, "ingest", format!("{}: {}", unit.label, unit.reason));
            }
        }

        for pass in &job.enrich {
            self.enrich(*pass, &collection, event_tx, summary).await;
        }
    }

    async fn enrich(
        &self,
        pass: EnrichPass,
        collection: &str,
        event_tx: &mpsc::Sender<RunEvent>,
        summary: &mut RunSummary,
    ) {
        let (stage, result): (&str, Result<EnrichReport, PipelineError>) = match pass {
            EnrichPass::Decode => match &self.decoder {
                Some(decoder) => (
                    "decode",
                    self.pipeline.decode_pass(decoder.clone(), collection).await,
                ),
                None => {
                    warn!("{}: decode requested but no decoder configured", collection);
                    return;
                }
            },
            EnrichPass::Extract => match &self.extractor {
                Some(extractor) => (
                    "extract",
                    self.pipeline
                        .extract_pass(extractor.clone(), collection)
                        .await,
                ),
                None => {
                    warn!("{}: extract requested but no extractor configured", collection);
                    return;
                }
            },
        };

        match result {
            Ok(report) => {
                summary.enriched += report.updated;
                let _ = event_tx
                    .send(RunEvent::Enriched {
                        collection: collection.to_string(),
                        field: report.field,
                        updated: report.updated,
                        failed: report.failed,
                    })
                    .await;
            }
            Err(e) => {
                error!("{}: {} pass failed: {}", collection, stage, e);
                summary.fail(collection, stage, &e);
            }
        }
    }
}
