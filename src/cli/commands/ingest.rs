//! Ingest command.

use std::sync::Arc;

use chrono::NaiveDate;
use console::style;
use tokio::sync::mpsc;

use crate::config::{JobConfig, Settings, SourceKind};
use crate::orchestrator::{IngestJob, Orchestrator, RunEvent, RunSummary};
use crate::source::{page_source, HtmlExtractor, RedirectDecoder};

use super::helpers::{build_pipeline, format_number, http_client};

/// A one-off search given on the command line.
pub struct AdHoc {
    pub source: SourceKind,
    pub keys: Vec<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub limit: Option<usize>,
}

impl AdHoc {
    fn into_job(self) -> JobConfig {
        JobConfig {
            name: format!("{}-adhoc", self.source),
            source: self.source,
            keys: self.keys,
            qualifiers: Vec::new(),
            start: self.start,
            end: self.end,
            chunk_days: 10,
            limit: self.limit,
            enrich: Vec::new(),
            skip_complete: true,
        }
    }
}

/// Run configured jobs (or one ad-hoc job) through the orchestrator.
pub async fn cmd_ingest(
    settings: &Settings,
    job_name: Option<&str>,
    adhoc: Option<AdHoc>,
    force: bool,
) -> anyhow::Result<()> {
    let jobs: Vec<JobConfig> = match (adhoc, job_name) {
        (Some(adhoc), _) => vec![adhoc.into_job()],
        (None, Some(name)) => match settings.job(name) {
            Some(job) => vec![job.clone()],
            None => {
                println!("{} Job '{}' not found", style("✗").red(), name);
                return Ok(());
            }
        },
        (None, None) => settings.jobs.clone(),
    };

    if jobs.is_empty() {
        println!(
            "{} No jobs configured. Add [[jobs]] to the config or pass --source and --key",
            style("!").yellow()
        );
        return Ok(());
    }

    settings.ensure_directories()?;
    let http = http_client(settings)?;
    let orchestrator = Orchestrator::new(build_pipeline(settings).await?)
        .with_decoder(Arc::new(RedirectDecoder::new(http.clone())))
        .with_extractor(Arc::new(HtmlExtractor::new(http.clone())));

    for job in &jobs {
        println!(
            "\n{} {} ({})",
            style("▶").cyan(),
            style(&job.name).bold(),
            job.source
        );

        let source = match page_source(job.source, &settings.sources, http.clone()) {
            Ok(source) => source,
            Err(e) => {
                println!("  {} {}", style("✗").red(), e);
                continue;
            }
        };
        let mut ingest = match IngestJob::from_config(job, source) {
            Ok(ingest) => ingest,
            Err(e) => {
                println!("  {} {}", style("✗").red(), e);
                continue;
            }
        };
        if force {
            ingest.skip_complete = false;
        }

        let (event_tx, event_rx) = mpsc::channel(100);
        let printer = tokio::spawn(print_events(event_rx));
        let summary = orchestrator.run(&ingest, event_tx).await;
        let _ = printer.await;

        print_summary(&summary);
    }

    Ok(())
}

async fn print_events(mut event_rx: mpsc::Receiver<RunEvent>) {
    while let Some(event) = event_rx.recv().await {
        match event {
            RunEvent::Started { total_keys, .. } => {
                println!("  {} key(s) to process", total_keys);
            }
            RunEvent::KeySkipped { collection } => {
                println!("  {} {} already complete", style("-").dim(), collection);
            }
            RunEvent::KeyStarted { .. } => {}
            RunEvent::KeyIngested {
                collection,
                fetched,
                inserted,
                abandoned,
            } => {
                let mark = if abandoned == 0 {
                    style("✓").green()
                } else {
                    style("!").yellow()
                };
                print!(
                    "  {} {}: {} fetched, {} new",
                    mark,
                    collection,
                    format_number(fetched),
                    format_number(inserted)
                );
                if abandoned > 0 {
                    print!(", {} unit(s) abandoned", abandoned);
                }
                println!();
            }
            RunEvent::KeyFailed { collection, error } => {
                println!("  {} {}: {}", style("✗").red(), collection, error);
            }
            RunEvent::Enriched {
                collection,
                field,
                updated,
                failed,
            } => {
                println!(
                    "    {} {}: {} {} set, {} failed",
                    style("+").cyan(),
                    collection,
                    format_number(updated),
                    field,
                    failed
                );
            }
            RunEvent::Complete { .. } => {}
        }
    }
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{} {} succeeded, {} failed, {} skipped; {} new record(s), {} enriched",
        style("Σ").bold(),
        summary.succeeded,
        summary.failed,
        summary.skipped,
        format_number(summary.inserted),
        format_number(summary.enriched)
    );
    for failure in &summary.failures {
        println!(
            "  {} [{}] {}: {}",
            style("✗").red(),
            failure.stage,
            failure.collection,
            failure.error
        );
    }
}
