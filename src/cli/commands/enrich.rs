//! Enrich command.

use std::sync::Arc;

use console::style;

use crate::config::Settings;
use crate::pipeline::EnrichReport;
use crate::source::{HtmlExtractor, RedirectDecoder};

use super::helpers::{build_pipeline, format_number, http_client};

/// Run decode and/or extract over one collection. With neither flag, both run.
pub async fn cmd_enrich(
    settings: &Settings,
    collection: &str,
    decode: bool,
    extract: bool,
) -> anyhow::Result<()> {
    let (decode, extract) = if decode || extract {
        (decode, extract)
    } else {
        (true, true)
    };

    let pipeline = build_pipeline(settings).await?;
    if !pipeline.store().collection_exists(collection).await? {
        println!("{} Collection '{}' not found", style("✗").red(), collection);
        return Ok(());
    }

    let http = http_client(settings)?;

    if decode {
        let report = pipeline
            .decode_pass(Arc::new(RedirectDecoder::new(http.clone())), collection)
            .await?;
        print_report(&report);
    }
    if extract {
        let report = pipeline
            .extract_pass(Arc::new(HtmlExtractor::new(http)), collection)
            .await?;
        print_report(&report);
    }

    Ok(())
}

fn print_report(report: &EnrichReport) {
    println!(
        "{} {} {}: {} updated, {} empty, {} failed ({} already set)",
        style("✓").green(),
        report.collection,
        style(report.field).bold(),
        format_number(report.updated),
        format_number(report.empty),
        format_number(report.failed),
        format_number(report.already_enriched)
    );
}
