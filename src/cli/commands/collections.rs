//! Collection listing and inspection.

use console::style;

use crate::config::Settings;
use crate::record::{CONTENT_FIELD, DECODED_URL_FIELD};

use super::helpers::{format_number, open_store, truncate};

/// List every collection with its record count and completion state.
pub async fn cmd_collections(settings: &Settings) -> anyhow::Result<()> {
    let store = open_store(settings).await;
    let names = store.list_collections().await?;

    if names.is_empty() {
        println!("{} No collections yet", style("!").yellow());
        return Ok(());
    }

    println!(
        "{:<40} {:>10} {:>10}",
        style("COLLECTION").bold(),
        style("RECORDS").bold(),
        style("STATE").bold()
    );
    println!("{}", "─".repeat(62));

    let mut total = 0;
    for name in &names {
        let count = store.count(name).await?;
        total += count;
        let state = if store.is_complete(name).await? {
            style("complete").green()
        } else {
            style("partial").yellow()
        };
        println!(
            "{:<40} {:>10} {:>10}",
            truncate(name, 40),
            format_number(count),
            state
        );
    }

    println!("{}", "─".repeat(62));
    println!(
        "{} collection(s), {} record(s)",
        names.len(),
        format_number(total)
    );
    Ok(())
}

/// Print records of a collection, one JSON object per line.
pub async fn cmd_show(settings: &Settings, collection: &str, limit: usize) -> anyhow::Result<()> {
    let store = open_store(settings).await;
    if !store.collection_exists(collection).await? {
        println!("{} Collection '{}' not found", style("✗").red(), collection);
        return Ok(());
    }

    let records = store.get_records(collection).await?;
    let shown = if limit == 0 {
        records.len()
    } else {
        limit.min(records.len())
    };

    for record in &records[..shown] {
        println!("{}", serde_json::to_string(record)?);
    }

    let decoded = records
        .iter()
        .filter(|r| r.has_enrichment(DECODED_URL_FIELD))
        .count();
    let extracted = records
        .iter()
        .filter(|r| r.has_enrichment(CONTENT_FIELD))
        .count();
    eprintln!(
        "{} {} of {} record(s); {} decoded, {} with content",
        style("·").dim(),
        shown,
        format_number(records.len()),
        format_number(decoded),
        format_number(extracted)
    );
    Ok(())
}
