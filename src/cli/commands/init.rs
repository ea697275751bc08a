//! Initialize command.

use console::style;

use crate::config::Settings;
use crate::store::run_migrations;

/// Create the data directory and bring the database schema up to date.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    let applied = run_migrations(&settings.database_url()).await?;
    for name in &applied {
        println!("  {} Applied migration: {}", style("✓").green(), name);
    }

    if settings.jobs.is_empty() {
        println!(
            "{} No jobs configured; add [[jobs]] to socialpulse.toml to get started",
            style("!").yellow()
        );
    }

    println!(
        "{} Initialized Social Pulse in {}",
        style("✓").green(),
        settings.data_dir.display()
    );

    Ok(())
}
