//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod collections;
mod enrich;
mod helpers;
mod ingest;
mod init;

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::config::{Settings, SourceKind};

#[derive(Parser)]
#[command(name = "pulse")]
#[command(about = "Idempotent multi-source content ingestion for Social Pulse")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true, env = "PULSE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Ingest configured jobs, or an ad-hoc search
    Ingest {
        /// Only run the job with this name
        #[arg(short, long)]
        job: Option<String>,
        /// Ad-hoc source to search instead of configured jobs
        #[arg(long, value_enum, requires = "keys")]
        source: Option<SourceArg>,
        /// Search keys for an ad-hoc run (repeatable)
        #[arg(short, long = "key")]
        keys: Vec<String>,
        /// Window start (YYYY-MM-DD), inclusive
        #[arg(long, requires = "end")]
        start: Option<NaiveDate>,
        /// Window end (YYYY-MM-DD), exclusive
        #[arg(long, requires = "start")]
        end: Option<NaiveDate>,
        /// Cap on records per key (token-paged sources)
        #[arg(short, long)]
        limit: Option<usize>,
        /// Re-ingest keys even if already marked complete
        #[arg(long)]
        force: bool,
    },

    /// Run enrichment passes over an existing collection
    Enrich {
        /// Collection name, e.g. gnews_Jalisco
        collection: String,
        /// Resolve redirect links into decoded_url
        #[arg(long)]
        decode: bool,
        /// Extract full text into content
        #[arg(long)]
        extract: bool,
    },

    /// List collections with record counts
    Collections,

    /// Print records of a collection as JSON lines
    Show {
        collection: String,
        /// Maximum records to print (0 = all)
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

/// Source names accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum SourceArg {
    Youtube,
    #[value(name = "youtube-comments")]
    YoutubeComments,
    Mediacloud,
    Gnews,
}

impl From<SourceArg> for SourceKind {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Youtube => SourceKind::Youtube,
            SourceArg::YoutubeComments => SourceKind::YoutubeComments,
            SourceArg::Mediacloud => SourceKind::Mediacloud,
            SourceArg::Gnews => SourceKind::Gnews,
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Ingest {
            job,
            source,
            keys,
            start,
            end,
            limit,
            force,
        } => {
            let adhoc = source.map(|source| ingest::AdHoc {
                source: source.into(),
                keys,
                start,
                end,
                limit,
            });
            ingest::cmd_ingest(&settings, job.as_deref(), adhoc, force).await
        }
        Commands::Enrich {
            collection,
            decode,
            extract,
        } => enrich::cmd_enrich(&settings, &collection, decode, extract).await,
        Commands::Collections => collections::cmd_collections(&settings).await,
        Commands::Show { collection, limit } => {
            collections::cmd_show(&settings, &collection, limit).await
        }
    }
}
