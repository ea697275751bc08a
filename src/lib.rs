//! Social Pulse - idempotent multi-source content ingestion.
//!
//! Sources (YouTube, MediaCloud, Google News) are searched per key, each
//! record gets a content-derived identity, and only records new to their
//! collection are stored. Later passes enrich stored records in place.

pub mod cli;
pub mod config;
pub mod fetch;
pub mod http;
pub mod identity;
pub mod migrations;
pub mod orchestrator;
pub mod pagination;
pub mod pipeline;
pub mod proxy;
pub mod record;
pub mod scheduler;
pub mod schema;
pub mod source;
pub mod store;
