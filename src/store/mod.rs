//! Dedup & idempotent record store.
//!
//! Every backend enforces identity uniqueness itself: the SQLite store
//! through a unique index and `INSERT OR IGNORE`, the memory store through a
//! single write-locked check-and-insert. Callers never need to pre-filter.

mod memory;
mod migrations;
mod models;
mod pool;
mod sqlite;
mod util;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::record::{FieldUpdate, NewRecord, Record};

pub use memory::MemoryStore;
pub use migrations::run_migrations;
pub use pool::{SqliteConn, SqlitePool};
pub use sqlite::SqliteStore;

/// Errors raised by a record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Identity-keyed storage of records, partitioned into collections.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Names of every collection, sorted.
    async fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    async fn collection_exists(&self, collection: &str) -> Result<bool, StoreError>;

    /// Every record of a collection, in insertion order.
    async fn get_records(&self, collection: &str) -> Result<Vec<Record>, StoreError>;

    /// Number of records in a collection (0 if it does not exist).
    async fn count(&self, collection: &str) -> Result<usize, StoreError>;

    /// Insert records whose identity is not yet present.
    ///
    /// Returns how many were actually inserted; 0 is a valid outcome. The
    /// collection is created if this is its first write.
    async fn insert_new(&self, collection: &str, records: Vec<NewRecord>)
        -> Result<usize, StoreError>;

    /// Merge enrichment fields into existing records.
    ///
    /// Updates for identities that are not present are skipped; nothing is
    /// ever created here. Returns the number of records touched.
    async fn update_fields(
        &self,
        collection: &str,
        updates: Vec<FieldUpdate>,
    ) -> Result<usize, StoreError>;

    /// Whether a previous ingestion of this collection finished cleanly.
    async fn is_complete(&self, collection: &str) -> Result<bool, StoreError>;

    /// Set the completion marker, creating the collection if needed.
    async fn mark_complete(&self, collection: &str) -> Result<(), StoreError>;
}

/// Drop later duplicates of an identity within one batch.
pub fn dedup_batch(records: Vec<NewRecord>) -> Vec<NewRecord> {
    let before = records.len();
    let mut seen = HashSet::with_capacity(before);
    let unique: Vec<NewRecord> = records
        .into_iter()
        .filter(|r| seen.insert(r.identity.clone()))
        .collect();
    if unique.len() < before {
        debug!("Collapsed {} duplicate(s) within batch", before - unique.len());
    }
    unique
}

/// Store that rejects every operation; used when the database cannot be reached.
#[derive(Debug, Clone)]
pub struct UnavailableStore {
    reason: String,
}

impl UnavailableStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn fail<T>(&self) -> Result<T, StoreError> {
        Err(StoreError::Unavailable(self.reason.clone()))
    }
}

#[async_trait]
impl RecordStore for UnavailableStore {
    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        self.fail()
    }

    async fn collection_exists(&self, _collection: &str) -> Result<bool, StoreError> {
        self.fail()
    }

    async fn get_records(&self, _collection: &str) -> Result<Vec<Record>, StoreError> {
        self.fail()
    }

    async fn count(&self, _collection: &str) -> Result<usize, StoreError> {
        self.fail()
    }

    async fn insert_new(
        &self,
        _collection: &str,
        _records: Vec<NewRecord>,
    ) -> Result<usize, StoreError> {
        self.fail()
    }

    async fn update_fields(
        &self,
        _collection: &str,
        _updates: Vec<FieldUpdate>,
    ) -> Result<usize, StoreError> {
        self.fail()
    }

    async fn is_complete(&self, _collection: &str) -> Result<bool, StoreError> {
        self.fail()
    }

    async fn mark_complete(&self, _collection: &str) -> Result<(), StoreError> {
        self.fail()
    }
}

/// Open the SQLite store, retrying a bounded number of times.
///
/// When every attempt fails the returned store is an [`UnavailableStore`],
/// so the run proceeds and each write fails fast instead of hanging.
pub async fn connect_store(
    database_url: &str,
    attempts: u32,
    delay: Duration,
) -> Arc<dyn RecordStore> {
    let attempts = attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match SqliteStore::connect(database_url).await {
            Ok(store) => {
                debug!("Connected to store on attempt {}", attempt);
                return Arc::new(store);
            }
            Err(e) => {
                warn!(
                    "Store connection attempt {}/{} failed: {}",
                    attempt, attempts, e
                );
                last_error = e.to_string();
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    error!(
        "Giving up on store after {} attempts; continuing without persistence",
        attempts
    );
    Arc::new(UnavailableStore::new(last_error))
}

/// Parse a datetime string from the database.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(identity: &str, title: &str) -> NewRecord {
        NewRecord {
            identity: identity.to_string(),
            payload: json!({ "title": title }),
        }
    }

    #[test]
    fn dedup_batch_keeps_first_occurrence() {
        let batch = vec![rec("a", "first"), rec("b", "b"), rec("a", "second")];
        let unique = dedup_batch(batch);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].payload["title"], "first");
    }

    #[tokio::test]
    async fn unavailable_store_fails_fast() {
        let store = UnavailableStore::new("connection refused");
        let err = store.insert_new("c", vec![rec("a", "x")]).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(ref r) if r == "connection refused"));
        assert!(store.list_collections().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_store_gives_up_after_bounded_attempts() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a database file.
        let url = dir.path().display().to_string();

        let store = connect_store(&url, 3, Duration::from_secs(1)).await;
        let err = store.list_collections().await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
