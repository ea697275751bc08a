//! In-memory record store for tests and dry runs.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::{dedup_batch, RecordStore, StoreError};
use crate::record::{FieldUpdate, NewRecord, Record};

#[derive(Debug, Default)]
struct MemCollection {
    records: Vec<Record>,
    index: HashMap<String, usize>,
    completed_at: Option<DateTime<Utc>>,
}

/// Record store held entirely in process memory.
///
/// Check-and-insert happens under one write lock, so concurrent writers
/// cannot both insert the same identity.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<BTreeMap<String, MemCollection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.collections.read().await.keys().cloned().collect())
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool, StoreError> {
        Ok(self.collections.read().await.contains_key(collection))
    }

    async fn get_records(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .map(|c| c.records.clone())
            .unwrap_or_default())
    }

    async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .map_or(0, |c| c.records.len()))
    }

    async fn insert_new(
        &self,
        collection: &str,
        batch: Vec<NewRecord>,
    ) -> Result<usize, StoreError> {
        let batch = dedup_batch(batch);
        if batch.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let mut collections = self.collections.write().await;
        let target = collections.entry(collection.to_string()).or_default();

        let mut inserted = 0;
        for record in batch {
            if target.index.contains_key(&record.identity) {
                continue;
            }
            target
                .index
                .insert(record.identity.clone(), target.records.len());
            target.records.push(Record {
                identity: record.identity,
                payload: record.payload,
                enrichment: Default::default(),
                ingested_at: now,
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn update_fields(
        &self,
        collection: &str,
        updates: Vec<FieldUpdate>,
    ) -> Result<usize, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(target) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let mut touched = 0;
        for update in updates {
            let Some(&pos) = target.index.get(&update.identity) else {
                continue;
            };
            merge_patch(&mut target.records[pos].enrichment, update.fields);
            touched += 1;
        }
        Ok(touched)
    }

    async fn is_complete(&self, collection: &str) -> Result<bool, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .is_some_and(|c| c.completed_at.is_some()))
    }

    async fn mark_complete(&self, collection: &str) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .completed_at = Some(Utc::now());
        Ok(())
    }
}

/// RFC 7396 merge, matching SQLite's `json_patch`: objects merge
/// recursively, null removes a key, anything else replaces.
fn merge_patch(target: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        match value {
            Value::Null => {
                target.remove(&key);
            }
            Value::Object(inner) => {
                let slot = target
                    .entry(key)
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                if let Value::Object(existing) = slot {
                    merge_patch(existing, inner);
                }
            }
            other => {
                target.insert(key, other);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn rec(id: &str) -> NewRecord {
        NewRecord {
            identity: id.to_string(),
            payload: json!({ "url": format!("https://example.com/{}", id) }),
        }
    }

    #[tokio::test]
    async fn second_insert_of_same_batch_adds_nothing() {
        let store = MemoryStore::new();
        let batch = vec![rec("a"), rec("b"), rec("c")];
        assert_eq!(store.insert_new("c1", batch.clone()).await.unwrap(), 3);
        assert_eq!(store.insert_new("c1", batch).await.unwrap(), 0);
        assert_eq!(store.count("c1").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn update_on_missing_identity_is_skipped() {
        let store = MemoryStore::new();
        store.insert_new("c1", vec![rec("a")]).await.unwrap();

        let touched = store
            .update_fields(
                "c1",
                vec![
                    FieldUpdate::single("a", "content", "text"),
                    FieldUpdate::single("zzz", "content", "ghost"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(touched, 1);
        assert_eq!(store.count("c1").await.unwrap(), 1);

        let touched = store
            .update_fields("nope", vec![FieldUpdate::single("a", "content", "x")])
            .await
            .unwrap();
        assert_eq!(touched, 0);
        assert!(!store.collection_exists("nope").await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_writers_never_duplicate() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let batch = (0..50).map(|i| rec(&i.to_string())).collect();
                store.insert_new("shared", batch).await.unwrap()
            }));
        }
        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }
        assert_eq!(total, 50);
        assert_eq!(store.count("shared").await.unwrap(), 50);
    }

    #[tokio::test]
    async fn nested_enrichment_merges_like_json_patch() {
        let store = MemoryStore::new();
        store.insert_new("c1", vec![rec("a")]).await.unwrap();

        let meta = |v: Value| FieldUpdate::single("a", "meta", v);
        store
            .update_fields("c1", vec![meta(json!({ "lang": "es", "words": 120 }))])
            .await
            .unwrap();
        store
            .update_fields(
                "c1",
                vec![meta(json!({ "words": null, "author": { "name": "R" } }))],
            )
            .await
            .unwrap();

        let records = store.get_records("c1").await.unwrap();
        assert_eq!(
            records[0].enrichment["meta"],
            json!({ "lang": "es", "author": { "name": "R" } })
        );

        // A scalar replaced by an object becomes that object.
        store
            .update_fields("c1", vec![FieldUpdate::single("a", "content", "text")])
            .await
            .unwrap();
        store
            .update_fields(
                "c1",
                vec![FieldUpdate::single("a", "content", json!({ "body": "x" }))],
            )
            .await
            .unwrap();
        let records = store.get_records("c1").await.unwrap();
        assert_eq!(records[0].enrichment["content"], json!({ "body": "x" }));
    }

    #[tokio::test]
    async fn mark_complete_creates_collection() {
        let store = MemoryStore::new();
        store.mark_complete("empty").await.unwrap();
        assert!(store.is_complete("empty").await.unwrap());
        assert_eq!(store.list_collections().await.unwrap(), vec!["empty"]);
    }
}
