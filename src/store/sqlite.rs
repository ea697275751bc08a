//! SQLite-backed record store.
//!
//! Uses diesel-async's SyncConnectionWrapper for an async interface over
//! Diesel's compile-time checked queries.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde_json::{Map, Value};
use tracing::debug;

use super::models::{NewCollectionRow, NewRecordRow, RecordRow};
use super::pool::{DbError, SqliteConn, SqlitePool};
use super::{dedup_batch, parse_datetime, run_migrations, RecordStore, StoreError};
use crate::record::{FieldUpdate, NewRecord, Record};
use crate::schema::{collections, records};

const MERGE_ENRICHMENT_SQL: &str = "UPDATE records \
     SET enrichment = json_patch(enrichment, ?), updated_at = ? \
     WHERE collection = ? AND identity = ?";

impl TryFrom<RecordRow> for Record {
    type Error = StoreError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let enrichment: Map<String, Value> = if row.enrichment.is_empty() {
            Map::new()
        } else {
            serde_json::from_str(&row.enrichment)?
        };
        Ok(Record {
            identity: row.identity,
            payload: serde_json::from_str(&row.payload)?,
            enrichment,
            ingested_at: parse_datetime(&row.ingested_at),
        })
    }
}

/// Record store over a single SQLite database file.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Migrate the database and verify a connection can be opened.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        run_migrations(database_url).await?;
        let pool = SqlitePool::new(database_url);
        drop(pool.get().await?);
        Ok(Self { pool })
    }

    pub fn database_url(&self) -> &str {
        self.pool.database_url()
    }
}

async fn ensure_collection(conn: &mut SqliteConn, name: &str, now: &str) -> Result<(), DbError> {
    let created = diesel::insert_or_ignore_into(collections::table)
        .values(&NewCollectionRow {
            name,
            created_at: now,
        })
        .execute(conn)
        .await?;
    if created > 0 {
        debug!("Created collection {}", name);
    }
    Ok(())
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let mut conn = self.pool.get().await?;
        let names = collections::table
            .select(collections::name)
            .order(collections::name.asc())
            .load::<String>(&mut conn)
            .await?;
        Ok(names)
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool, StoreError> {
        let mut conn = self.pool.get().await?;

        use diesel::dsl::count_star;
        let count: i64 = collections::table
            .filter(collections::name.eq(collection))
            .select(count_star())
            .first(&mut conn)
            .await?;

        Ok(count > 0)
    }

    async fn get_records(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        let mut conn = self.pool.get().await?;
        let rows = records::table
            .filter(records::collection.eq(collection))
            .order(records::id.asc())
            .select(RecordRow::as_select())
            .load::<RecordRow>(&mut conn)
            .await?;
        rows.into_iter().map(Record::try_from).collect()
    }

    async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        let mut conn = self.pool.get().await?;

        use diesel::dsl::count_star;
        let count: i64 = records::table
            .filter(records::collection.eq(collection))
            .select(count_star())
            .first(&mut conn)
            .await?;

        Ok(count as usize)
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

        let now = Utc::now().to_rfc3339();
        let payloads = batch
            .iter()
            .map(|r| serde_json::to_string(&r.payload))
            .collect::<Result<Vec<_>, _>>()?;
        let rows: Vec<NewRecordRow<'_>> = batch
            .iter()
            .zip(&payloads)
            .map(|(record, payload)| NewRecordRow {
                collection,
                identity: &record.identity,
                payload,
                enrichment: "{}",
                ingested_at: &now,
            })
            .collect();

        // One transaction per batch: a failed row rolls the whole batch back.
        let mut conn = self.pool.get().await?;
        let inserted = conn
            .transaction::<_, DbError, _>(|conn| {
                let rows = &rows;
                let now = now.as_str();
                Box::pin(async move {
                    ensure_collection(conn, collection, now).await?;
                    let mut inserted = 0;
                    for row in rows {
                        inserted += diesel::insert_or_ignore_into(records::table)
                            .values(row)
                            .execute(conn)
                            .await?;
                    }
                    Ok(inserted)
                })
            })
            .await?;

        debug!(
            "{}: inserted {} of {} record(s)",
            collection,
            inserted,
            rows.len()
        );
        Ok(inserted)
    }

    async fn update_fields(
        &self,
        collection: &str,
        updates: Vec<FieldUpdate>,
    ) -> Result<usize, StoreError> {
        if updates.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().to_rfc3339();
        let mut conn = self.pool.get().await?;
        let mut touched = 0;

        for update in updates {
            let patch = serde_json::to_string(&Value::Object(update.fields))?;
            touched += diesel::sql_query(MERGE_ENRICHMENT_SQL)
                .bind::<Text, _>(patch.as_str())
                .bind::<Text, _>(now.as_str())
                .bind::<Text, _>(collection)
                .bind::<Text, _>(update.identity.as_str())
                .execute(&mut conn)
                .await?;
        }

        Ok(touched)
    }

    async fn is_complete(&self, collection: &str) -> Result<bool, StoreError> {
        let mut conn = self.pool.get().await?;
        let marker = collections::table
            .find(collection)
            .select(collections::completed_at)
            .first::<Option<String>>(&mut conn)
            .await
            .optional()?;
        Ok(matches!(marker, Some(Some(_))))
    }

    async fn mark_complete(&self, collection: &str) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self.pool.get().await?;
        ensure_collection(&mut conn, collection, &now).await?;
        diesel::update(collections::table.find(collection))
            .set(collections::completed_at.eq(Some(now.as_str())))
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}
