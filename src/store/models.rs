//! Diesel models for the store tables.

use diesel::prelude::*;

use crate::schema;

/// Record row from the database.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RecordRow {
    pub id: i32,
    pub collection: String,
    pub identity: String,
    pub payload: String,
    pub enrichment: String,
    pub ingested_at: String,
    pub updated_at: Option<String>,
}

/// New record for insertion. No optional columns, so batches stay a single statement.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::records)]
pub struct NewRecordRow<'a> {
    pub collection: &'a str,
    pub identity: &'a str,
    pub payload: &'a str,
    pub enrichment: &'a str,
    pub ingested_at: &'a str,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::collections)]
pub struct NewCollectionRow<'a> {
    pub name: &'a str,
    pub created_at: &'a str,
}
