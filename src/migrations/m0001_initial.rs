use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0001_initial_schema").operation(
        RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    collection TEXT NOT NULL REFERENCES collections(name),
    identity TEXT NOT NULL,
    payload TEXT NOT NULL,
    enrichment TEXT NOT NULL DEFAULT '{}',
    ingested_at TEXT NOT NULL,
    updated_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection)"#,
        ),
    )
}
