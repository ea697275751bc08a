use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0002_unique_identity")
        .depends_on(&["0001_initial_schema"])
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_records_collection_identity ON records(collection, identity)",
        ))
}
