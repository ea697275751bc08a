use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0003_completion_marker")
        .depends_on(&["0001_initial_schema"])
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "ALTER TABLE collections ADD COLUMN completed_at TEXT",
        ))
}
