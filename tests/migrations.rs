//! Schema tests
//!
//! Runs the cetane migrations against a fresh SQLite file and inspects the
//! resulting schema through rusqlite.

use std::collections::BTreeMap;

use rusqlite::{Connection, Result as SqliteResult};
use socialpulse::store::run_migrations;

/// Represents a SQLite index
#[derive(Debug, Clone, PartialEq, Eq)]
struct IndexInfo {
    table: String,
    columns: Vec<String>,
    unique: bool,
}

/// Column names of a table, in declaration order
fn table_columns(conn: &Connection, table: &str) -> SqliteResult<Vec<String>> {
    let mut pragma = conn.prepare(&format!("PRAGMA table_info(\"{}\")", table))?;
    let columns = pragma
        .query_map([], |row| row.get(1))?
        .collect::<SqliteResult<Vec<String>>>()?;
    Ok(columns)
}

/// Extract indexes from a SQLite connection
fn extract_indexes(conn: &Connection) -> SqliteResult<BTreeMap<String, IndexInfo>> {
    let mut stmt = conn.prepare(
        "SELECT name, tbl_name, sql FROM sqlite_master WHERE type='index' AND sql IS NOT NULL ORDER BY name",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let name: String = row.get(0)?;
            let table: String = row.get(1)?;
            let sql: String = row.get(2)?;
            Ok((name, table, sql.to_uppercase().contains("UNIQUE")))
        })?
        .collect::<SqliteResult<Vec<_>>>()?;

    let mut indexes = BTreeMap::new();
    for (name, table, unique) in rows {
        let mut pragma = conn.prepare(&format!("PRAGMA index_info(\"{}\")", name))?;
        let columns = pragma
            .query_map([], |row| row.get::<_, String>(2))?
            .collect::<SqliteResult<Vec<_>>>()?;
        indexes.insert(
            name,
            IndexInfo {
                table,
                columns,
                unique,
            },
        );
    }
    Ok(indexes)
}

#[tokio::test]
async fn migrations_create_unique_identity_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pulse.db");
    let url = format!("sqlite:{}", path.display());

    let applied = run_migrations(&url).await.unwrap();
    assert_eq!(applied.len(), 3);

    let conn = Connection::open(&path).unwrap();
    let indexes = extract_indexes(&conn).unwrap();
    let unique = indexes
        .get("idx_records_collection_identity")
        .expect("unique identity index");
    assert_eq!(unique.table, "records");
    assert_eq!(unique.columns, vec!["collection", "identity"]);
    assert!(unique.unique);

    let columns = table_columns(&conn, "collections").unwrap();
    assert!(columns.contains(&"completed_at".to_string()));

    let columns = table_columns(&conn, "records").unwrap();
    for expected in ["id", "collection", "identity", "payload", "enrichment", "ingested_at"] {
        assert!(columns.contains(&expected.to_string()), "missing {}", expected);
    }
}

#[tokio::test]
async fn migrations_are_applied_once() {
    let dir = tempfile::tempdir().unwrap();
    let url = dir.path().join("pulse.db").display().to_string();

    assert_eq!(run_migrations(&url).await.unwrap().len(), 3);
    assert!(run_migrations(&url).await.unwrap().is_empty());
}

#[tokio::test]
async fn unique_index_rejects_duplicate_identity() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pulse.db");
    run_migrations(&path.display().to_string()).await.unwrap();

    let conn = Connection::open(&path).unwrap();
    conn.execute(
        "INSERT INTO collections (name, created_at) VALUES ('c', '2024-01-01T00:00:00Z')",
        [],
    )
    .unwrap();
    let insert = "INSERT INTO records (collection, identity, payload, ingested_at) \
                  VALUES ('c', 'abc', '{}', '2024-01-01T00:00:00Z')";
    conn.execute(insert, []).unwrap();
    assert!(conn.execute(insert, []).is_err());
}
