//! Store utilities.

use diesel::result::{ConnectionError, DatabaseErrorKind, Error as DbError};

/// Lift a failed `establish` into the query error type so pool callers see one error.
pub fn connection_error(e: ConnectionError) -> DbError {
    DbError::DatabaseError(
        DatabaseErrorKind::UnableToSendCommand,
        Box::new(format!("cannot open database: {}", e)),
    )
}

/// Strip an optional `sqlite:` scheme from a database URL.
pub fn sqlite_path(database_url: &str) -> &str {
    database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url)
}
