use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA busy_timeout = 5000;
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA cache_size = -32000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    doc_id BLOB NOT NULL CHECK (length(doc_id) = 16),
    created_at INTEGER NOT NULL DEFAULT (CAST(unixepoch('now','subsec') * 1000 AS INTEGER)),
    PRIMARY KEY (collection, doc_id)
);

CREATE TABLE IF NOT EXISTS fields (
    collection TEXT NOT NULL,
    doc_id BLOB NOT NULL CHECK (length(doc_id) = 16),
    field_key TEXT NOT NULL,
    value BLOB NOT NULL,
    updated_at INTEGER NOT NULL DEFAULT (CAST(unixepoch('now','subsec') * 1000 AS INTEGER)),
    PRIMARY KEY (collection, doc_id, field_key),
    FOREIGN KEY (collection, doc_id) REFERENCES documents (collection, doc_id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_fields_lookup ON fields (collection, field_key, value);
";

/// Names used verbatim in DDL: letters, digits and underscores only.
pub fn check_name(name: &str) -> Result<(), StorageError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName(name.to_string()))
    }
}

/// Partial unique index over one field of one collection. Documents without
/// the field are not constrained.
pub fn unique_index_sql(collection: &str, field: &str) -> Result<String, StorageError> {
    check_name(collection)?;
    check_name(field)?;
    Ok(format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS uniq_{collection}__{field} ON fields (value) \
         WHERE collection = '{collection}' AND field_key = '{field}'"
    ))
}
