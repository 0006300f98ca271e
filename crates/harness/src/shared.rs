use std::path::PathBuf;

use nimbus_storage::{Database, SqliteStorage, StorageError};
use tempfile::TempDir;

/// A file-backed store that several handles can open at once, standing in
/// for independent processes sharing one database.
pub struct SharedStore {
    _dir: TempDir,
    path: PathBuf,
}

impl SharedStore {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nimbus.db");
        Ok(Self { _dir: dir, path })
    }

    pub fn connect(&self) -> Result<Database<SqliteStorage>, StorageError> {
        Ok(Database::new(SqliteStorage::open(&self.path)?))
    }
}
