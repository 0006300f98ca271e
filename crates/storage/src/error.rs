use thiserror::Error;

/// Failures raised by a store driver.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("core error: {0}")]
    Core(#[from] nimbus_core::CoreError),
}

/// Store failures as seen by callers of a [`Collection`](crate::Collection).
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("document not found")]
    NotFound,

    #[error("duplicate document: {0}")]
    Duplicate(String),

    #[error("store error: {0}")]
    Store(#[source] StorageError),
}

impl DatabaseError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

/// Classifies a driver failure. Anything not recognised as a missing document
/// or a uniqueness violation is a store error.
pub fn parse_error(err: StorageError) -> DatabaseError {
    match err {
        StorageError::NotFound(_) => DatabaseError::NotFound,
        StorageError::Sqlite(rusqlite::Error::QueryReturnedNoRows) => DatabaseError::NotFound,
        StorageError::ConstraintViolation(msg) => DatabaseError::Duplicate(msg),
        StorageError::Sqlite(rusqlite::Error::SqliteFailure(code, msg))
            if code.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            DatabaseError::Duplicate(msg.unwrap_or_else(|| code.to_string()))
        }
        other => DatabaseError::Store(other),
    }
}

impl From<StorageError> for DatabaseError {
    fn from(err: StorageError) -> Self {
        parse_error(err)
    }
}
