use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use nimbus_core::ObjectId;
use nimbus_storage::DatabaseError;

#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("instance already exists: {0}")]
    DuplicateEntity(ObjectId),
}

impl InstanceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Database(DatabaseError::NotFound))
    }
}

/// Validation failure payload handed back to API callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    pub error: String,
    pub message: String,
}

impl ErrorData {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}

/// Every failed check, in check order. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationError {
    errors: Vec<ErrorData>,
}

impl ValidationError {
    pub(crate) fn from_errors(errors: Vec<ErrorData>) -> Option<Self> {
        (!errors.is_empty()).then_some(Self { errors })
    }

    pub fn errors(&self) -> &[ErrorData] {
        &self.errors
    }

    /// The first failed check, for callers that surface a single error.
    pub fn primary(&self) -> &ErrorData {
        &self.errors[0]
    }

    pub fn has(&self, code: &str) -> bool {
        self.errors.iter().any(|e| e.error == code)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<&str> = self.errors.iter().map(|e| e.error.as_str()).collect();
        write!(f, "validation failed: {}", codes.join(", "))
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
