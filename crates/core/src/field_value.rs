use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::ObjectId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    /// Optional identifier. `Ref(None)` is the empty reference and is never
    /// written to a store as-is.
    Ref(Option<ObjectId>),
    TextList(Vec<String>),
}

impl FieldValue {
    pub fn is_empty_ref(&self) -> bool {
        matches!(self, FieldValue::Ref(None))
    }

    /// Collapses an empty reference to `Null`; every other value is unchanged.
    pub fn normalized(self) -> Self {
        match self {
            FieldValue::Ref(None) => FieldValue::Null,
            other => other,
        }
    }

    pub fn into_text(self, field: &str) -> Result<String, CoreError> {
        match self {
            FieldValue::Text(s) => Ok(s),
            FieldValue::Null => Ok(String::new()),
            other => Err(mismatch(field, "text", &other)),
        }
    }

    pub fn into_integer(self, field: &str) -> Result<i64, CoreError> {
        match self {
            FieldValue::Integer(n) => Ok(n),
            FieldValue::Null => Ok(0),
            other => Err(mismatch(field, "integer", &other)),
        }
    }

    pub fn into_ref(self, field: &str) -> Result<Option<ObjectId>, CoreError> {
        match self {
            FieldValue::Ref(id) => Ok(id),
            FieldValue::Null => Ok(None),
            other => Err(mismatch(field, "reference", &other)),
        }
    }

    /// `Null` decodes to `None` so an unset list stays distinguishable from
    /// an empty one.
    pub fn into_text_list(self, field: &str) -> Result<Option<Vec<String>>, CoreError> {
        match self {
            FieldValue::TextList(items) => Ok(Some(items)),
            FieldValue::Null => Ok(None),
            other => Err(mismatch(field, "text list", &other)),
        }
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

fn mismatch(field: &str, expected: &str, found: &FieldValue) -> CoreError {
    CoreError::InvalidData(format!("field {field}: expected {expected}, found {found:?}"))
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Integer(n)
    }
}

impl From<ObjectId> for FieldValue {
    fn from(id: ObjectId) -> Self {
        FieldValue::Ref(Some(id))
    }
}

impl From<Option<ObjectId>> for FieldValue {
    fn from(id: Option<ObjectId>) -> Self {
        FieldValue::Ref(id)
    }
}
