use nimbus_core::{Document, FieldValue, MergeUpdate, ObjectId};

use crate::error::StorageError;

/// Conjunction of field equality conditions. The empty query matches every
/// document.
///
/// An empty reference filters on a stored `Null`. References flagged
/// `omit_empty` are removed rather than nulled when cleared, so a cleared
/// `omit_empty` reference never matches a filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    conditions: Vec<(String, FieldValue)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.conditions
            .push((field.into(), value.into().normalized()));
        self
    }

    pub fn conditions(&self) -> &[(String, FieldValue)] {
        &self.conditions
    }
}

/// A document store keyed by collection and identifier.
///
/// Reads and updates of a missing document fail with
/// [`StorageError::NotFound`]. Each write applies to exactly one document and
/// is atomic.
pub trait DocumentStore {
    fn insert_document(
        &mut self,
        collection: &str,
        id: ObjectId,
        document: &Document,
    ) -> Result<(), StorageError>;

    fn get_document(&self, collection: &str, id: ObjectId) -> Result<Document, StorageError>;

    /// First matching document in insertion order.
    fn find_document(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<(ObjectId, Document), StorageError>;

    fn find_documents(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<(ObjectId, Document)>, StorageError>;

    fn apply_update(
        &mut self,
        collection: &str,
        id: ObjectId,
        update: &MergeUpdate,
    ) -> Result<(), StorageError>;

    fn ensure_unique(&mut self, collection: &str, field: &str) -> Result<(), StorageError>;

    fn document_count(&self, collection: &str) -> Result<u64, StorageError>;
}
