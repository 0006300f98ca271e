use std::marker::PhantomData;

use tracing::debug;

use nimbus_core::fields::{self, FieldSet, Persist};
use nimbus_core::ObjectId;

use crate::error::{DatabaseError, StorageError};
use crate::traits::{DocumentStore, Query};

/// Owns a store handle and hands out typed collections over it.
pub struct Database<S> {
    store: S,
}

impl<S: DocumentStore> Database<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn collection<E: Persist>(&mut self) -> Collection<'_, S, E> {
        Collection {
            store: &mut self.store,
            _entity: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}

/// Identity-based access to the documents of one entity type. Every failure
/// is passed through [`parse_error`](crate::parse_error).
pub struct Collection<'a, S, E> {
    store: &'a mut S,
    _entity: PhantomData<fn() -> E>,
}

impl<S: DocumentStore, E: Persist> Collection<'_, S, E> {
    pub fn find_one(&self, query: &Query) -> Result<E, DatabaseError> {
        let (id, document) = self.store.find_document(E::COLLECTION, query)?;
        Ok(fields::load_document(id, document).map_err(StorageError::from)?)
    }

    pub fn find_one_id(&self, id: ObjectId) -> Result<E, DatabaseError> {
        let document = self.store.get_document(E::COLLECTION, id)?;
        Ok(fields::load_document(id, document).map_err(StorageError::from)?)
    }

    pub fn find_all(&self, query: &Query) -> Result<Vec<E>, DatabaseError> {
        self.store
            .find_documents(E::COLLECTION, query)?
            .into_iter()
            .map(|(id, document)| {
                fields::load_document(id, document)
                    .map_err(|e| DatabaseError::from(StorageError::from(e)))
            })
            .collect()
    }

    /// Stores every persistable field under a fresh identifier.
    pub fn insert(&mut self, entity: &E) -> Result<ObjectId, DatabaseError> {
        let id = ObjectId::new();
        let document = fields::assign_fields(entity);
        debug!(collection = E::COLLECTION, %id, fields = document.len(), "insert");
        self.store.insert_document(E::COLLECTION, id, &document)?;
        Ok(id)
    }

    /// Assigns every persistable field of `entity` to the document `id`.
    pub fn commit(&mut self, id: ObjectId, entity: &E) -> Result<(), DatabaseError> {
        let update = nimbus_core::MergeUpdate {
            set: fields::assign_fields(entity),
            unset: None,
        };
        debug!(collection = E::COLLECTION, %id, fields = update.set.len(), "commit");
        self.store.apply_update(E::COLLECTION, id, &update)?;
        Ok(())
    }

    /// Writes only the fields in `selected`, removing empty `omit_empty`
    /// references instead of nulling them.
    pub fn commit_fields(
        &mut self,
        id: ObjectId,
        entity: &E,
        selected: &FieldSet,
    ) -> Result<(), DatabaseError> {
        let update = fields::select_fields_all(entity, selected);
        debug!(
            collection = E::COLLECTION,
            %id,
            set = ?update.set.keys().collect::<Vec<_>>(),
            unset = ?update.unset,
            "commit fields"
        );
        self.store.apply_update(E::COLLECTION, id, &update)?;
        Ok(())
    }

    pub fn ensure_unique(&mut self, field: &str) -> Result<(), DatabaseError> {
        self.store.ensure_unique(E::COLLECTION, field)?;
        Ok(())
    }

    pub fn count(&self) -> Result<u64, DatabaseError> {
        Ok(self.store.document_count(E::COLLECTION)?)
    }
}
