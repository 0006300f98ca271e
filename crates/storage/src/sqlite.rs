use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{Connection, TransactionBehavior};
use tracing::debug;

use nimbus_core::{Document, FieldValue, MergeUpdate, ObjectId};

use crate::error::StorageError;
use crate::traits::{DocumentStore, Query};

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

fn encode(value: &FieldValue) -> Result<Vec<u8>, StorageError> {
    value
        .to_msgpack()
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        debug!(path = %path.as_ref().display(), "opening document store");
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn document_exists(
    conn: &Connection,
    collection: &str,
    id: ObjectId,
) -> Result<bool, StorageError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM documents WHERE collection = ?1 AND doc_id = ?2)",
        rusqlite::params![collection, id.as_bytes().as_slice()],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn read_fields(
    conn: &Connection,
    collection: &str,
    id: ObjectId,
) -> Result<Document, StorageError> {
    let mut stmt = conn
        .prepare("SELECT field_key, value FROM fields WHERE collection = ?1 AND doc_id = ?2")?;
    let rows = stmt.query_map(
        rusqlite::params![collection, id.as_bytes().as_slice()],
        |row| {
            let key: String = row.get(0)?;
            let val_bytes: Vec<u8> = row.get(1)?;
            Ok((key, val_bytes))
        },
    )?;

    let mut document = Document::new();
    for row in rows {
        let (key, val_bytes) = row?;
        let value = FieldValue::from_msgpack(&val_bytes)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        document.insert(key, value);
    }
    Ok(document)
}

/// Ids of the documents matching `query`, oldest first.
fn matching_ids(
    conn: &Connection,
    collection: &str,
    query: &Query,
    limit: Option<u32>,
) -> Result<Vec<ObjectId>, StorageError> {
    let mut sql = String::from("SELECT d.doc_id FROM documents d WHERE d.collection = ?1");
    let mut params = vec![Value::Text(collection.to_string())];

    for (field, value) in query.conditions() {
        let key_param = params.len() + 1;
        let value_param = params.len() + 2;
        sql.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM fields f WHERE f.collection = d.collection \
             AND f.doc_id = d.doc_id AND f.field_key = ?{key_param} AND f.value = ?{value_param})"
        ));
        params.push(Value::Text(field.clone()));
        params.push(Value::Blob(encode(value)?));
    }

    sql.push_str(" ORDER BY d.rowid");
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
        let id_bytes: Vec<u8> = row.get(0)?;
        Ok(id_bytes)
    })?;

    let mut ids = Vec::new();
    for row in rows {
        let id_bytes = row?;
        ids.push(ObjectId::from_bytes(to_array::<16>(id_bytes, "doc_id")?));
    }
    Ok(ids)
}

impl DocumentStore for SqliteStorage {
    fn insert_document(
        &mut self,
        collection: &str,
        id: ObjectId,
        document: &Document,
    ) -> Result<(), StorageError> {
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let result = tx.execute(
            "INSERT INTO documents (collection, doc_id) VALUES (?1, ?2)",
            rusqlite::params![collection, id.as_bytes().as_slice()],
        );
        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(StorageError::ConstraintViolation(format!(
                    "{collection} document {id} already exists"
                )));
            }
            Err(e) => return Err(StorageError::Sqlite(e)),
        }

        for (key, value) in document {
            tx.execute(
                "INSERT INTO fields (collection, doc_id, field_key, value) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![collection, id.as_bytes().as_slice(), key, encode(value)?],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn get_document(&self, collection: &str, id: ObjectId) -> Result<Document, StorageError> {
        if !document_exists(&self.conn, collection, id)? {
            return Err(StorageError::NotFound(format!("{collection} document {id}")));
        }
        read_fields(&self.conn, collection, id)
    }

    fn find_document(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<(ObjectId, Document), StorageError> {
        let id = matching_ids(&self.conn, collection, query, Some(1))?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::NotFound(format!("{collection} document matching {query:?}")))?;
        let document = read_fields(&self.conn, collection, id)?;
        Ok((id, document))
    }

    fn find_documents(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<(ObjectId, Document)>, StorageError> {
        let ids = matching_ids(&self.conn, collection, query, None)?;
        let mut result = Vec::with_capacity(ids.len());
        for id in ids {
            result.push((id, read_fields(&self.conn, collection, id)?));
        }
        Ok(result)
    }

    fn apply_update(
        &mut self,
        collection: &str,
        id: ObjectId,
        update: &MergeUpdate,
    ) -> Result<(), StorageError> {
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !document_exists(&tx, collection, id)? {
            return Err(StorageError::NotFound(format!("{collection} document {id}")));
        }

        for (key, value) in &update.set {
            tx.execute(
                "INSERT INTO fields (collection, doc_id, field_key, value) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(collection, doc_id, field_key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                rusqlite::params![collection, id.as_bytes().as_slice(), key, encode(value)?],
            )?;
        }

        if let Some(unset) = &update.unset {
            for key in unset {
                tx.execute(
                    "DELETE FROM fields WHERE collection = ?1 AND doc_id = ?2 AND field_key = ?3",
                    rusqlite::params![collection, id.as_bytes().as_slice(), key],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn ensure_unique(&mut self, collection: &str, field: &str) -> Result<(), StorageError> {
        let sql = crate::schema::unique_index_sql(collection, field)?;
        self.conn.execute_batch(&sql)?;
        Ok(())
    }

    fn document_count(&self, collection: &str) -> Result<u64, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            rusqlite::params![collection],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
