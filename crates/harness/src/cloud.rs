use nimbus_core::{Document, ObjectId, Persist};
use nimbus_instance::Instance;
use nimbus_storage::{Database, DocumentStore, SqliteStorage, StorageError};

/// Installs a fmt subscriber that writes through the test harness. Safe to
/// call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// One in-memory store plus shared fixture references.
pub struct TestCloud {
    pub db: Database<SqliteStorage>,
    pub organization: ObjectId,
    pub zone: ObjectId,
    pub node: ObjectId,
    pub image: ObjectId,
}

impl TestCloud {
    pub fn new() -> Result<Self, StorageError> {
        init_tracing();
        Ok(Self {
            db: Database::new(SqliteStorage::open_in_memory()?),
            organization: ObjectId::new(),
            zone: ObjectId::new(),
            node: ObjectId::new(),
            image: ObjectId::new(),
        })
    }

    /// An unpersisted instance with every required reference set.
    pub fn draft(&self, name: &str) -> Instance {
        Instance {
            organization: Some(self.organization),
            zone: Some(self.zone),
            node: Some(self.node),
            image: Some(self.image),
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Validates and inserts a new instance.
    pub fn create_instance(&mut self, name: &str) -> Result<Instance, Box<dyn std::error::Error>> {
        let mut instance = self.draft(name);
        instance.validate()?;
        instance.insert(&mut self.db)?;
        Ok(instance)
    }

    /// The raw stored document, bypassing entity decoding.
    pub fn stored(&self, id: ObjectId) -> Result<Document, StorageError> {
        self.db.store().get_document(Instance::COLLECTION, id)
    }
}
