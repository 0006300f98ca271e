pub mod collection;
pub mod error;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use collection::{Collection, Database};
pub use error::{parse_error, DatabaseError, StorageError};
pub use sqlite::SqliteStorage;
pub use traits::*;
