pub mod error;
pub mod field_value;
pub mod fields;
pub mod ids;

pub use error::CoreError;
pub use field_value::FieldValue;
pub use fields::{Document, FieldDescriptor, FieldSet, MergeUpdate, Persist};
pub use ids::ObjectId;
