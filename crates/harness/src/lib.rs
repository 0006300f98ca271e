pub mod cloud;
pub mod shared;

pub use cloud::{init_tracing, TestCloud};
pub use shared::SharedStore;
