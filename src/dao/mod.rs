/// Database model definitions.
pub mod models;
/// Storage error types shared by every backend.
pub mod storage;
/// Storage traits and their backends.
pub mod store;
