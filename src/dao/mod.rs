/// Persisted row and document model definitions.
pub mod models;
/// Player persistence backends.
pub mod player_store;
/// Storage abstraction layer for database operations.
pub mod storage;
