/// Database model definitions.
pub mod models;
/// Poll state storage and retrieval operations.
pub mod poll_store;
/// Storage abstraction layer for database operations.
pub mod storage;
/// Roster of provisioned voter accounts.
pub mod user_directory;
