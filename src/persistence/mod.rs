//! The `persistence` module keeps broker state across restarts.
//!
//! `file_store` implements the backup-swap JSON documents, and `writer` runs
//! the background task that performs the writes off the request path.

pub mod file_store;
pub mod writer;

pub use file_store::{DurableStore, JsonDocument};
pub use writer::{PersistenceHandle, spawn_writer};
