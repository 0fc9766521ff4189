//! State store backends.
//!
//! - [`SqliteStore`]: durable store used for live runs.
//! - [`MemoryStore`]: process-local store for tests and dry runs.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
