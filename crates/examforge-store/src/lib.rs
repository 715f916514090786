//! Attempt store backends for examforge.
//!
//! Both backends implement [`examforge_core::traits::AttemptStore`]:
//! - [`MemoryStore`]: process-local, used in tests and for throwaway servers
//! - [`SqliteStore`]: durable single-file storage

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
