//! Event timeline and profile store backends for Perceptor.
//!
//! Both backends enforce the two dedup rules AT INSERT TIME and classify
//! violations as [`perceptor_core::InsertOutcome::Duplicate`], so callers
//! never need a read-before-write check.

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
