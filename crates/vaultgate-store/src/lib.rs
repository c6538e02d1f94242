//! Storage layer for access records.
//!
//! This crate provides persistence for access records with two backends:
//!
//! - [`SqliteStore`]: SQLite-backed, the primary production store
//! - [`MemoryStore`]: in-memory, for tests
//!
//! Both implement the [`AccessRecordStore`] trait, which is what the
//! manager layer programs against. The trait's contract is strict about
//! atomicity: counters are increment-and-fetch, records are written
//! whole, and the sweep re-checks logical status before deleting.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{AccessRecordStore, CounterField, UpsertOutcome};
