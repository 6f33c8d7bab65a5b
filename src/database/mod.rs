// file: src/database/mod.rs
// description: storage module exports
// reference: internal module structure

pub mod memory;
pub mod sqlite;
pub mod store;
#[cfg(test)]
pub(crate) mod testing;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{CaseBundle, CaseStore, JobStore, import_bundle};
