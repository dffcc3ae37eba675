//! Transactional document storage boundary.
//!
//! The ledger never talks to a concrete database. It declares the documents
//! an operation touches and runs its read/validate/write sequence through
//! [`Storage::run_atomic`].

pub mod in_memory;
mod lock;
pub mod r#trait;

pub use in_memory::InMemoryStorage;
pub use r#trait::{Collection, Document, DocumentKey, Storage, StorageError, Transaction};
