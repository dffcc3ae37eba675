//! Infrastructure layer: storage seam, catalog lookups, configuration, and the
//! ledger service that ties them together.

pub mod catalog;
pub mod config;
pub mod ledger;
pub mod storage;


pub use catalog::{Catalog, InMemoryCatalog};
pub use config::LedgerConfig;
pub use ledger::InventoryLedger;
pub use storage::{InMemoryStorage, Storage, StorageError};
