//! Reference lookups against the product/lot/place/party catalogs.
//!
//! The catalogs themselves are owned by other modules; the ledger only asks
//! whether an id exists.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use stockflow_core::ReferenceKind;

/// Existence checks for catalog entities.
pub trait Catalog: Send + Sync {
    fn exists(&self, kind: ReferenceKind, id: &str) -> bool;
}

impl<C> Catalog for Arc<C>
where
    C: Catalog + ?Sized,
{
    fn exists(&self, kind: ReferenceKind, id: &str) -> bool {
        (**self).exists(kind, id)
    }
}

/// In-memory catalog for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    entries: RwLock<HashSet<(ReferenceKind, String)>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, kind: ReferenceKind, id: impl Into<String>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert((kind, id.into()));
        }
    }

    pub fn remove(&self, kind: ReferenceKind, id: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&(kind, id.to_string()));
        }
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(self, kind: ReferenceKind, id: impl Into<String>) -> Self {
        self.register(kind, id);
        self
    }
}

impl Catalog for InMemoryCatalog {
    fn exists(&self, kind: ReferenceKind, id: &str) -> bool {
        match self.entries.read() {
            Ok(entries) => entries.contains(&(kind, id.to_string())),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_are_scoped_by_kind() {
        let catalog = InMemoryCatalog::new().with(ReferenceKind::Product, "x1");
        assert!(catalog.exists(ReferenceKind::Product, "x1"));
        assert!(!catalog.exists(ReferenceKind::Place, "x1"));
    }

    #[test]
    fn removed_entries_no_longer_resolve() {
        let catalog = InMemoryCatalog::new().with(ReferenceKind::Lot, "l1");
        catalog.remove(ReferenceKind::Lot, "l1");
        assert!(!catalog.exists(ReferenceKind::Lot, "l1"));
    }
}
