use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};

use super::lock::KeyLocks;
use super::r#trait::{Collection, Document, DocumentKey, Storage, StorageError, Transaction};

/// In-memory transactional document store.
///
/// Atomic units lock their declared keys (in key order) for their whole
/// duration and buffer writes until the closure succeeds. Intended for
/// tests/dev and for embedding the ledger without a database.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    documents: RwLock<BTreeMap<DocumentKey, Document>>,
    locks: KeyLocks,
    failing_commits: AtomicU32,
    failing_reads: AtomicU32,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` commits fail with [`StorageError::Unavailable`].
    ///
    /// Simulates a backend that times out at commit time.
    pub fn fail_next_commits(&self, n: u32) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` calls to [`Storage::get`] fail with
    /// [`StorageError::Unavailable`]. Transactional reads are unaffected.
    pub fn fail_next_reads(&self, n: u32) {
        self.failing_reads.store(n, Ordering::SeqCst);
    }

    fn take_commit_failure(&self) -> bool {
        take_one(&self.failing_commits)
    }

    /// Write a document directly, bypassing transactions.
    ///
    /// Only for seeding fixtures and simulating out-of-band edits.
    pub fn put_raw(&self, key: DocumentKey, document: Document) -> Result<(), StorageError> {
        let mut docs = self
            .documents
            .write()
            .map_err(|_| StorageError::Poisoned("document map poisoned".to_string()))?;
        docs.insert(key, document);
        Ok(())
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

struct BufferedTransaction<'a> {
    declared: &'a [DocumentKey],
    committed: &'a RwLock<BTreeMap<DocumentKey, Document>>,
    /// `None` marks a pending delete.
    writes: BTreeMap<DocumentKey, Option<Document>>,
}

impl BufferedTransaction<'_> {
    fn ensure_declared(&self, key: &DocumentKey) -> Result<(), StorageError> {
        if self.declared.binary_search(key).is_err() {
            return Err(StorageError::UndeclaredKey(key.to_string()));
        }
        Ok(())
    }
}

impl Transaction for BufferedTransaction<'_> {
    fn read(&self, key: &DocumentKey) -> Result<Option<Document>, StorageError> {
        self.ensure_declared(key)?;
        if let Some(pending) = self.writes.get(key) {
            return Ok(pending.clone());
        }
        let docs = self
            .committed
            .read()
            .map_err(|_| StorageError::Poisoned("document map poisoned".to_string()))?;
        Ok(docs.get(key).cloned())
    }

    fn write(&mut self, key: DocumentKey, document: Document) -> Result<(), StorageError> {
        self.ensure_declared(&key)?;
        self.writes.insert(key, Some(document));
        Ok(())
    }

    fn delete(&mut self, key: &DocumentKey) -> Result<(), StorageError> {
        self.ensure_declared(key)?;
        self.writes.insert(key.clone(), None);
        Ok(())
    }
}

impl Storage for InMemoryStorage {
    fn run_atomic<T, E, F>(&self, keys: &[DocumentKey], f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, E>,
        E: From<StorageError>,
    {
        let mut keys = keys.to_vec();
        keys.sort();
        keys.dedup();

        // Held until the end of the function, after the commit.
        let _guard = self.locks.acquire(&keys)?;

        let mut tx = BufferedTransaction {
            declared: &keys,
            committed: &self.documents,
            writes: BTreeMap::new(),
        };
        let value = f(&mut tx)?;
        let writes = tx.writes;

        if self.take_commit_failure() {
            return Err(StorageError::Unavailable("commit failed".to_string()).into());
        }

        let mut docs = self
            .documents
            .write()
            .map_err(|_| StorageError::Poisoned("document map poisoned".to_string()))?;
        for (key, pending) in writes {
            match pending {
                Some(document) => {
                    docs.insert(key, document);
                }
                None => {
                    docs.remove(&key);
                }
            }
        }

        Ok(value)
    }

    fn get(&self, key: &DocumentKey) -> Result<Option<Document>, StorageError> {
        if take_one(&self.failing_reads) {
            return Err(StorageError::Unavailable(format!("read of {key} timed out")));
        }
        let docs = self
            .documents
            .read()
            .map_err(|_| StorageError::Poisoned("document map poisoned".to_string()))?;
        Ok(docs.get(key).cloned())
    }

    fn scan(&self, collection: Collection) -> Result<Vec<(DocumentKey, Document)>, StorageError> {
        let docs = self
            .documents
            .read()
            .map_err(|_| StorageError::Poisoned("document map poisoned".to_string()))?;
        Ok(docs
            .iter()
            .filter(|(k, _)| k.collection() == collection)
            .map(|(k, d)| (k.clone(), d.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockflow_core::MovementId;

    fn index_key(n: u8) -> DocumentKey {
        DocumentKey::DocumentNumber {
            kind: stockflow_core::MovementKind::Entry,
            number: stockflow_core::DocumentNumber::parse(format!("E{n}")).unwrap(),
        }
    }

    fn index_doc() -> Document {
        Document::DocumentIndex {
            movement_id: MovementId::new(),
        }
    }

    #[test]
    fn commits_writes_on_success() {
        let storage = InMemoryStorage::new();
        let doc = index_doc();
        storage
            .run_atomic(&[index_key(1)], |tx| {
                tx.write(index_key(1), doc.clone())?;
                // Read-your-writes inside the unit.
                assert_eq!(tx.read(&index_key(1))?, Some(doc.clone()));
                Ok::<_, StorageError>(())
            })
            .unwrap();
        assert_eq!(storage.get(&index_key(1)).unwrap(), Some(doc));
    }

    #[test]
    fn discards_writes_on_error() {
        let storage = InMemoryStorage::new();
        let result: Result<(), StorageError> = storage.run_atomic(&[index_key(1)], |tx| {
            tx.write(index_key(1), index_doc())?;
            Err(StorageError::Conflict("abort".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(storage.get(&index_key(1)).unwrap(), None);
    }

    #[test]
    fn undeclared_keys_are_refused() {
        let storage = InMemoryStorage::new();
        let result: Result<(), StorageError> = storage.run_atomic(&[index_key(1)], |tx| {
            tx.write(index_key(2), index_doc())?;
            Ok(())
        });
        assert!(matches!(result, Err(StorageError::UndeclaredKey(_))));
    }

    #[test]
    fn injected_commit_failure_discards_writes_once() {
        let storage = InMemoryStorage::new();
        storage.fail_next_commits(1);

        let first: Result<(), StorageError> = storage.run_atomic(&[index_key(1)], |tx| {
            tx.write(index_key(1), index_doc())
        });
        assert!(matches!(first, Err(StorageError::Unavailable(_))));
        assert_eq!(storage.get(&index_key(1)).unwrap(), None);

        let second: Result<(), StorageError> = storage.run_atomic(&[index_key(1)], |tx| {
            tx.write(index_key(1), index_doc())
        });
        assert!(second.is_ok());
        assert!(storage.get(&index_key(1)).unwrap().is_some());
    }

    #[test]
    fn injected_read_failure_hits_plain_reads_only() {
        let storage = InMemoryStorage::new();
        storage.put_raw(index_key(1), index_doc()).unwrap();
        storage.fail_next_reads(1);

        let inside: Result<bool, StorageError> =
            storage.run_atomic(&[index_key(1)], |tx| Ok(tx.read(&index_key(1))?.is_some()));
        assert_eq!(inside, Ok(true));

        assert!(matches!(storage.get(&index_key(1)), Err(StorageError::Unavailable(_))));
        assert!(storage.get(&index_key(1)).unwrap().is_some());
    }

    #[test]
    fn delete_removes_committed_document() {
        let storage = InMemoryStorage::new();
        storage.put_raw(index_key(1), index_doc()).unwrap();
        storage
            .run_atomic(&[index_key(1)], |tx| tx.delete(&index_key(1)))
            .unwrap();
        assert!(storage.scan(Collection::DocumentNumbers).unwrap().is_empty());
    }

    #[test]
    fn documents_serialize_with_type_tag() {
        let json = serde_json::to_value(Document::DocumentIndex {
            movement_id: MovementId::new(),
        })
        .unwrap();
        assert_eq!(json["type"], "documentIndex");
    }
}
