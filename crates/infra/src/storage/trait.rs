use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockflow_core::{DocumentNumber, MovementId, MovementKind};
use stockflow_inventory::{LotProductSummary, Movement, StockKey, StockPosition};

/// Collections the ledger keeps documents in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    /// Uniqueness index: (kind, document number) -> movement id.
    DocumentNumbers,
    Movements,
    Stock,
    LotProducts,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::DocumentNumbers => "documentNumbers",
            Collection::Movements => "movements",
            Collection::Stock => "stock",
            Collection::LotProducts => "lotProducts",
        }
    }
}

/// Address of one document.
///
/// The derived ordering is the lock acquisition order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocumentKey {
    DocumentNumber {
        kind: MovementKind,
        number: DocumentNumber,
    },
    Movement(MovementId),
    Position(StockKey),
    Summary(StockKey),
}

impl DocumentKey {
    pub fn collection(&self) -> Collection {
        match self {
            DocumentKey::DocumentNumber { .. } => Collection::DocumentNumbers,
            DocumentKey::Movement(_) => Collection::Movements,
            DocumentKey::Position(_) => Collection::Stock,
            DocumentKey::Summary(_) => Collection::LotProducts,
        }
    }
}

impl core::fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let collection = self.collection().as_str();
        match self {
            DocumentKey::DocumentNumber { kind, number } => {
                write!(f, "{collection}/{kind}:{number}")
            }
            DocumentKey::Movement(id) => write!(f, "{collection}/{id}"),
            DocumentKey::Position(key) | DocumentKey::Summary(key) => {
                write!(f, "{collection}/{key}")
            }
        }
    }
}

/// A stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Document {
    DocumentIndex { movement_id: MovementId },
    Movement(Movement),
    Position(StockPosition),
    Summary(LotProductSummary),
}

impl Document {
    fn type_name(&self) -> &'static str {
        match self {
            Document::DocumentIndex { .. } => "documentIndex",
            Document::Movement(_) => "movement",
            Document::Position(_) => "position",
            Document::Summary(_) => "summary",
        }
    }

    fn mismatch(self, expected: &'static str) -> StorageError {
        StorageError::TypeMismatch(format!("expected {expected}, found {}", self.type_name()))
    }

    pub fn into_movement(self) -> Result<Movement, StorageError> {
        match self {
            Document::Movement(m) => Ok(m),
            other => Err(other.mismatch("movement")),
        }
    }

    pub fn into_position(self) -> Result<StockPosition, StorageError> {
        match self {
            Document::Position(p) => Ok(p),
            other => Err(other.mismatch("position")),
        }
    }

    pub fn into_summary(self) -> Result<LotProductSummary, StorageError> {
        match self {
            Document::Summary(s) => Ok(s),
            other => Err(other.mismatch("summary")),
        }
    }

    pub fn into_index(self) -> Result<MovementId, StorageError> {
        match self {
            Document::DocumentIndex { movement_id } => Ok(movement_id),
            other => Err(other.mismatch("documentIndex")),
        }
    }
}

/// Storage operation error.
///
/// These are **infrastructure errors** as opposed to ledger rule violations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The transaction lost a race and should be rerun from scratch.
    #[error("transaction conflict: {0}")]
    Conflict(String),

    /// The backend could not commit (timeout, connection loss).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A lock or the document map was poisoned by a panicking writer.
    #[error("storage poisoned: {0}")]
    Poisoned(String),

    /// The transaction touched a key it did not declare up front.
    #[error("key not declared for this transaction: {0}")]
    UndeclaredKey(String),

    /// A document had an unexpected shape.
    #[error("document type mismatch: {0}")]
    TypeMismatch(String),
}

impl StorageError {
    /// Contention and availability failures may succeed on a fresh attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Conflict(_) | StorageError::Unavailable(_))
    }
}

/// View of the store inside one atomic unit.
///
/// Writes are visible to later reads in the same transaction and reach the
/// store only if the whole unit succeeds.
pub trait Transaction {
    fn read(&self, key: &DocumentKey) -> Result<Option<Document>, StorageError>;
    fn write(&mut self, key: DocumentKey, document: Document) -> Result<(), StorageError>;
    fn delete(&mut self, key: &DocumentKey) -> Result<(), StorageError>;
}

/// Transactional document store.
///
/// ## Atomicity contract
///
/// `run_atomic(keys, f)`:
/// - isolates `f` from every other unit declaring any of the same keys
/// - commits every write made by `f` if it returns `Ok`, and none if it returns `Err`
/// - never blocks units whose key sets are disjoint
///
/// Implementations may use serializable transactions or key-level locks; when
/// locking, keys must be acquired in their `Ord` order.
pub trait Storage: Send + Sync {
    fn run_atomic<T, E, F>(&self, keys: &[DocumentKey], f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, E>,
        E: From<StorageError>;

    /// Read one committed document outside any transaction.
    fn get(&self, key: &DocumentKey) -> Result<Option<Document>, StorageError>;

    /// All committed documents of a collection, in key order.
    fn scan(&self, collection: Collection) -> Result<Vec<(DocumentKey, Document)>, StorageError>;
}

impl<S> Storage for Arc<S>
where
    S: Storage,
{
    fn run_atomic<T, E, F>(&self, keys: &[DocumentKey], f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, E>,
        E: From<StorageError>,
    {
        (**self).run_atomic(keys, f)
    }

    fn get(&self, key: &DocumentKey) -> Result<Option<Document>, StorageError> {
        (**self).get(key)
    }

    fn scan(&self, collection: Collection) -> Result<Vec<(DocumentKey, Document)>, StorageError> {
        (**self).scan(collection)
    }
}
