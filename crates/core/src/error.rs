//! Ledger error model.

use thiserror::Error;

use crate::id::{DocumentNumber, LotId, MovementId, ProductId};
use crate::kind::{MovementKind, ReferenceKind};
use crate::quantity::Quantity;

/// Result type used across the ledger.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Caller-facing ledger error.
///
/// Every variant except [`LedgerError::TransientStorage`] is permanent: retrying
/// the same request unchanged yields the same failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The document number is already used by another movement of the same kind.
    #[error("document number '{document_number}' already used by a {kind} movement")]
    DuplicateDocument {
        kind: MovementKind,
        document_number: DocumentNumber,
    },

    /// A referenced catalog entity does not exist.
    #[error("unknown {which} '{id}'")]
    UnknownReference { which: ReferenceKind, id: String },

    /// The movement would drive a stock position below zero.
    #[error(
        "insufficient stock for {product_id}/{lot_id} (available: {available}, required: {required})"
    )]
    InsufficientStock {
        product_id: ProductId,
        lot_id: LotId,
        available: Quantity,
        required: Quantity,
    },

    /// An attempt was made to change a field fixed at creation.
    #[error("field '{0}' cannot be changed after creation")]
    ImmutableField(&'static str),

    /// Stored state contradicts the movement history. Not user-recoverable.
    #[error("inconsistent ledger state: {0}")]
    InconsistentState(String),

    /// The storage transaction could not commit; the whole operation may be retried.
    #[error("transient storage failure: {0}")]
    TransientStorage(String),

    /// The request is malformed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// No movement exists with this id.
    #[error("movement {0} not found")]
    MovementNotFound(MovementId),

    /// An identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn inconsistent(msg: impl Into<String>) -> Self {
        Self::InconsistentState(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientStorage(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn unknown(which: ReferenceKind, id: impl Into<String>) -> Self {
        Self::UnknownReference {
            which,
            id: id.into(),
        }
    }

    /// Whether the caller may rerun the whole operation from scratch.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStorage(_))
    }

    /// Whether the error signals corrupted state that should page someone.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InconsistentState(_) | Self::ImmutableField(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_storage_is_retryable() {
        assert!(LedgerError::transient("commit timed out").is_retryable());
        assert!(!LedgerError::validation("empty").is_retryable());
        assert!(!LedgerError::inconsistent("negative").is_retryable());
        assert!(!LedgerError::ImmutableField("kind").is_retryable());
    }

    #[test]
    fn fatal_errors_are_flagged() {
        assert!(LedgerError::inconsistent("negative").is_fatal());
        assert!(LedgerError::ImmutableField("documentNumber").is_fatal());
        assert!(!LedgerError::transient("x").is_fatal());
    }

    #[test]
    fn insufficient_stock_message_names_the_pair() {
        let err = LedgerError::InsufficientStock {
            product_id: ProductId::new("p1"),
            lot_id: LotId::new("l1"),
            available: Quantity::new(3, 0),
            required: Quantity::new(5, 0),
        };
        let msg = err.to_string();
        assert!(msg.contains("p1/l1"));
        assert!(msg.contains("3+0"));
        assert!(msg.contains("5+0"));
    }
}
