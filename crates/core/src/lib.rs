//! `stockflow-core` — ledger foundation building blocks.
//!
//! This crate contains **pure** primitives (no infrastructure concerns):
//! identifiers, quantities, and the error taxonomy shared by every layer.

pub mod error;
pub mod id;
pub mod kind;
pub mod quantity;

pub use error::{LedgerError, LedgerResult};
pub use id::{DocumentNumber, LotId, MovementId, PlaceId, ProductId, SupplierId, TransporterId};
pub use kind::{MovementKind, ReferenceKind};
pub use quantity::{Quantity, QuantityDelta};
