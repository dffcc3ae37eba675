//! Inventory ledger domain model.
//!
//! This crate contains the stock rules for entries and dispatches, implemented
//! purely as deterministic domain logic (no IO, no locking, no storage).

pub mod movement;
pub mod position;

pub use movement::{Movement, MovementRequest, PositionRef, Revision};
pub use position::{LotProductSummary, StockKey, StockPosition};
