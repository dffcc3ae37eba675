//! Discriminators shared by requests, records and errors.

use serde::{Deserialize, Serialize};

/// Direction of a movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MovementKind {
    /// Goods received: increases stock.
    Entry,
    /// Goods shipped: decreases stock.
    Dispatch,
}

impl MovementKind {
    /// +1 for entries, -1 for dispatches.
    pub fn sign(self) -> i64 {
        match self {
            MovementKind::Entry => 1,
            MovementKind::Dispatch => -1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::Entry => "entry",
            MovementKind::Dispatch => "dispatch",
        }
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog entity families the ledger validates references against.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReferenceKind {
    Product,
    Lot,
    Place,
    Supplier,
    Transporter,
}

impl ReferenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReferenceKind::Product => "product",
            ReferenceKind::Lot => "lot",
            ReferenceKind::Place => "place",
            ReferenceKind::Supplier => "supplier",
            ReferenceKind::Transporter => "transporter",
        }
    }
}

impl core::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
