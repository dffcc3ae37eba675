use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{LedgerError, LotId, ProductId, Quantity, QuantityDelta};

/// The (product, lot) pair a balance is kept for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockKey {
    pub product_id: ProductId,
    pub lot_id: LotId,
}

impl StockKey {
    pub fn new(product_id: ProductId, lot_id: LotId) -> Self {
        Self { product_id, lot_id }
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.product_id, self.lot_id)
    }
}

/// Current balance of one (product, lot) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockPosition {
    key: StockKey,
    on_hand: Quantity,
    /// Number of movement records that adjusted this position.
    movement_refs: u64,
    updated_at: DateTime<Utc>,
}

impl StockPosition {
    /// A zero balance for a pair seen for the first time.
    pub fn open(key: StockKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            on_hand: Quantity::ZERO,
            movement_refs: 0,
            updated_at: now,
        }
    }

    pub fn key(&self) -> &StockKey {
        &self.key
    }

    pub fn on_hand(&self) -> Quantity {
        self.on_hand
    }

    pub fn movement_refs(&self) -> u64 {
        self.movement_refs
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Return the position after `delta`.
    ///
    /// Fails with `InsufficientStock` if either counter would go below zero, and
    /// with `Validation` if one would pass `Quantity::MAX_COUNTER`.
    pub fn adjusted(&self, delta: QuantityDelta, now: DateTime<Utc>) -> Result<Self, LedgerError> {
        let on_hand = self.on_hand.checked_apply(delta).ok_or_else(|| {
            let required = delta.shortfall_demand();
            if self.on_hand.covers(&required) {
                LedgerError::validation(format!(
                    "position {} would exceed the per-counter limit of {}",
                    self.key,
                    Quantity::MAX_COUNTER
                ))
            } else {
                LedgerError::InsufficientStock {
                    product_id: self.key.product_id.clone(),
                    lot_id: self.key.lot_id.clone(),
                    available: self.on_hand,
                    required,
                }
            }
        })?;

        Ok(Self {
            key: self.key.clone(),
            on_hand,
            movement_refs: self.movement_refs,
            updated_at: now,
        })
    }

    /// Record one more movement referencing this position.
    pub fn referenced(mut self) -> Self {
        self.movement_refs += 1;
        self
    }

    /// Drop one movement reference.
    pub fn dereferenced(mut self) -> Result<Self, LedgerError> {
        self.movement_refs = self.movement_refs.checked_sub(1).ok_or_else(|| {
            LedgerError::inconsistent(format!("position {} has no movement references", self.key))
        })?;
        Ok(self)
    }

    /// Zero balance and nothing points at it.
    pub fn is_removable(&self) -> bool {
        self.on_hand.is_zero() && self.movement_refs == 0
    }

    pub fn summary(&self) -> LotProductSummary {
        LotProductSummary::mirror(self)
    }
}

/// Lot-centric mirror of a [`StockPosition`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotProductSummary {
    pub product_id: ProductId,
    pub lot_id: LotId,
    pub units_number: u64,
    pub loose_units_number: u64,
    pub total_units: u64,
}

impl LotProductSummary {
    pub fn mirror(position: &StockPosition) -> Self {
        let q = position.on_hand();
        Self {
            product_id: position.key().product_id.clone(),
            lot_id: position.key().lot_id.clone(),
            units_number: q.units,
            loose_units_number: q.loose_units,
            total_units: q.total(),
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id.clone(), self.lot_id.clone())
    }

    pub fn mirrors(&self, position: &StockPosition) -> bool {
        *self == Self::mirror(position)
    }
}
