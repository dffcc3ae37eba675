//! Unit counts and signed adjustments.
//!
//! Stock is counted in whole units (boxes, pallets) and loose units (single
//! items outside a full box). The two counters are independent: a movement
//! may never borrow from one to cover the other.
//!
//! Each counter is bounded by [`Quantity::MAX_COUNTER`] so every change fits a
//! signed 64-bit delta and `total()` fits a `u64`.

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// A non-negative pair of counters.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quantity {
    #[serde(rename = "unitsNumber")]
    pub units: u64,
    #[serde(rename = "looseUnitsNumber")]
    pub loose_units: u64,
}

impl Quantity {
    pub const ZERO: Quantity = Quantity {
        units: 0,
        loose_units: 0,
    };

    /// Largest value either counter may hold.
    pub const MAX_COUNTER: u64 = i64::MAX as u64;

    pub fn new(units: u64, loose_units: u64) -> Self {
        Self { units, loose_units }
    }

    /// Exact for counters within `MAX_COUNTER`; saturates otherwise.
    pub fn total(&self) -> u64 {
        self.units.saturating_add(self.loose_units)
    }

    /// Reject counters a delta could not represent.
    pub fn check_bounds(&self) -> Result<(), LedgerError> {
        if self.units > Self::MAX_COUNTER || self.loose_units > Self::MAX_COUNTER {
            return Err(LedgerError::validation(format!(
                "quantity {self} exceeds the per-counter limit of {}",
                Self::MAX_COUNTER
            )));
        }
        Ok(())
    }

    pub fn is_zero(&self) -> bool {
        self.units == 0 && self.loose_units == 0
    }

    /// True when both counters cover `other` (no partial fulfilment).
    pub fn covers(&self, other: &Quantity) -> bool {
        self.units >= other.units && self.loose_units >= other.loose_units
    }

    /// Apply a signed delta, or `None` if either counter would go negative or
    /// past `MAX_COUNTER`.
    pub fn checked_apply(&self, delta: QuantityDelta) -> Option<Quantity> {
        let next = Quantity {
            units: self.units.checked_add_signed(delta.units)?,
            loose_units: self.loose_units.checked_add_signed(delta.loose_units)?,
        };
        next.check_bounds().ok()?;
        Some(next)
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}+{}", self.units, self.loose_units)
    }
}

/// Signed change to a [`Quantity`].
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantityDelta {
    pub units: i64,
    pub loose_units: i64,
}

impl QuantityDelta {
    pub const ZERO: QuantityDelta = QuantityDelta {
        units: 0,
        loose_units: 0,
    };

    /// `sign * quantity`, with `sign` either 1 or -1.
    ///
    /// Counters above `Quantity::MAX_COUNTER` saturate; callers bound-check
    /// quantities before turning them into deltas.
    pub fn signed(sign: i64, quantity: Quantity) -> Self {
        let negate = sign < 0;
        Self {
            units: signed_counter(negate, quantity.units),
            loose_units: signed_counter(negate, quantity.loose_units),
        }
    }

    /// `to - from`, counter by counter, saturating like [`QuantityDelta::signed`].
    pub fn between(from: Quantity, to: Quantity) -> Self {
        Self {
            units: counter_diff(from.units, to.units),
            loose_units: counter_diff(from.loose_units, to.loose_units),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.units == 0 && self.loose_units == 0
    }

    /// Counter-wise sum, or `None` on overflow.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        Some(Self {
            units: self.units.checked_add(rhs.units)?,
            loose_units: self.loose_units.checked_add(rhs.loose_units)?,
        })
    }

    /// The amount that must be available for this delta to apply.
    pub fn shortfall_demand(&self) -> Quantity {
        Quantity {
            units: if self.units < 0 { self.units.unsigned_abs() } else { 0 },
            loose_units: if self.loose_units < 0 {
                self.loose_units.unsigned_abs()
            } else {
                0
            },
        }
    }
}

fn signed_counter(negate: bool, counter: u64) -> i64 {
    let magnitude = i64::try_from(counter.min(Quantity::MAX_COUNTER)).unwrap_or(i64::MAX);
    if negate { -magnitude } else { magnitude }
}

fn counter_diff(from: u64, to: u64) -> i64 {
    let diff = i128::from(to) - i128::from(from);
    let limit = i128::from(i64::MAX);
    i64::try_from(diff.clamp(-limit, limit)).unwrap_or(0)
}

impl core::ops::Neg for QuantityDelta {
    type Output = QuantityDelta;

    fn neg(self) -> Self::Output {
        QuantityDelta {
            units: self.units.saturating_neg(),
            loose_units: self.loose_units.saturating_neg(),
        }
    }
}
