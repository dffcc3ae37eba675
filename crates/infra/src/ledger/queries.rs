//! Read side of the ledger: movement history and balances.
//!
//! Queries read committed documents without locking; they may observe a
//! state one commit behind a concurrent writer, never a half-applied one.

use std::collections::HashMap;

use stockflow_core::{LedgerError, LedgerResult, LotId, MovementId, MovementKind};
use stockflow_inventory::{LotProductSummary, Movement, StockKey, StockPosition};

use super::InventoryLedger;
use crate::catalog::Catalog;
use crate::storage::{Collection, DocumentKey, Storage};

impl<S, C> InventoryLedger<S, C>
where
    S: Storage,
    C: Catalog,
{
    pub fn movement(&self, movement_id: MovementId) -> LedgerResult<Movement> {
        self.load_movement(movement_id)
    }

    pub fn position(&self, key: &StockKey) -> LedgerResult<Option<StockPosition>> {
        match self.storage.get(&DocumentKey::Position(key.clone()))? {
            Some(doc) => Ok(Some(doc.into_position()?)),
            None => Ok(None),
        }
    }

    pub fn summary(&self, key: &StockKey) -> LedgerResult<Option<LotProductSummary>> {
        match self.storage.get(&DocumentKey::Summary(key.clone()))? {
            Some(doc) => Ok(Some(doc.into_summary()?)),
            None => Ok(None),
        }
    }

    /// Movements that currently adjust `key`, oldest first.
    pub fn history(&self, key: &StockKey) -> LedgerResult<Vec<Movement>> {
        let mut movements: Vec<Movement> = self
            .all_movements()?
            .into_iter()
            .filter(|m| m.key() == *key)
            .collect();
        movements.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(movements)
    }

    /// Every movement of one kind, oldest first.
    pub fn movements_by_kind(&self, kind: MovementKind) -> LedgerResult<Vec<Movement>> {
        let mut movements: Vec<Movement> = self
            .all_movements()?
            .into_iter()
            .filter(|m| m.kind == kind)
            .collect();
        movements.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(movements)
    }

    /// Lot listing: every product currently held in `lot_id`.
    pub fn lot_summaries(&self, lot_id: &LotId) -> LedgerResult<Vec<LotProductSummary>> {
        let mut summaries = Vec::new();
        for (_, doc) in self.storage.scan(Collection::LotProducts)? {
            let summary = doc.into_summary()?;
            if summary.lot_id == *lot_id {
                summaries.push(summary);
            }
        }
        summaries.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        Ok(summaries)
    }

    /// Audit the whole store.
    ///
    /// Checks that every position has a mirroring summary (and vice versa) and
    /// that every position's reference count and balance match its movements.
    pub fn verify_consistency(&self) -> LedgerResult<()> {
        let mut summaries: HashMap<StockKey, LotProductSummary> = HashMap::new();
        for (_, doc) in self.storage.scan(Collection::LotProducts)? {
            let summary = doc.into_summary()?;
            summaries.insert(summary.key(), summary);
        }

        // (count, net units, net loose units). Partial sums may leave the i64 range.
        let mut refs: HashMap<StockKey, (u64, i128, i128)> = HashMap::new();
        for movement in self.all_movements()? {
            let effect = movement.effect();
            let entry = refs.entry(movement.key()).or_default();
            entry.0 += 1;
            entry.1 += i128::from(effect.units);
            entry.2 += i128::from(effect.loose_units);
        }

        for (_, doc) in self.storage.scan(Collection::Stock)? {
            let position = doc.into_position()?;
            let key = position.key().clone();

            match summaries.remove(&key) {
                Some(summary) if summary.mirrors(&position) => {}
                Some(_) => {
                    return Err(LedgerError::inconsistent(format!(
                        "lot summary for {key} does not mirror its position"
                    )));
                }
                None => {
                    return Err(LedgerError::inconsistent(format!(
                        "position {key} has no lot summary"
                    )));
                }
            }

            let (count, net_units, net_loose) = refs.remove(&key).unwrap_or_default();
            if position.movement_refs() != count {
                return Err(LedgerError::inconsistent(format!(
                    "position {key} counts {} movements, found {count}",
                    position.movement_refs()
                )));
            }
            let on_hand = position.on_hand();
            if (net_units, net_loose)
                != (i128::from(on_hand.units), i128::from(on_hand.loose_units))
            {
                return Err(LedgerError::inconsistent(format!(
                    "position {key} holds {on_hand} but its movements net to {net_units}+{net_loose}"
                )));
            }
        }

        if let Some(key) = summaries.keys().next() {
            return Err(LedgerError::inconsistent(format!(
                "lot summary {key} has no position"
            )));
        }
        if let Some(key) = refs.keys().next() {
            return Err(LedgerError::inconsistent(format!(
                "movements reference missing position {key}"
            )));
        }
        Ok(())
    }

    fn all_movements(&self) -> LedgerResult<Vec<Movement>> {
        self.storage
            .scan(Collection::Movements)?
            .into_iter()
            .map(|(_, doc)| doc.into_movement().map_err(LedgerError::from))
            .collect()
    }
}
