//! Inventory ledger service.
//!
//! Applies, revises and retracts entry/dispatch movements against stock
//! positions. Each operation:
//!
//! ```text
//! Request
//!   ↓
//! 1. Shape validation (no IO)
//!   ↓
//! 2. Catalog reference checks (outside the critical section)
//!   ↓
//! 3. Storage::run_atomic over the touched documents:
//!      read position + summary + movement, validate, write all or nothing
//!   ↓
//! 4. Retry the whole unit on storage conflicts, up to `max_attempts`
//! ```
//!
//! A movement's position and its lot summary are always written in the same
//! unit, so after every call (success or failure) each summary mirrors its
//! position.

mod queries;

use chrono::Utc;
use tracing::{debug, error, info, info_span, warn};

use stockflow_core::{
    LedgerError, LedgerResult, LotId, MovementId, MovementKind, Quantity, QuantityDelta,
    ReferenceKind,
};
use stockflow_inventory::{
    LotProductSummary, Movement, MovementRequest, PositionRef, Revision, StockKey, StockPosition,
};

use crate::catalog::Catalog;
use crate::config::LedgerConfig;
use crate::storage::{Document, DocumentKey, Storage, StorageError, Transaction};

impl From<StorageError> for LedgerError {
    fn from(value: StorageError) -> Self {
        if value.is_retryable() {
            LedgerError::transient(value.to_string())
        } else {
            LedgerError::inconsistent(value.to_string())
        }
    }
}

/// Failure of a single attempt: either final (ledger rule) or possibly
/// transient (storage).
#[derive(Debug)]
enum AttemptError {
    Ledger(LedgerError),
    Storage(StorageError),
}

impl From<LedgerError> for AttemptError {
    fn from(value: LedgerError) -> Self {
        AttemptError::Ledger(value)
    }
}

impl From<StorageError> for AttemptError {
    fn from(value: StorageError) -> Self {
        AttemptError::Storage(value)
    }
}

type AttemptResult<T> = Result<T, AttemptError>;

/// Stock ledger over an injected store and catalog.
#[derive(Debug)]
pub struct InventoryLedger<S, C> {
    storage: S,
    catalog: C,
    config: LedgerConfig,
}

impl<S, C> InventoryLedger<S, C> {
    pub fn new(storage: S, catalog: C) -> Self {
        Self::with_config(storage, catalog, LedgerConfig::default())
    }

    pub fn with_config(storage: S, catalog: C, config: LedgerConfig) -> Self {
        Self {
            storage,
            catalog,
            config,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn config(&self) -> LedgerConfig {
        self.config
    }

    pub fn into_parts(self) -> (S, C) {
        (self.storage, self.catalog)
    }
}

impl<S, C> InventoryLedger<S, C>
where
    S: Storage,
    C: Catalog,
{
    /// Record a new entry or dispatch and adjust its stock position.
    pub fn apply(&self, request: MovementRequest) -> LedgerResult<Movement> {
        let span = info_span!(
            "ledger.apply",
            kind = %request.kind,
            document_number = %request.document_number,
            product_id = %request.product_id,
        );
        let _enter = span.enter();

        let result = self.apply_inner(&request);
        log_outcome("apply", &result);
        result
    }

    fn apply_inner(&self, request: &MovementRequest) -> LedgerResult<Movement> {
        request.validate()?;

        let index_key = DocumentKey::DocumentNumber {
            kind: request.kind,
            number: request.document_number.clone(),
        };

        // Fast path so a duplicate is reported before reference errors; the
        // authoritative check runs again inside the atomic unit.
        if self.storage.get(&index_key)?.is_some() {
            return Err(duplicate(request));
        }

        self.require(ReferenceKind::Product, request.product_id.as_str())?;
        if let Some(place_id) = &request.place_id {
            self.require(ReferenceKind::Place, place_id.as_str())?;
        }

        let lot_id = match (&request.lot_id, request.kind) {
            (Some(lot_id), MovementKind::Entry) => {
                let key = StockKey::new(request.product_id.clone(), lot_id.clone());
                self.require_lot(&key)?;
                lot_id.clone()
            }
            (Some(lot_id), MovementKind::Dispatch) => lot_id.clone(),
            (None, _) => {
                let lot_id = LotId::mint();
                debug!(lot_id = %lot_id, "minted lot for entry");
                lot_id
            }
        };

        self.require(ReferenceKind::Supplier, request.counterparty_id.as_str())?;
        if let Some(transporter_id) = &request.transporter_id {
            self.require(ReferenceKind::Transporter, transporter_id.as_str())?;
        }

        let key = StockKey::new(request.product_id.clone(), lot_id.clone());
        let movement_id = MovementId::new();
        let keys = [
            index_key.clone(),
            DocumentKey::Movement(movement_id),
            DocumentKey::Position(key.clone()),
            DocumentKey::Summary(key.clone()),
        ];

        self.with_retries("apply", || {
            self.storage.run_atomic::<_, AttemptError, _>(&keys, |tx| {
                if tx.read(&index_key)?.is_some() {
                    return Err(duplicate(request).into());
                }

                let now = Utc::now();
                let position = match load_position(tx, &key)? {
                    Some(position) => position,
                    None if request.kind == MovementKind::Dispatch => {
                        return Err(LedgerError::InsufficientStock {
                            product_id: key.product_id.clone(),
                            lot_id: key.lot_id.clone(),
                            available: Quantity::ZERO,
                            required: request.quantity,
                        }
                        .into());
                    }
                    None => StockPosition::open(key.clone(), now),
                };

                let on_hand_before = position.on_hand();
                let next = position.adjusted(request.effect(), now)?.referenced();
                let movement =
                    Movement::record(movement_id, request, lot_id.clone(), on_hand_before, now);

                store_position(tx, next)?;
                tx.write(
                    DocumentKey::Movement(movement_id),
                    Document::Movement(movement.clone()),
                )?;
                tx.write(index_key.clone(), Document::DocumentIndex { movement_id })?;
                Ok(movement)
            })
        })
    }

    /// Replace the mutable fields of a movement, adjusting stock by the difference.
    pub fn revise(&self, movement_id: MovementId, revision: Revision) -> LedgerResult<Movement> {
        let span = info_span!("ledger.revise", movement_id = %movement_id);
        let _enter = span.enter();

        let result = self.revise_inner(movement_id, &revision);
        log_outcome("revise", &result);
        result
    }

    fn revise_inner(&self, movement_id: MovementId, revision: &Revision) -> LedgerResult<Movement> {
        let current = self.load_movement(movement_id)?;
        current.check_revision(revision)?;

        self.require(ReferenceKind::Product, revision.product_id.as_str())?;
        if let Some(place_id) = &revision.place_id {
            self.require(ReferenceKind::Place, place_id.as_str())?;
        }
        let new_key = revision.key();
        if current.kind == MovementKind::Entry && new_key.lot_id != current.lot_id {
            self.require_lot(&new_key)?;
        }

        self.with_retries("revise", || {
            let snapshot = self.snapshot(movement_id)?;
            let old_key = snapshot.key();
            let keys = [
                DocumentKey::Movement(movement_id),
                DocumentKey::Position(old_key.clone()),
                DocumentKey::Summary(old_key.clone()),
                DocumentKey::Position(new_key.clone()),
                DocumentKey::Summary(new_key.clone()),
            ];

            self.storage.run_atomic::<_, AttemptError, _>(&keys, |tx| {
                let movement = load_movement_in(tx, movement_id)?;
                if movement.key() != old_key {
                    return Err(StorageError::Conflict(format!(
                        "movement {movement_id} moved to {} during revision",
                        movement.key()
                    ))
                    .into());
                }

                let now = Utc::now();
                let moved = old_key != new_key;
                let mut new_on_hand_before = None;
                let mut updated = Vec::with_capacity(2);

                // Compute every new balance before writing anything.
                for (key, delta) in movement.revision_effects(revision) {
                    let position = match load_position(tx, &key)? {
                        Some(position) => position,
                        None if key == new_key && moved => {
                            if delta.units < 0 || delta.loose_units < 0 {
                                return Err(missing_stock(&key, delta).into());
                            }
                            StockPosition::open(key.clone(), now)
                        }
                        None => {
                            return Err(LedgerError::inconsistent(format!(
                                "movement {movement_id} references missing position {key}"
                            ))
                            .into());
                        }
                    };

                    if key == new_key && moved {
                        new_on_hand_before = Some(position.on_hand());
                    }

                    let mut next = position.adjusted(delta, now)?;
                    if moved {
                        next = if key == new_key {
                            next.referenced()
                        } else {
                            next.dereferenced()?
                        };
                    }
                    updated.push(next);
                }

                for position in updated {
                    if position.is_removable() {
                        remove_position(tx, position.key())?;
                    } else {
                        store_position(tx, position)?;
                    }
                }

                let mut next = movement.revised(revision, now);
                if let Some(on_hand_before) = new_on_hand_before {
                    next.position_ref = PositionRef {
                        key: new_key.clone(),
                        on_hand_before,
                    };
                }
                tx.write(DocumentKey::Movement(movement_id), Document::Movement(next.clone()))?;
                Ok(next)
            })
        })
    }

    /// Undo a movement's effect on stock and delete it.
    pub fn retract(&self, movement_id: MovementId) -> LedgerResult<()> {
        let span = info_span!("ledger.retract", movement_id = %movement_id);
        let _enter = span.enter();

        let result = self.retract_inner(movement_id);
        log_outcome("retract", &result);
        result
    }

    fn retract_inner(&self, movement_id: MovementId) -> LedgerResult<()> {
        self.with_retries("retract", || {
            let snapshot = self.snapshot(movement_id)?;
            let key = snapshot.key();
            let index_key = DocumentKey::DocumentNumber {
                kind: snapshot.kind,
                number: snapshot.document_number.clone(),
            };
            let keys = [
                index_key.clone(),
                DocumentKey::Movement(movement_id),
                DocumentKey::Position(key.clone()),
                DocumentKey::Summary(key.clone()),
            ];

            self.storage.run_atomic::<_, AttemptError, _>(&keys, |tx| {
                let movement = load_movement_in(tx, movement_id)?;
                if movement.key() != key {
                    return Err(StorageError::Conflict(format!(
                        "movement {movement_id} moved to {} during retraction",
                        movement.key()
                    ))
                    .into());
                }

                let now = Utc::now();
                let position = load_position(tx, &key)?.ok_or_else(|| {
                    LedgerError::inconsistent(format!(
                        "movement {movement_id} references missing position {key}"
                    ))
                })?;

                let next = position
                    .adjusted(-movement.effect(), now)
                    .map_err(|err| match err {
                        LedgerError::InsufficientStock {
                            available,
                            required,
                            ..
                        } => LedgerError::inconsistent(format!(
                            "retracting {} {} would drive {key} negative (on hand: {available}, to reverse: {required})",
                            movement.kind, movement.document_number
                        )),
                        other => other,
                    })?
                    .dereferenced()?;

                if next.is_removable() {
                    remove_position(tx, &key)?;
                } else {
                    store_position(tx, next)?;
                }

                if let Some(indexed) = tx.read(&index_key)? {
                    if indexed.into_index()? == movement_id {
                        tx.delete(&index_key)?;
                    }
                }
                tx.delete(&DocumentKey::Movement(movement_id))?;
                Ok(())
            })
        })
    }

    fn require(&self, kind: ReferenceKind, id: &str) -> LedgerResult<()> {
        if self.catalog.exists(kind, id) {
            Ok(())
        } else {
            Err(LedgerError::unknown(kind, id))
        }
    }

    /// A lot is known if the catalog has it or the ledger already minted a
    /// position for it.
    fn require_lot(&self, key: &StockKey) -> LedgerResult<()> {
        if self.catalog.exists(ReferenceKind::Lot, key.lot_id.as_str()) {
            return Ok(());
        }
        if self.storage.get(&DocumentKey::Position(key.clone()))?.is_some() {
            return Ok(());
        }
        Err(LedgerError::unknown(ReferenceKind::Lot, key.lot_id.as_str()))
    }

    fn load_movement(&self, movement_id: MovementId) -> LedgerResult<Movement> {
        match self.storage.get(&DocumentKey::Movement(movement_id))? {
            Some(doc) => Ok(doc.into_movement()?),
            None => Err(LedgerError::MovementNotFound(movement_id)),
        }
    }

    /// Committed copy of a movement, read at the start of an attempt.
    ///
    /// Storage errors stay retryable here, unlike in [`Self::load_movement`].
    fn snapshot(&self, movement_id: MovementId) -> AttemptResult<Movement> {
        match self.storage.get(&DocumentKey::Movement(movement_id))? {
            Some(doc) => Ok(doc.into_movement()?),
            None => Err(LedgerError::MovementNotFound(movement_id).into()),
        }
    }

    /// Run one attempt, rerunning it from scratch on retryable storage errors.
    fn with_retries<T>(
        &self,
        operation: &'static str,
        mut attempt: impl FnMut() -> AttemptResult<T>,
    ) -> LedgerResult<T> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt_no = 1;
        loop {
            match attempt() {
                Ok(value) => return Ok(value),
                Err(AttemptError::Ledger(err)) => return Err(err),
                Err(AttemptError::Storage(err)) if err.is_retryable() && attempt_no < max_attempts => {
                    warn!(operation, attempt = attempt_no, max_attempts, error = %err, "retrying ledger operation");
                    attempt_no += 1;
                }
                Err(AttemptError::Storage(err)) => return Err(err.into()),
            }
        }
    }
}

fn duplicate(request: &MovementRequest) -> LedgerError {
    LedgerError::DuplicateDocument {
        kind: request.kind,
        document_number: request.document_number.clone(),
    }
}

fn missing_stock(key: &StockKey, delta: QuantityDelta) -> LedgerError {
    LedgerError::InsufficientStock {
        product_id: key.product_id.clone(),
        lot_id: key.lot_id.clone(),
        available: Quantity::ZERO,
        required: delta.shortfall_demand(),
    }
}

fn log_outcome<T>(operation: &'static str, result: &LedgerResult<T>) {
    match result {
        Ok(_) => info!(operation, "ledger operation committed"),
        Err(err) if err.is_fatal() => error!(operation, error = %err, "ledger operation failed"),
        Err(err) => debug!(operation, error = %err, "ledger operation rejected"),
    }
}

fn load_movement_in(tx: &dyn Transaction, movement_id: MovementId) -> AttemptResult<Movement> {
    match tx.read(&DocumentKey::Movement(movement_id))? {
        Some(doc) => Ok(doc.into_movement()?),
        None => Err(LedgerError::MovementNotFound(movement_id).into()),
    }
}

/// Read a position and check its summary still mirrors it.
fn load_position(tx: &dyn Transaction, key: &StockKey) -> AttemptResult<Option<StockPosition>> {
    let position = match tx.read(&DocumentKey::Position(key.clone()))? {
        Some(doc) => Some(doc.into_position()?),
        None => None,
    };
    let summary = match tx.read(&DocumentKey::Summary(key.clone()))? {
        Some(doc) => Some(doc.into_summary()?),
        None => None,
    };

    match (&position, &summary) {
        (None, None) => Ok(None),
        (Some(p), Some(s)) if s.mirrors(p) => Ok(position),
        _ => Err(LedgerError::inconsistent(format!(
            "stock position and lot summary for {key} disagree"
        ))
        .into()),
    }
}

fn store_position(tx: &mut dyn Transaction, position: StockPosition) -> AttemptResult<()> {
    let key = position.key().clone();
    let summary: LotProductSummary = position.summary();
    tx.write(DocumentKey::Position(key.clone()), Document::Position(position))?;
    tx.write(DocumentKey::Summary(key), Document::Summary(summary))?;
    Ok(())
}

fn remove_position(tx: &mut dyn Transaction, key: &StockKey) -> AttemptResult<()> {
    tx.delete(&DocumentKey::Position(key.clone()))?;
    tx.delete(&DocumentKey::Summary(key.clone()))?;
    Ok(())
}
