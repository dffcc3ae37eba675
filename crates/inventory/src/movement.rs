use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{
    DocumentNumber, LedgerError, LotId, MovementId, MovementKind, PlaceId, ProductId, Quantity,
    QuantityDelta, SupplierId, TransporterId,
};

use crate::position::StockKey;

/// Request to record a new entry or dispatch.
///
/// One shape serves both kinds; `kind` decides which fields are mandatory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementRequest {
    pub kind: MovementKind,
    pub product_id: ProductId,
    /// `None` on an entry mints a new lot. Required on a dispatch.
    #[serde(default)]
    pub lot_id: Option<LotId>,
    #[serde(default)]
    pub place_id: Option<PlaceId>,
    #[serde(flatten)]
    pub quantity: Quantity,
    pub document_number: DocumentNumber,
    /// Supplier for an entry, receiving party for a dispatch.
    pub counterparty_id: SupplierId,
    #[serde(default)]
    pub transporter_id: Option<TransporterId>,
}

impl MovementRequest {
    pub fn entry(
        product_id: ProductId,
        lot_id: Option<LotId>,
        quantity: Quantity,
        document_number: DocumentNumber,
        counterparty_id: SupplierId,
    ) -> Self {
        Self {
            kind: MovementKind::Entry,
            product_id,
            lot_id,
            place_id: None,
            quantity,
            document_number,
            counterparty_id,
            transporter_id: None,
        }
    }

    pub fn dispatch(
        product_id: ProductId,
        lot_id: LotId,
        quantity: Quantity,
        document_number: DocumentNumber,
        counterparty_id: SupplierId,
    ) -> Self {
        Self {
            kind: MovementKind::Dispatch,
            product_id,
            lot_id: Some(lot_id),
            place_id: None,
            quantity,
            document_number,
            counterparty_id,
            transporter_id: None,
        }
    }

    pub fn with_place(mut self, place_id: PlaceId) -> Self {
        self.place_id = Some(place_id);
        self
    }

    pub fn with_transporter(mut self, transporter_id: TransporterId) -> Self {
        self.transporter_id = Some(transporter_id);
        self
    }

    /// Shape checks that need no stored state.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.kind == MovementKind::Dispatch && self.lot_id.is_none() {
            return Err(LedgerError::validation("a dispatch must name its lot"));
        }
        check_quantity(self.quantity)
    }

    /// Signed change this request makes to its position.
    pub fn effect(&self) -> QuantityDelta {
        QuantityDelta::signed(self.kind.sign(), self.quantity)
    }
}

fn check_quantity(quantity: Quantity) -> Result<(), LedgerError> {
    if quantity.is_zero() {
        return Err(LedgerError::validation(
            "a movement must move at least one unit or loose unit",
        ));
    }
    quantity.check_bounds()
}

/// Which position a movement adjusted, and its balance just before.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRef {
    pub key: StockKey,
    pub on_hand_before: Quantity,
}

/// Recorded entry or dispatch. The movement history is the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movement {
    pub id: MovementId,
    pub kind: MovementKind,
    pub product_id: ProductId,
    pub lot_id: LotId,
    pub place_id: Option<PlaceId>,
    #[serde(flatten)]
    pub quantity: Quantity,
    pub total_units_number: u64,
    pub document_number: DocumentNumber,
    pub counterparty_id: SupplierId,
    pub transporter_id: Option<TransporterId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub position_ref: PositionRef,
}

impl Movement {
    /// Build the record for an accepted request.
    ///
    /// `lot_id` is the resolved lot (the request's or a freshly minted one).
    pub fn record(
        id: MovementId,
        request: &MovementRequest,
        lot_id: LotId,
        on_hand_before: Quantity,
        now: DateTime<Utc>,
    ) -> Self {
        let key = StockKey::new(request.product_id.clone(), lot_id.clone());
        Self {
            id,
            kind: request.kind,
            product_id: request.product_id.clone(),
            lot_id,
            place_id: request.place_id.clone(),
            quantity: request.quantity,
            total_units_number: request.quantity.total(),
            document_number: request.document_number.clone(),
            counterparty_id: request.counterparty_id.clone(),
            transporter_id: request.transporter_id.clone(),
            created_at: now,
            updated_at: None,
            position_ref: PositionRef {
                key,
                on_hand_before,
            },
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id.clone(), self.lot_id.clone())
    }

    /// Net signed change this movement made to its position.
    pub fn effect(&self) -> QuantityDelta {
        QuantityDelta::signed(self.kind.sign(), self.quantity)
    }

    /// Reject revisions touching fields fixed at creation.
    pub fn check_revision(&self, revision: &Revision) -> Result<(), LedgerError> {
        if revision.kind.is_some_and(|k| k != self.kind) {
            return Err(LedgerError::ImmutableField("kind"));
        }
        if revision
            .document_number
            .as_ref()
            .is_some_and(|n| *n != self.document_number)
        {
            return Err(LedgerError::ImmutableField("documentNumber"));
        }
        check_quantity(revision.quantity)
    }

    /// Per-position deltas needed to turn this movement into `revision`.
    ///
    /// Same pair: one entry carrying `sign * (new - old)`. Different pair: the
    /// old effect reversed on the old pair and the new effect on the new pair.
    /// Entries are ordered by key.
    pub fn revision_effects(&self, revision: &Revision) -> Vec<(StockKey, QuantityDelta)> {
        let old_key = self.key();
        let new_key = revision.key();
        let sign = self.kind.sign();

        let mut effects = if old_key == new_key {
            let diff = QuantityDelta::between(self.quantity, revision.quantity);
            vec![(old_key, scale(sign, diff))]
        } else {
            vec![
                (old_key, -self.effect()),
                (new_key, QuantityDelta::signed(sign, revision.quantity)),
            ]
        };
        effects.sort_by(|a, b| a.0.cmp(&b.0));
        effects
    }

    /// The movement as it reads after `revision`.
    pub fn revised(&self, revision: &Revision, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.product_id = revision.product_id.clone();
        next.lot_id = revision.lot_id.clone();
        next.place_id = revision.place_id.clone();
        next.quantity = revision.quantity;
        next.total_units_number = revision.quantity.total();
        next.updated_at = Some(now);
        if next.key() != self.key() {
            next.position_ref.key = next.key();
        }
        next
    }
}

fn scale(sign: i64, delta: QuantityDelta) -> QuantityDelta {
    QuantityDelta {
        units: sign * delta.units,
        loose_units: sign * delta.loose_units,
    }
}

/// Replacement values for an existing movement.
///
/// `kind` and `document_number` may be echoed back unchanged; any other value
/// is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    pub product_id: ProductId,
    pub lot_id: LotId,
    #[serde(default)]
    pub place_id: Option<PlaceId>,
    #[serde(flatten)]
    pub quantity: Quantity,
    #[serde(default)]
    pub kind: Option<MovementKind>,
    #[serde(default)]
    pub document_number: Option<DocumentNumber>,
}

impl Revision {
    /// Start from the movement's current values.
    pub fn of(movement: &Movement) -> Self {
        Self {
            product_id: movement.product_id.clone(),
            lot_id: movement.lot_id.clone(),
            place_id: movement.place_id.clone(),
            quantity: movement.quantity,
            kind: None,
            document_number: None,
        }
    }

    pub fn with_quantity(mut self, quantity: Quantity) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_key(mut self, key: StockKey) -> Self {
        self.product_id = key.product_id;
        self.lot_id = key.lot_id;
        self
    }

    pub fn with_place(mut self, place_id: Option<PlaceId>) -> Self {
        self.place_id = place_id;
        self
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id.clone(), self.lot_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(n: &str) -> DocumentNumber {
        DocumentNumber::parse(n).unwrap()
    }

    fn dispatch_d1() -> Movement {
        let req = MovementRequest::dispatch(
            ProductId::new("p1"),
            LotId::new("l1"),
            Quantity::new(30, 5),
            doc("D1"),
            SupplierId::new("c1"),
        );
        Movement::record(
            MovementId::new(),
            &req,
            LotId::new("l1"),
            Quantity::new(100, 10),
            Utc::now(),
        )
    }

    #[test]
    fn dispatch_without_lot_is_invalid() {
        let mut request = MovementRequest::dispatch(
            ProductId::new("p1"),
            LotId::new("l1"),
            Quantity::new(1, 0),
            doc("D2"),
            SupplierId::new("c1"),
        );
        request.lot_id = None;
        assert!(matches!(request.validate(), Err(LedgerError::Validation(_))));
    }

    #[test]
    fn zero_quantity_is_invalid() {
        let request = MovementRequest::entry(
            ProductId::new("p1"),
            None,
            Quantity::ZERO,
            doc("E1"),
            SupplierId::new("s1"),
        );
        assert!(matches!(request.validate(), Err(LedgerError::Validation(_))));
    }

    #[test]
    fn quantities_past_the_counter_limit_are_invalid() {
        for quantity in [Quantity::new(u64::MAX, 0), Quantity::new(0, 1 << 63)] {
            let request = MovementRequest::entry(
                ProductId::new("p1"),
                None,
                quantity,
                doc("E1"),
                SupplierId::new("s1"),
            );
            assert!(matches!(request.validate(), Err(LedgerError::Validation(_))));

            let rev = Revision::of(&dispatch_d1()).with_quantity(quantity);
            assert!(matches!(
                dispatch_d1().check_revision(&rev),
                Err(LedgerError::Validation(_))
            ));
        }
    }

    #[test]
    fn record_derives_total_and_position_ref() {
        let m = dispatch_d1();
        assert_eq!(m.total_units_number, 35);
        assert_eq!(m.position_ref.on_hand_before, Quantity::new(100, 10));
        assert_eq!(m.effect(), QuantityDelta { units: -30, loose_units: -5 });
    }

    #[test]
    fn increasing_a_dispatch_draws_more_stock() {
        let m = dispatch_d1();
        let rev = Revision::of(&m).with_quantity(Quantity::new(50, 5));
        let effects = m.revision_effects(&rev);
        assert_eq!(effects.len(), 1);
        assert_eq!(effects[0].1, QuantityDelta { units: -20, loose_units: 0 });
    }

    #[test]
    fn moving_an_entry_to_another_lot_touches_both_pairs() {
        let req = MovementRequest::entry(
            ProductId::new("p1"),
            Some(LotId::new("l2")),
            Quantity::new(10, 0),
            doc("E1"),
            SupplierId::new("s1"),
        );
        let m = Movement::record(MovementId::new(), &req, LotId::new("l2"), Quantity::ZERO, Utc::now());
        let rev = Revision::of(&m)
            .with_key(StockKey::new(ProductId::new("p1"), LotId::new("l1")))
            .with_quantity(Quantity::new(4, 1));

        let effects = m.revision_effects(&rev);
        assert_eq!(
            effects,
            vec![
                (
                    StockKey::new(ProductId::new("p1"), LotId::new("l1")),
                    QuantityDelta { units: 4, loose_units: 1 }
                ),
                (
                    StockKey::new(ProductId::new("p1"), LotId::new("l2")),
                    QuantityDelta { units: -10, loose_units: 0 }
                ),
            ]
        );
    }

    #[test]
    fn changing_kind_or_document_number_is_rejected() {
        let m = dispatch_d1();

        let mut rev = Revision::of(&m);
        rev.kind = Some(MovementKind::Entry);
        assert_eq!(m.check_revision(&rev), Err(LedgerError::ImmutableField("kind")));

        let mut rev = Revision::of(&m);
        rev.document_number = Some(doc("D9"));
        assert_eq!(
            m.check_revision(&rev),
            Err(LedgerError::ImmutableField("documentNumber"))
        );

        // Echoing the current values back is fine.
        let mut rev = Revision::of(&m);
        rev.kind = Some(MovementKind::Dispatch);
        rev.document_number = Some(doc("D1"));
        assert_eq!(m.check_revision(&rev), Ok(()));
    }

    #[test]
    fn revised_movement_tracks_new_pair_and_timestamp() {
        let m = dispatch_d1();
        let now = Utc::now();
        let rev = Revision::of(&m)
            .with_key(StockKey::new(ProductId::new("p1"), LotId::new("l9")))
            .with_quantity(Quantity::new(1, 1));
        let next = m.revised(&rev, now);
        assert_eq!(next.lot_id, LotId::new("l9"));
        assert_eq!(next.position_ref.key, next.key());
        assert_eq!(next.total_units_number, 2);
        assert_eq!(next.updated_at, Some(now));
        assert_eq!(next.created_at, m.created_at);
    }

    #[test]
    fn request_json_is_tagged_by_kind() {
        let json = serde_json::json!({
            "kind": "Dispatch",
            "productId": "p1",
            "lotId": "l1",
            "unitsNumber": 30,
            "looseUnitsNumber": 5,
            "documentNumber": "D1",
            "counterpartyId": "c1"
        });
        let req: MovementRequest = serde_json::from_value(json).unwrap();
        assert_eq!(req.kind, MovementKind::Dispatch);
        assert_eq!(req.quantity, Quantity::new(30, 5));
        assert_eq!(req.place_id, None);
        assert!(req.validate().is_ok());
    }
}
