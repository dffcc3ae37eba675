//! Strongly-typed identifiers used across the ledger.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

/// Identifier of a movement record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementId(Uuid);

impl MovementId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
    /// for determinism.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MovementId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for MovementId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for MovementId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for MovementId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s)
            .map_err(|e| LedgerError::invalid_id(format!("MovementId: {e}")))?;
        Ok(Self(uuid))
    }
}

// Catalog entities live in the document store under string keys.
macro_rules! impl_string_newtype {
    ($t:ident, $name:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(String);

        impl $t {
            /// Trimmed like [`FromStr`]; use `parse` to also reject blank ids.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into().trim().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $t {
            type Err = LedgerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(LedgerError::invalid_id(concat!($name, ": empty")));
                }
                Ok(Self(trimmed.to_string()))
            }
        }
    };
}

impl_string_newtype!(ProductId, "ProductId");
impl_string_newtype!(LotId, "LotId");
impl_string_newtype!(PlaceId, "PlaceId");
impl_string_newtype!(SupplierId, "SupplierId");
impl_string_newtype!(TransporterId, "TransporterId");

impl LotId {
    /// Mint an identifier for a lot first seen on an entry.
    pub fn mint() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

/// External reference printed on the delivery note / invoice.
///
/// Unique per movement kind. Always trimmed and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentNumber(String);

impl DocumentNumber {
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, LedgerError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(LedgerError::validation("document number cannot be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DocumentNumber {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DocumentNumber> for String {
    fn from(value: DocumentNumber) -> Self {
        value.0
    }
}

impl core::fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_number_is_trimmed() {
        let n = DocumentNumber::parse("  E-001 ").unwrap();
        assert_eq!(n.as_str(), "E-001");
    }

    #[test]
    fn blank_document_number_is_rejected() {
        let err = DocumentNumber::parse("   ").unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn document_number_deserialization_validates() {
        let ok: DocumentNumber = serde_json::from_str("\"D1\"").unwrap();
        assert_eq!(ok.as_str(), "D1");
        assert!(serde_json::from_str::<DocumentNumber>("\"\"").is_err());
    }

    #[test]
    fn minted_lot_ids_are_distinct() {
        assert_ne!(LotId::mint(), LotId::mint());
    }

    #[test]
    fn catalog_ids_parse_and_reject_blank() {
        let p: ProductId = " p1 ".parse().unwrap();
        assert_eq!(p, ProductId::new("p1"));
        assert!("".parse::<PlaceId>().is_err());
    }

    #[test]
    fn constructed_and_parsed_ids_agree() {
        let parsed: ProductId = " p1 ".parse().unwrap();
        assert_eq!(ProductId::new(" p1 "), parsed);
        assert_eq!(ProductId::new(" p1 ").as_str(), "p1");
        assert_eq!(LotId::new(String::from("l1\n")), LotId::new("l1"));
    }

    #[test]
    fn movement_id_round_trips_through_display() {
        let id = MovementId::new();
        let parsed: MovementId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<MovementId>().is_err());
    }
}
