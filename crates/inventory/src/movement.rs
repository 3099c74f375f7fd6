//! Movement classification: type, fixed direction, and typed references.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use farmstock_core::{AggregateId, DomainError};

/// The eight kinds of stock movement.
///
/// Each type has a fixed direction (see [`MovementType::direction`]); the
/// recorded quantity is always a positive magnitude, and the direction is
/// implied by the type. This classification is not configurable.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    Purchase,
    Usage,
    Sale,
    Adjustment,
    Transfer,
    Return,
    Expired,
    Damaged,
}

/// Direction a movement applies to the on-hand quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MovementDirection {
    Inbound,
    Outbound,
}

impl MovementType {
    /// Fixed direction classification.
    ///
    /// Inbound: PURCHASE, RETURN, ADJUSTMENT.
    /// Outbound: USAGE, SALE, TRANSFER, EXPIRED, DAMAGED.
    pub fn direction(self) -> MovementDirection {
        match self {
            MovementType::Purchase | MovementType::Return | MovementType::Adjustment => {
                MovementDirection::Inbound
            }
            MovementType::Usage
            | MovementType::Sale
            | MovementType::Transfer
            | MovementType::Expired
            | MovementType::Damaged => MovementDirection::Outbound,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::Purchase => "PURCHASE",
            MovementType::Usage => "USAGE",
            MovementType::Sale => "SALE",
            MovementType::Adjustment => "ADJUSTMENT",
            MovementType::Transfer => "TRANSFER",
            MovementType::Return => "RETURN",
            MovementType::Expired => "EXPIRED",
            MovementType::Damaged => "DAMAGED",
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PURCHASE" => Ok(MovementType::Purchase),
            "USAGE" => Ok(MovementType::Usage),
            "SALE" => Ok(MovementType::Sale),
            "ADJUSTMENT" => Ok(MovementType::Adjustment),
            "TRANSFER" => Ok(MovementType::Transfer),
            "RETURN" => Ok(MovementType::Return),
            "EXPIRED" => Ok(MovementType::Expired),
            "DAMAGED" => Ok(MovementType::Damaged),
            other => Err(DomainError::validation(format!(
                "unknown movement type: {other}"
            ))),
        }
    }
}

/// What caused a movement, as a closed tagged variant.
///
/// Replaces the loosely-typed referenceType/referenceId string pair: the set
/// of valid referrers is fixed here and checked at compile time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MovementReference {
    /// Fulfillment of a recorded sale.
    Sale { sale_id: AggregateId },
    /// Restock after a sale was cancelled/deleted.
    SaleCancelled { sale_id: AggregateId },
    /// Receipt against a purchase order.
    PurchaseOrder { order_id: AggregateId },
}
