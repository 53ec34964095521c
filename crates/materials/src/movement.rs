use core::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use clinicore_core::{ActorId, AggregateId, DomainError, MovementId, Quantity, UsageId};

/// Direction of a manual stock adjustment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustDirection {
    Increase,
    Decrease,
}

/// Kind of stock movement.
///
/// `In` covers purchases, returns and usage reversals; `Out` covers consumption and
/// losses. Adjustments always carry an explicit direction.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "direction", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    In,
    Out,
    Adjust(AdjustDirection),
}

impl MovementKind {
    /// Parse the wire form: `kind` is `IN | OUT | ADJUST`, `direction` is required for
    /// `ADJUST` only (`INCREASE | DECREASE`).
    pub fn parse(kind: &str, direction: Option<&str>) -> Result<Self, DomainError> {
        match (kind.trim().to_ascii_uppercase().as_str(), direction) {
            ("IN", None) => Ok(MovementKind::In),
            ("OUT", None) => Ok(MovementKind::Out),
            ("ADJUST", Some(d)) => match d.trim().to_ascii_uppercase().as_str() {
                "INCREASE" => Ok(MovementKind::Adjust(AdjustDirection::Increase)),
                "DECREASE" => Ok(MovementKind::Adjust(AdjustDirection::Decrease)),
                other => Err(DomainError::invalid(format!(
                    "unknown adjustment direction '{other}'"
                ))),
            },
            ("ADJUST", None) => Err(DomainError::invalid(
                "ADJUST movements require a direction (INCREASE or DECREASE)",
            )),
            ("IN" | "OUT", Some(_)) => Err(DomainError::invalid(
                "direction is only allowed on ADJUST movements",
            )),
            (other, _) => Err(DomainError::invalid(format!("unknown movement kind '{other}'"))),
        }
    }

    pub fn increases_stock(&self) -> bool {
        matches!(
            self,
            MovementKind::In | MovementKind::Adjust(AdjustDirection::Increase)
        )
    }

    /// Signed stock delta for `quantity` under this kind.
    pub fn signed(&self, quantity: Quantity) -> Decimal {
        if self.increases_stock() {
            quantity.value()
        } else {
            -quantity.value()
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            MovementKind::In => "IN",
            MovementKind::Out => "OUT",
            MovementKind::Adjust(_) => "ADJUST",
        }
    }

    pub fn direction_str(&self) -> Option<&'static str> {
        match self {
            MovementKind::Adjust(AdjustDirection::Increase) => Some("INCREASE"),
            MovementKind::Adjust(AdjustDirection::Decrease) => Some("DECREASE"),
            _ => None,
        }
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction_str() {
            Some(d) => write!(f, "{}:{}", self.kind_str(), d),
            None => f.write_str(self.kind_str()),
        }
    }
}

/// One immutable entry of a material's stock ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub movement_id: MovementId,
    pub material_id: AggregateId,
    pub kind: MovementKind,
    pub quantity: Quantity,
    pub previous_stock: Decimal,
    pub resulting_stock: Decimal,
    pub actor_id: ActorId,
    pub related_appointment_id: Option<AggregateId>,
    /// Set when the movement pairs with a usage record (consumption or its correction).
    pub related_usage_id: Option<UsageId>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}
