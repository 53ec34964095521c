//! Value objects: equality by value, not identity.

use core::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. To "modify" one,
/// build a new value.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Strictly positive decimal amount of a material, in the material's unit.
///
/// Every movement quantity and every usage quantity goes through this type, so a zero or
/// negative quantity cannot reach an aggregate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Quantity(Decimal);

impl Quantity {
    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value <= Decimal::ZERO {
            return Err(DomainError::invalid(format!(
                "quantity must be greater than zero (got {value})"
            )));
        }
        Ok(Self(value.normalize()))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl ValueObject for Quantity {}

impl TryFrom<Decimal> for Quantity {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for Decimal {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Non-negative monetary amount (unit prices, usage totals, cost rollups).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value < Decimal::ZERO {
            return Err(DomainError::invalid(format!(
                "monetary amount must not be negative (got {value})"
            )));
        }
        Ok(Self(value))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Exact `quantity × self`, no rounding.
    ///
    /// Fails with `InvalidArgument` when the product does not fit a `Decimal`.
    pub fn times(&self, quantity: Quantity) -> DomainResult<Money> {
        self.0
            .checked_mul(quantity.value())
            .map(Money)
            .ok_or_else(|| {
                DomainError::invalid(format!(
                    "total out of range ({} x {})",
                    quantity.value(),
                    self.0
                ))
            })
    }

    pub fn checked_add(self, rhs: Money) -> DomainResult<Money> {
        self.0
            .checked_add(rhs.0)
            .map(Money)
            .ok_or_else(|| DomainError::invalid("monetary total out of range"))
    }

    /// Sum of `amounts`, failing instead of overflowing.
    pub fn total(amounts: impl IntoIterator<Item = Money>) -> DomainResult<Money> {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, m| acc.checked_add(m))
    }
}

impl ValueObject for Money {}

impl TryFrom<Decimal> for Money {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Inclusive time window; an open end means unbounded on that side.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> DomainResult<Self> {
        if let (Some(f), Some(t)) = (from, to) {
            if f > t {
                return Err(DomainError::invalid(format!(
                    "range start {f} is after range end {t}"
                )));
            }
        }
        Ok(Self { from, to })
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|f| at >= f) && self.to.is_none_or(|t| at <= t)
    }
}

impl ValueObject for DateRange {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::prelude::*;

    #[test]
    fn zero_and_negative_quantities_are_rejected() {
        assert!(matches!(
            Quantity::new(Decimal::ZERO),
            Err(DomainError::InvalidArgument(_))
        ));
        assert!(matches!(
            Quantity::new(Decimal::new(-1, 0)),
            Err(DomainError::InvalidArgument(_))
        ));
    }

    #[test]
    fn quantity_deserializes_from_string_or_number() {
        let from_str: Quantity = serde_json::from_str("\"2.50\"").unwrap();
        let from_num: Quantity = serde_json::from_str("2.5").unwrap();
        assert_eq!(from_str, from_num);
        assert!(serde_json::from_str::<Quantity>("\"0\"").is_err());
    }

    #[test]
    fn money_times_is_exact() {
        let price = Money::new(Decimal::from_str("12.34").unwrap()).unwrap();
        let qty = Quantity::new(Decimal::from_str("3").unwrap()).unwrap();
        assert_eq!(
            price.times(qty).unwrap().amount(),
            Decimal::from_str("37.02").unwrap()
        );
    }

    #[test]
    fn money_arithmetic_reports_overflow_instead_of_panicking() {
        let price = Money::new(Decimal::from_str("1000000000000000").unwrap()).unwrap();
        let qty = Quantity::new(Decimal::from_str("100000000000000000000").unwrap()).unwrap();
        assert!(matches!(price.times(qty), Err(DomainError::InvalidArgument(_))));

        let max = Money::new(Decimal::MAX).unwrap();
        assert!(matches!(
            max.checked_add(Money::new(Decimal::ONE).unwrap()),
            Err(DomainError::InvalidArgument(_))
        ));
        assert!(Money::total([max, max]).is_err());
        assert_eq!(Money::total([]).unwrap(), Money::ZERO);
    }

    #[test]
    fn date_range_is_inclusive_and_validated() {
        let t0 = chrono::Utc::now();
        let t1 = t0 + chrono::Duration::hours(1);
        let range = DateRange::new(Some(t0), Some(t1)).unwrap();
        assert!(range.contains(t0));
        assert!(range.contains(t1));
        assert!(!range.contains(t1 + chrono::Duration::seconds(1)));
        assert!(DateRange::unbounded().contains(t0));
        assert!(DateRange::new(Some(t1), Some(t0)).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        #[test]
        fn money_sum_matches_decimal_sum(cents in proptest::collection::vec(0i64..1_000_000, 0..20)) {
            let total = Money::total(cents.iter().map(|c| Money::new(Decimal::new(*c, 2)).unwrap())).unwrap();
            let expected: Decimal = cents.iter().map(|c| Decimal::new(*c, 2)).sum();
            prop_assert_eq!(total.amount(), expected);
        }
    }
}
