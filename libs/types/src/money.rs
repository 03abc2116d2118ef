//! Minor-unit amounts and commission splits
//!
//! Amounts are integers in the currency's minor unit (cents for USD), the way
//! the payment processor expects them. Display values in major units are exact
//! decimals; no floating point is involved in any money calculation.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of minor units in one major unit
pub const MINOR_UNITS_PER_MAJOR: u32 = 100;

/// An amount of money in minor units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    pub fn minor(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Value in major units, e.g. 5000 cents -> 50.00
    pub fn to_major(&self) -> Decimal {
        Decimal::from(self.0) / Decimal::from(MINOR_UNITS_PER_MAJOR)
    }

    /// Multiply by a line-item quantity. `None` on overflow.
    pub fn checked_mul(&self, quantity: u64) -> Option<Amount> {
        self.0.checked_mul(quantity).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Platform commission as a percentage in `[0, 100]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct CommissionPct(Decimal);

impl CommissionPct {
    /// Validate a raw percentage. `None` if it is negative or above 100.
    pub fn new(pct: Decimal) -> Option<Self> {
        if pct < Decimal::ZERO || pct > Decimal::ONE_HUNDRED {
            None
        } else {
            Some(Self(pct))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for CommissionPct {
    type Error = String;

    fn try_from(pct: Decimal) -> Result<Self, Self::Error> {
        Self::new(pct).ok_or_else(|| format!("commission_pct must be within [0, 100], got {}", pct))
    }
}

impl From<CommissionPct> for Decimal {
    fn from(pct: CommissionPct) -> Self {
        pct.0
    }
}

/// Result of splitting a gross amount between the recipient and the platform
///
/// Invariant: transfer + commission = gross
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionSplit {
    pub gross: Amount,
    /// Routed to the recipient's connected account
    pub transfer: Amount,
    /// Retained by the platform
    pub commission: Amount,
}

impl CommissionSplit {
    /// `transfer = floor(gross * (100 - pct) / 100)`; the rounding remainder
    /// stays with the platform.
    pub fn compute(gross: Amount, pct: CommissionPct) -> Self {
        let share = Decimal::ONE_HUNDRED - pct.value();
        let transfer = (Decimal::from(gross.minor()) * share / Decimal::ONE_HUNDRED).floor();
        // share is within [0, 100], so transfer is within [0, gross]
        let transfer = Amount::from_minor(transfer.to_u64().unwrap_or(0).min(gross.minor()));
        let commission = Amount::from_minor(gross.minor() - transfer.minor());
        Self {
            gross,
            transfer,
            commission,
        }
    }

    pub fn check_invariant(&self) -> bool {
        self.transfer.minor() + self.commission.minor() == self.gross.minor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pct(s: &str) -> CommissionPct {
        CommissionPct::new(Decimal::from_str_exact(s).unwrap()).unwrap()
    }

    #[test]
    fn test_ten_percent_commission() {
        let split = CommissionSplit::compute(Amount::from_minor(5000), pct("10"));
        assert_eq!(split.transfer, Amount::from_minor(4500));
        assert_eq!(split.commission, Amount::from_minor(500));
        assert_eq!(split.gross, Amount::from_minor(5000));
        assert!(split.check_invariant());
    }

    #[test]
    fn test_transfer_rounds_down() {
        // 999 * 0.875 = 874.125 -> 874
        let split = CommissionSplit::compute(Amount::from_minor(999), pct("12.5"));
        assert_eq!(split.transfer, Amount::from_minor(874));
        assert_eq!(split.commission, Amount::from_minor(125));
        assert!(split.check_invariant());
    }

    #[test]
    fn test_commission_bounds() {
        let all = CommissionSplit::compute(Amount::from_minor(1234), pct("100"));
        assert_eq!(all.transfer, Amount::ZERO);
        assert_eq!(all.commission, Amount::from_minor(1234));

        let none = CommissionSplit::compute(Amount::from_minor(1234), pct("0"));
        assert_eq!(none.transfer, Amount::from_minor(1234));
        assert_eq!(none.commission, Amount::ZERO);
    }

    #[test]
    fn test_commission_pct_rejects_out_of_range() {
        assert!(CommissionPct::new(Decimal::from(-1)).is_none());
        assert!(CommissionPct::new(Decimal::from(101)).is_none());
        assert!(serde_json::from_str::<CommissionPct>("150").is_err());
        assert_eq!(serde_json::from_str::<CommissionPct>("10").unwrap(), pct("10"));
    }

    #[test]
    fn test_to_major() {
        assert_eq!(Amount::from_minor(5000).to_major(), Decimal::from(50));
        assert_eq!(
            Amount::from_minor(1999).to_major(),
            Decimal::from_str_exact("19.99").unwrap()
        );
    }

    #[test]
    fn test_checked_mul_overflow() {
        assert_eq!(Amount::from_minor(250).checked_mul(3), Some(Amount::from_minor(750)));
        assert!(Amount::from_minor(u64::MAX).checked_mul(2).is_none());
    }

    proptest::proptest! {
        #[test]
        fn prop_split_preserves_gross(gross in 0u64..10_000_000_000, pct in 0u32..=100) {
            let split = CommissionSplit::compute(
                Amount::from_minor(gross),
                CommissionPct::new(Decimal::from(pct)).unwrap(),
            );
            proptest::prop_assert!(split.check_invariant());
            proptest::prop_assert!(split.transfer <= split.gross);
            proptest::prop_assert_eq!(split.transfer.minor(), gross * (100 - pct as u64) / 100);
        }
    }
}
