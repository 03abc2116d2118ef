//! Payment ledger types
//!
//! A ledger entry is created pending when a checkout session is opened and is
//! settled exactly once when the processor reports the session completed.

use crate::ids::{CheckoutSessionId, PaymentId, UserId};
use crate::money::Amount;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One row of the payment ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentLedgerEntry {
    pub id: PaymentId,
    pub user_id: UserId,
    /// Unique; the join key with processor webhook events
    pub external_session_id: CheckoutSessionId,
    /// Gross amount charged, in minor units
    pub amount: Amount,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for recording a pending ledger entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub user_id: UserId,
    pub external_session_id: CheckoutSessionId,
    pub amount: Amount,
}

/// Outcome of a settle-if-matched update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkPaidOutcome {
    /// The entry was pending and is now settled
    Settled(PaymentId),
    /// The entry was already settled; nothing changed
    AlreadySettled(PaymentId),
    /// No entry carries this session id
    Unmatched,
}

/// Listing row returned to the owning user; amount in major units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSummary {
    pub id: PaymentId,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub paid: bool,
    pub session_id: CheckoutSessionId,
    pub created_at: DateTime<Utc>,
}

impl From<&PaymentLedgerEntry> for PaymentSummary {
    fn from(entry: &PaymentLedgerEntry) -> Self {
        Self {
            id: entry.id,
            amount: entry.amount.to_major(),
            paid: entry.paid,
            session_id: entry.external_session_id.clone(),
            created_at: entry.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(paid: bool) -> PaymentLedgerEntry {
        PaymentLedgerEntry {
            id: PaymentId::new(1),
            user_id: UserId::new(3),
            external_session_id: CheckoutSessionId::new("cs_test_1"),
            amount: Amount::from_minor(5000),
            paid,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_summary_uses_major_units() {
        let summary = PaymentSummary::from(&entry(true));
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["amount"], serde_json::json!(50.0));
        assert_eq!(value["session_id"], "cs_test_1");
        assert_eq!(value["paid"], true);
    }
}
