//! Payment ledger
//!
//! One entry per checkout session, created pending after the processor
//! confirms the session and settled at most once by the webhook reconciler.
//! `external_session_id` is unique; both mutations are keyed on it and are
//! idempotent.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use persistence::journal::JournalConfig;
use persistence::{decode, Journal, PersistenceError};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};
use types::errors::PaymentError;
use types::ids::{CheckoutSessionId, PaymentId, UserId};
use types::payment::{MarkPaidOutcome, NewPayment, PaymentLedgerEntry};

#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Insert a pending entry, or return the existing entry for the same
    /// session id unchanged. An existing entry with a different payer or
    /// amount is a `SessionConflict`.
    async fn record_pending(&self, payment: NewPayment) -> Result<PaymentLedgerEntry, PaymentError>;

    /// Settle the entry for `session_id` if it exists and is pending.
    async fn mark_paid(&self, session_id: &CheckoutSessionId) -> Result<MarkPaidOutcome, PaymentError>;

    /// Entries owned by `user_id`, newest first.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<PaymentLedgerEntry>, PaymentError>;

    async fn find_by_session(
        &self,
        session_id: &CheckoutSessionId,
    ) -> Result<Option<PaymentLedgerEntry>, PaymentError>;
}

#[derive(Default)]
struct LedgerState {
    entries: Vec<PaymentLedgerEntry>,
    by_session: HashMap<CheckoutSessionId, usize>,
}

impl LedgerState {
    fn get(&self, session_id: &CheckoutSessionId) -> Option<&PaymentLedgerEntry> {
        self.by_session.get(session_id).map(|&idx| &self.entries[idx])
    }

    /// Entry already recorded for `payment`'s session. A row for the same
    /// session with a different payer or amount is a conflict, never a match.
    fn existing(&self, payment: &NewPayment) -> Result<Option<PaymentLedgerEntry>, PaymentError> {
        match self.get(&payment.external_session_id) {
            Some(entry) if entry.user_id != payment.user_id || entry.amount != payment.amount => {
                warn!(
                    session_id = %payment.external_session_id,
                    recorded_user = %entry.user_id,
                    user_id = %payment.user_id,
                    "Checkout session already recorded for a different payment"
                );
                Err(PaymentError::SessionConflict {
                    session_id: payment.external_session_id.clone(),
                })
            }
            Some(entry) => Ok(Some(entry.clone())),
            None => Ok(None),
        }
    }

    fn build(&self, payment: NewPayment, created_at: DateTime<Utc>) -> PaymentLedgerEntry {
        let next_id = self.entries.last().map_or(1, |e| e.id.get() + 1);
        PaymentLedgerEntry {
            id: PaymentId::new(next_id),
            user_id: payment.user_id,
            external_session_id: payment.external_session_id,
            amount: payment.amount,
            paid: false,
            created_at,
        }
    }

    fn insert(&mut self, entry: PaymentLedgerEntry) {
        self.by_session
            .insert(entry.external_session_id.clone(), self.entries.len());
        self.entries.push(entry);
    }

    /// Outcome `settle` would produce, without changing anything.
    fn peek_settle(&self, session_id: &CheckoutSessionId) -> MarkPaidOutcome {
        match self.get(session_id) {
            Some(entry) if entry.paid => MarkPaidOutcome::AlreadySettled(entry.id),
            Some(entry) => MarkPaidOutcome::Settled(entry.id),
            None => MarkPaidOutcome::Unmatched,
        }
    }

    fn settle(&mut self, session_id: &CheckoutSessionId) -> MarkPaidOutcome {
        let outcome = self.peek_settle(session_id);
        if let (MarkPaidOutcome::Settled(_), Some(&idx)) = (outcome, self.by_session.get(session_id)) {
            self.entries[idx].paid = true;
        }
        outcome
    }

    fn list_for_user(&self, user_id: UserId) -> Vec<PaymentLedgerEntry> {
        self.entries
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect()
    }
}

/// Thread-safe in-memory ledger.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentLedger for InMemoryLedger {
    async fn record_pending(&self, payment: NewPayment) -> Result<PaymentLedgerEntry, PaymentError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.existing(&payment)? {
            return Ok(existing);
        }
        let entry = state.build(payment, Utc::now());
        state.insert(entry.clone());
        Ok(entry)
    }

    async fn mark_paid(&self, session_id: &CheckoutSessionId) -> Result<MarkPaidOutcome, PaymentError> {
        Ok(self.state.write().await.settle(session_id))
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<PaymentLedgerEntry>, PaymentError> {
        Ok(self.state.read().await.list_for_user(user_id))
    }

    async fn find_by_session(
        &self,
        session_id: &CheckoutSessionId,
    ) -> Result<Option<PaymentLedgerEntry>, PaymentError> {
        Ok(self.state.read().await.get(session_id).cloned())
    }
}

const RECORDED: &str = "ledger.recorded";
const SETTLED: &str = "ledger.settled";

#[derive(Serialize, Deserialize)]
struct SettledRecord {
    session_id: CheckoutSessionId,
}

/// Ledger backed by an append-only journal.
///
/// The state lock is held across the journal write so a record is never
/// applied out of journal order.
#[derive(Clone)]
pub struct JournaledLedger {
    state: Arc<RwLock<LedgerState>>,
    journal: Journal,
}

impl JournaledLedger {
    pub async fn open(config: JournalConfig) -> Result<Self, PaymentError> {
        let (journal, replay) = Journal::open(config).map_err(storage_error)?;
        let mut state = LedgerState::default();

        for entry in &replay.entries {
            match entry.kind.as_str() {
                RECORDED => {
                    let recorded: PaymentLedgerEntry = decode(entry).map_err(storage_error)?;
                    state.insert(recorded);
                }
                SETTLED => {
                    let settled: SettledRecord = decode(entry).map_err(storage_error)?;
                    state.settle(&settled.session_id);
                }
                other => tracing::warn!(kind = other, "Skipping unknown ledger record"),
            }
        }
        info!(entries = state.entries.len(), "Payment ledger replayed");

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            journal,
        })
    }
}

#[async_trait]
impl PaymentLedger for JournaledLedger {
    async fn record_pending(&self, payment: NewPayment) -> Result<PaymentLedgerEntry, PaymentError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.existing(&payment)? {
            return Ok(existing);
        }
        let entry = state.build(payment, Utc::now());
        self.journal
            .append(RECORDED, &entry)
            .await
            .map_err(storage_error)?;
        state.insert(entry.clone());
        Ok(entry)
    }

    async fn mark_paid(&self, session_id: &CheckoutSessionId) -> Result<MarkPaidOutcome, PaymentError> {
        let mut state = self.state.write().await;
        if let MarkPaidOutcome::Settled(_) = state.peek_settle(session_id) {
            self.journal
                .append(
                    SETTLED,
                    &SettledRecord {
                        session_id: session_id.clone(),
                    },
                )
                .await
                .map_err(storage_error)?;
        }
        Ok(state.settle(session_id))
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<PaymentLedgerEntry>, PaymentError> {
        Ok(self.state.read().await.list_for_user(user_id))
    }

    async fn find_by_session(
        &self,
        session_id: &CheckoutSessionId,
    ) -> Result<Option<PaymentLedgerEntry>, PaymentError> {
        Ok(self.state.read().await.get(session_id).cloned())
    }
}

fn storage_error(err: PersistenceError) -> PaymentError {
    PaymentError::storage(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use types::money::Amount;

    fn pending(user: u64, session: &str, amount: u64) -> NewPayment {
        NewPayment {
            user_id: UserId::new(user),
            external_session_id: CheckoutSessionId::new(session),
            amount: Amount::from_minor(amount),
        }
    }

    #[tokio::test]
    async fn test_record_pending_is_get_or_insert() {
        let ledger = InMemoryLedger::new();
        let first = ledger.record_pending(pending(1, "cs_1", 5000)).await.unwrap();
        let again = ledger.record_pending(pending(1, "cs_1", 5000)).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(ledger.list_for_user(UserId::new(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_record_pending_rejects_foreign_session() {
        let ledger = InMemoryLedger::new();
        let first = ledger.record_pending(pending(1, "cs_1", 5000)).await.unwrap();

        for conflicting in [pending(2, "cs_1", 5000), pending(1, "cs_1", 100)] {
            let err = ledger.record_pending(conflicting).await.unwrap_err();
            assert_eq!(
                err,
                PaymentError::SessionConflict {
                    session_id: CheckoutSessionId::new("cs_1")
                }
            );
        }
        assert!(ledger.list_for_user(UserId::new(2)).await.unwrap().is_empty());
        assert_eq!(
            ledger.find_by_session(&first.external_session_id).await.unwrap(),
            Some(first)
        );
    }

    #[tokio::test]
    async fn test_mark_paid_outcomes() {
        let ledger = InMemoryLedger::new();
        let entry = ledger.record_pending(pending(1, "cs_1", 5000)).await.unwrap();
        assert!(!entry.paid);

        let session = CheckoutSessionId::new("cs_1");
        assert_eq!(ledger.mark_paid(&session).await.unwrap(), MarkPaidOutcome::Settled(entry.id));
        assert_eq!(
            ledger.mark_paid(&session).await.unwrap(),
            MarkPaidOutcome::AlreadySettled(entry.id)
        );
        assert_eq!(
            ledger.mark_paid(&CheckoutSessionId::new("cs_missing")).await.unwrap(),
            MarkPaidOutcome::Unmatched
        );
        assert!(ledger.find_by_session(&session).await.unwrap().unwrap().paid);
    }

    #[tokio::test]
    async fn test_list_is_scoped_and_newest_first() {
        let ledger = InMemoryLedger::new();
        ledger.record_pending(pending(1, "cs_a", 100)).await.unwrap();
        ledger.record_pending(pending(2, "cs_b", 200)).await.unwrap();
        ledger.record_pending(pending(1, "cs_c", 300)).await.unwrap();

        let sessions: Vec<_> = ledger
            .list_for_user(UserId::new(1))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.external_session_id.as_str().to_string())
            .collect();
        assert_eq!(sessions, vec!["cs_c", "cs_a"]);
        assert!(ledger.list_for_user(UserId::new(3)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_journaled_ledger_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let ledger = JournaledLedger::open(JournalConfig::new(tmp.path())).await.unwrap();
            ledger.record_pending(pending(1, "cs_1", 5000)).await.unwrap();
            ledger.record_pending(pending(1, "cs_2", 700)).await.unwrap();
            ledger.mark_paid(&CheckoutSessionId::new("cs_1")).await.unwrap();
            // Second settle writes nothing.
            ledger.mark_paid(&CheckoutSessionId::new("cs_1")).await.unwrap();
        }

        let ledger = JournaledLedger::open(JournalConfig::new(tmp.path())).await.unwrap();
        let entries = ledger.list_for_user(UserId::new(1)).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(!entries[0].paid);
        assert!(entries[1].paid);
        assert_eq!(entries[1].amount, Amount::from_minor(5000));

        let next = ledger.record_pending(pending(2, "cs_3", 1)).await.unwrap();
        assert_eq!(next.id, PaymentId::new(3));
    }
}
