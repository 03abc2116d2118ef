//! Webhook reconciler
//!
//! Authenticates processor event deliveries and settles the matching ledger
//! entry. Verification happens before any parsing or state access, so a
//! delivery that fails it never changes anything. Settlement is a
//! set-if-matched update, so redeliveries are harmless.

use std::sync::Arc;

use tracing::{debug, info, warn};
use types::errors::PaymentError;
use types::ids::{CheckoutSessionId, PaymentId};
use types::payment::MarkPaidOutcome;

use crate::event::EventAction;
use crate::ledger::PaymentLedger;
use crate::processor::PaymentProcessor;

/// What an authentic delivery did to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Settled {
        session_id: CheckoutSessionId,
        payment_id: PaymentId,
    },
    AlreadySettled {
        session_id: CheckoutSessionId,
        payment_id: PaymentId,
    },
    /// Completed session with no ledger entry
    Unmatched { session_id: CheckoutSessionId },
    /// Event type the reconciler does not act on
    Ignored { event_type: String },
}

#[derive(Clone)]
pub struct WebhookReconciler {
    processor: Arc<dyn PaymentProcessor>,
    ledger: Arc<dyn PaymentLedger>,
}

impl WebhookReconciler {
    pub fn new(processor: Arc<dyn PaymentProcessor>, ledger: Arc<dyn PaymentLedger>) -> Self {
        Self { processor, ledger }
    }

    /// Handle one delivery: the raw request body and its signature header.
    pub async fn handle(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, PaymentError> {
        let event = self
            .processor
            .verify_webhook(payload, signature)
            .inspect_err(|err| warn!(error = %err, "Rejected webhook delivery"))?;

        let session_id = match event.action() {
            EventAction::CheckoutCompleted { session_id } => session_id,
            EventAction::MissingSessionId => {
                warn!(event_id = %event.id, "Completed session event without a session id");
                return Ok(WebhookOutcome::Ignored {
                    event_type: event.event_type,
                });
            }
            EventAction::Ignore => {
                debug!(event_id = %event.id, event_type = %event.event_type, "Ignoring webhook event");
                return Ok(WebhookOutcome::Ignored {
                    event_type: event.event_type,
                });
            }
        };

        let outcome = match self.ledger.mark_paid(&session_id).await? {
            MarkPaidOutcome::Settled(payment_id) => {
                info!(session_id = %session_id, payment_id = %payment_id, "Payment settled");
                WebhookOutcome::Settled {
                    session_id,
                    payment_id,
                }
            }
            MarkPaidOutcome::AlreadySettled(payment_id) => {
                debug!(session_id = %session_id, "Duplicate completion event");
                WebhookOutcome::AlreadySettled {
                    session_id,
                    payment_id,
                }
            }
            MarkPaidOutcome::Unmatched => {
                warn!(session_id = %session_id, event_id = %event.id, "Completed session has no ledger entry");
                WebhookOutcome::Unmatched { session_id }
            }
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::testing::FakeProcessor;
    use types::ids::UserId;
    use types::money::Amount;
    use types::payment::NewPayment;

    async fn setup() -> (Arc<FakeProcessor>, Arc<InMemoryLedger>, WebhookReconciler) {
        let processor = Arc::new(FakeProcessor::new());
        let ledger = Arc::new(InMemoryLedger::new());
        ledger
            .record_pending(NewPayment {
                user_id: UserId::new(1),
                external_session_id: CheckoutSessionId::new("cs_test_1"),
                amount: Amount::from_minor(5000),
            })
            .await
            .unwrap();
        let reconciler = WebhookReconciler::new(processor.clone(), ledger.clone());
        (processor, ledger, reconciler)
    }

    fn session() -> CheckoutSessionId {
        CheckoutSessionId::new("cs_test_1")
    }

    #[tokio::test]
    async fn test_duplicate_delivery_settles_once() {
        let (processor, ledger, reconciler) = setup().await;
        let body = FakeProcessor::completed_event(&session());
        let signature = processor.sign(&body);

        let first = reconciler.handle(&body, Some(&signature)).await.unwrap();
        let second = reconciler.handle(&body, Some(&signature)).await.unwrap();

        assert!(matches!(first, WebhookOutcome::Settled { .. }));
        assert!(matches!(second, WebhookOutcome::AlreadySettled { .. }));
        let entries = ledger.list_for_user(UserId::new(1)).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].paid);
    }

    #[tokio::test]
    async fn test_bad_signature_changes_nothing() {
        let (processor, ledger, reconciler) = setup().await;
        let body = FakeProcessor::completed_event(&session());
        let forged = processor.sign(b"some other body");

        for signature in [None, Some("t=1,v1=00"), Some(forged.as_str())] {
            let err = reconciler.handle(&body, signature).await.unwrap_err();
            assert!(matches!(err, PaymentError::InvalidSignature { .. }));
        }
        assert!(!ledger.find_by_session(&session()).await.unwrap().unwrap().paid);
    }

    #[tokio::test]
    async fn test_unmatched_session_is_acknowledged() {
        let (processor, ledger, reconciler) = setup().await;
        let other = CheckoutSessionId::new("cs_unknown");
        let body = FakeProcessor::completed_event(&other);

        let outcome = reconciler.handle(&body, Some(&processor.sign(&body))).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Unmatched { session_id: other });
        assert!(!ledger.find_by_session(&session()).await.unwrap().unwrap().paid);
    }

    #[tokio::test]
    async fn test_other_event_types_ignored() {
        let (processor, ledger, reconciler) = setup().await;
        let body = br#"{"id":"evt_9","type":"account.updated","data":{"object":{"id":"acct_1"}}}"#;

        let outcome = reconciler.handle(body, Some(&processor.sign(body))).await.unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::Ignored {
                event_type: "account.updated".into()
            }
        );
        assert!(!ledger.find_by_session(&session()).await.unwrap().unwrap().paid);
    }

    #[tokio::test]
    async fn test_completed_event_without_id_is_acknowledged() {
        let (processor, ledger, reconciler) = setup().await;
        let body = br#"{"id":"evt_9","type":"checkout.session.completed","data":{"object":{}}}"#;
        let outcome = reconciler.handle(body, Some(&processor.sign(body))).await.unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::Ignored {
                event_type: "checkout.session.completed".into()
            }
        );
        assert!(!ledger.find_by_session(&session()).await.unwrap().unwrap().paid);
    }

    #[tokio::test]
    async fn test_authentic_but_unparseable_body() {
        let (processor, _ledger, reconciler) = setup().await;
        let body = b"{not json";
        let err = reconciler.handle(body, Some(&processor.sign(body))).await.unwrap_err();
        assert!(matches!(err, PaymentError::MalformedEvent { .. }));
    }
}
