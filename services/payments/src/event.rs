//! Processor webhook events
//!
//! Only the envelope fields the reconciler acts on are typed; the event
//! object stays as raw JSON so unknown event types parse without error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use types::errors::PaymentError;
use types::ids::CheckoutSessionId;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub object: Value,
}

/// What the reconciler should do with an authentic event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventAction {
    CheckoutCompleted { session_id: CheckoutSessionId },
    /// Completed-session event whose object carries no id
    MissingSessionId,
    Ignore,
}

impl WebhookEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, PaymentError> {
        serde_json::from_slice(payload).map_err(|e| PaymentError::MalformedEvent {
            reason: e.to_string(),
        })
    }

    pub fn action(&self) -> EventAction {
        if self.event_type != CHECKOUT_SESSION_COMPLETED {
            return EventAction::Ignore;
        }
        match self
            .data
            .object
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
        {
            Some(session_id) => EventAction::CheckoutCompleted {
                session_id: CheckoutSessionId::new(session_id),
            },
            None => EventAction::MissingSessionId,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_session_yields_session_id() {
        let event = WebhookEvent::parse(
            br#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"id":"cs_test_9","object":"checkout.session"}}}"#,
        )
        .unwrap();
        assert_eq!(
            event.action(),
            EventAction::CheckoutCompleted {
                session_id: CheckoutSessionId::new("cs_test_9")
            }
        );
    }

    #[test]
    fn test_other_types_are_ignored() {
        let event = WebhookEvent::parse(
            br#"{"id":"evt_2","type":"payment_intent.created","data":{"object":{"id":"pi_1"}}}"#,
        )
        .unwrap();
        assert_eq!(event.action(), EventAction::Ignore);
    }

    #[test]
    fn test_completed_without_id_has_no_session() {
        let event = WebhookEvent::parse(
            br#"{"id":"evt_3","type":"checkout.session.completed","data":{"object":{}}}"#,
        )
        .unwrap();
        assert_eq!(event.action(), EventAction::MissingSessionId);
    }

    #[test]
    fn test_unparseable_payload() {
        assert!(matches!(
            WebhookEvent::parse(b"not json"),
            Err(PaymentError::MalformedEvent { .. })
        ));
    }
}
