//! Payment processor contract
//!
//! Everything the payments service needs from the processor, expressed as a
//! trait so orchestration and reconciliation can run against
//! [`crate::stripe::StripeClient`] in production and an in-memory fake in
//! tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use types::errors::PaymentError;
use types::ids::{CheckoutSessionId, ExternalAccountId, UserId};
use types::money::Amount;

use crate::event::WebhookEvent;

/// Capabilities requested for every connected account.
pub const ACCOUNT_CAPABILITIES: [&str; 2] = ["card_payments", "transfers"];

/// Processor idempotency key for a client-supplied key.
///
/// Client keys are only unique per caller, so the processor sees them
/// prefixed with the caller's id.
pub fn scoped_idempotency_key(user_id: UserId, key: Option<String>) -> Option<String> {
    key.map(|key| format!("{}:{}", user_id, key))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    /// Price of one unit in minor units
    pub unit_amount: Amount,
    pub quantity: u64,
}

/// Automatic transfer of part of a checkout payment to a connected account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferData {
    pub destination: ExternalAccountId,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSessionRequest {
    pub currency: String,
    pub line_item: LineItem,
    pub transfer: Option<TransferData>,
    pub success_url: String,
    pub cancel_url: String,
    /// Our user id, echoed back on the session object
    pub client_reference_id: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: CheckoutSessionId,
    /// Hosted payment page
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRequest {
    pub email: Option<String>,
    pub country: Option<String>,
}

/// Processor-side view of a connected account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorAccount {
    pub id: ExternalAccountId,
    #[serde(default)]
    pub details_submitted: bool,
    #[serde(default)]
    pub charges_enabled: bool,
    #[serde(default)]
    pub payouts_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub destination: ExternalAccountId,
    pub amount: Amount,
    pub currency: String,
    pub description: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: String,
    pub amount: Amount,
    pub destination: ExternalAccountId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLinkRequest {
    pub account: ExternalAccountId,
    pub refresh_url: String,
    pub return_url: String,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    async fn create_account(&self, request: AccountRequest) -> Result<ProcessorAccount, PaymentError>;

    async fn retrieve_account(&self, account: &ExternalAccountId) -> Result<ProcessorAccount, PaymentError>;

    async fn create_transfer(&self, request: TransferRequest) -> Result<Transfer, PaymentError>;

    /// Single-use dashboard login URL for an Express account.
    async fn create_login_link(&self, account: &ExternalAccountId) -> Result<String, PaymentError>;

    /// Hosted onboarding URL for a connected account.
    async fn create_account_link(&self, request: AccountLinkRequest) -> Result<String, PaymentError>;

    /// Authenticate and parse a webhook delivery. Local computation only;
    /// must never call out to the network.
    fn verify_webhook(&self, payload: &[u8], signature: Option<&str>) -> Result<WebhookEvent, PaymentError>;
}
