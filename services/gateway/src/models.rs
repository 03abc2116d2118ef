use payments::checkout::{DEFAULT_AMOUNT, DEFAULT_PRODUCT_NAME, DEFAULT_QUANTITY, SimpleCheckout};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::account::ConnectedAccount;
use types::ids::{CheckoutSessionId, ExternalAccountId, UserId};
use types::money::Amount;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentRequest {
    #[serde(default = "default_product_name")]
    pub product_name: String,
    #[serde(default = "default_amount")]
    pub amount: Amount,
    #[serde(default = "default_quantity")]
    pub quantity: u64,
}

fn default_product_name() -> String {
    DEFAULT_PRODUCT_NAME.to_string()
}

fn default_amount() -> Amount {
    DEFAULT_AMOUNT
}

fn default_quantity() -> u64 {
    DEFAULT_QUANTITY
}

impl From<CreatePaymentRequest> for SimpleCheckout {
    fn from(request: CreatePaymentRequest) -> Self {
        SimpleCheckout {
            product_name: request.product_name,
            amount: request.amount,
            quantity: request.quantity,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferPaymentRequest {
    pub recipient_id: UserId,
    pub amount: Amount,
    pub commission_pct: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub session_id: CheckoutSessionId,
    pub checkout_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferRequest {
    pub recipient_id: UserId,
    pub amount: Amount,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResponse {
    pub transfer_id: String,
    pub amount: Amount,
    pub destination: ExternalAccountId,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectAccountRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectAccountResponse {
    pub account_id: Option<ExternalAccountId>,
    pub is_onboarded: bool,
}

impl From<ConnectedAccount> for ConnectAccountResponse {
    fn from(account: ConnectedAccount) -> Self {
        Self {
            account_id: account.external_account_id,
            is_onboarded: account.is_onboarded,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkResponse {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    pub status: String,
    pub outcome: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub observers: usize,
    pub rate_limited_keys: usize,
}
