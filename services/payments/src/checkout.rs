//! Checkout orchestrator
//!
//! Opens processor-hosted checkout sessions and records them in the ledger.
//!
//! Invariants:
//! - The ledger entry is written only after the processor confirms the
//!   session; a processor failure leaves the ledger untouched
//! - The ledger amount is always the gross amount charged
//! - Retries carrying the same idempotency key resolve to the same session
//!   and the same ledger entry

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use types::errors::PaymentError;
use types::ids::UserId;
use types::money::{Amount, CommissionPct, CommissionSplit};
use types::payment::{NewPayment, PaymentLedgerEntry};

use crate::accounts::ConnectedAccountManager;
use crate::ledger::PaymentLedger;
use crate::processor::{
    scoped_idempotency_key, CheckoutSession, CheckoutSessionRequest, LineItem, PaymentProcessor,
    TransferData,
};

pub const DEFAULT_PRODUCT_NAME: &str = "Default Product";
pub const DEFAULT_AMOUNT: Amount = Amount::from_minor(50_000_000);
pub const DEFAULT_QUANTITY: u64 = 1;

/// Currency and redirect targets shared by every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSettings {
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleCheckout {
    pub product_name: String,
    /// Unit price in minor units
    pub amount: Amount,
    pub quantity: u64,
}

impl Default for SimpleCheckout {
    fn default() -> Self {
        Self {
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
            amount: DEFAULT_AMOUNT,
            quantity: DEFAULT_QUANTITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitCheckout {
    pub recipient_id: UserId,
    /// Gross amount in minor units
    pub amount: Amount,
    /// Platform commission percentage, validated against `[0, 100]`
    pub commission_pct: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutOutcome {
    pub session: CheckoutSession,
    pub entry: PaymentLedgerEntry,
    /// Present for split checkouts
    pub split: Option<CommissionSplit>,
}

#[derive(Clone)]
pub struct CheckoutOrchestrator {
    processor: Arc<dyn PaymentProcessor>,
    ledger: Arc<dyn PaymentLedger>,
    accounts: ConnectedAccountManager,
    settings: CheckoutSettings,
}

impl CheckoutOrchestrator {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        ledger: Arc<dyn PaymentLedger>,
        accounts: ConnectedAccountManager,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            processor,
            ledger,
            accounts,
            settings,
        }
    }

    /// One line item of `quantity × amount`, paid to the platform.
    pub async fn simple_checkout(
        &self,
        payer: UserId,
        checkout: SimpleCheckout,
        idempotency_key: Option<String>,
    ) -> Result<CheckoutOutcome, PaymentError> {
        if checkout.amount.is_zero() {
            return Err(PaymentError::InvalidArgument("amount must be positive".into()));
        }
        if checkout.quantity == 0 {
            return Err(PaymentError::InvalidArgument("quantity must be positive".into()));
        }
        if checkout.product_name.trim().is_empty() {
            return Err(PaymentError::InvalidArgument("product_name must not be empty".into()));
        }
        let total = checkout
            .amount
            .checked_mul(checkout.quantity)
            .ok_or_else(|| PaymentError::InvalidArgument("amount × quantity overflows".into()))?;

        let request = self.session_request(
            payer,
            LineItem {
                name: checkout.product_name,
                unit_amount: checkout.amount,
                quantity: checkout.quantity,
            },
            None,
            idempotency_key,
        );
        self.open_session(payer, request, total, None).await
    }

    /// Charge `amount` and route all but the commission to the recipient's
    /// connected account.
    pub async fn split_checkout(
        &self,
        payer: UserId,
        checkout: SplitCheckout,
        idempotency_key: Option<String>,
    ) -> Result<CheckoutOutcome, PaymentError> {
        if checkout.amount.is_zero() {
            return Err(PaymentError::InvalidArgument("amount must be positive".into()));
        }
        let pct = CommissionPct::new(checkout.commission_pct).ok_or_else(|| {
            PaymentError::InvalidArgument(format!(
                "commission_pct must be within [0, 100], got {}",
                checkout.commission_pct
            ))
        })?;

        let destination = self.accounts.recipient_destination(checkout.recipient_id).await?;
        let split = CommissionSplit::compute(checkout.amount, pct);

        let request = self.session_request(
            payer,
            LineItem {
                name: format!("Payment to user {}", checkout.recipient_id),
                unit_amount: checkout.amount,
                quantity: 1,
            },
            (!split.transfer.is_zero()).then(|| TransferData {
                destination,
                amount: split.transfer,
            }),
            idempotency_key,
        );
        self.open_session(payer, request, split.gross, Some(split)).await
    }

    fn session_request(
        &self,
        payer: UserId,
        line_item: LineItem,
        transfer: Option<TransferData>,
        idempotency_key: Option<String>,
    ) -> CheckoutSessionRequest {
        CheckoutSessionRequest {
            currency: self.settings.currency.clone(),
            line_item,
            transfer,
            success_url: self.settings.success_url.clone(),
            cancel_url: self.settings.cancel_url.clone(),
            client_reference_id: Some(payer.to_string()),
            idempotency_key: scoped_idempotency_key(payer, idempotency_key),
        }
    }

    async fn open_session(
        &self,
        payer: UserId,
        request: CheckoutSessionRequest,
        gross: Amount,
        split: Option<CommissionSplit>,
    ) -> Result<CheckoutOutcome, PaymentError> {
        let session = self.processor.create_checkout_session(request).await?;

        let entry = self
            .ledger
            .record_pending(NewPayment {
                user_id: payer,
                external_session_id: session.id.clone(),
                amount: gross,
            })
            .await?;

        info!(
            user_id = %payer,
            session_id = %session.id,
            amount = %gross,
            transfer = split.map(|s| s.transfer.minor()),
            "Checkout session opened"
        );
        Ok(CheckoutOutcome {
            session,
            entry,
            split,
        })
    }
}
