//! Direct transfers from the platform balance to a connected account.
//!
//! Transfers are not checkout sessions and leave no ledger entry.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use types::errors::PaymentError;
use types::ids::UserId;
use types::money::Amount;

use crate::accounts::ConnectedAccountManager;
use crate::processor::{scoped_idempotency_key, PaymentProcessor, Transfer, TransferRequest};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendTransfer {
    pub recipient_id: UserId,
    pub amount: Amount,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct TransferService {
    processor: Arc<dyn PaymentProcessor>,
    accounts: ConnectedAccountManager,
    currency: String,
}

impl TransferService {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        accounts: ConnectedAccountManager,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            processor,
            accounts,
            currency: currency.into(),
        }
    }

    pub async fn send(
        &self,
        sender: UserId,
        transfer: SendTransfer,
        idempotency_key: Option<String>,
    ) -> Result<Transfer, PaymentError> {
        if transfer.amount.is_zero() {
            return Err(PaymentError::InvalidArgument("amount must be positive".into()));
        }
        let destination = self.accounts.recipient_destination(transfer.recipient_id).await?;

        let description = transfer
            .description
            .unwrap_or_else(|| format!("Transfer from user {}", sender));
        let sent = self
            .processor
            .create_transfer(TransferRequest {
                destination,
                amount: transfer.amount,
                currency: self.currency.clone(),
                description: Some(description),
                idempotency_key: scoped_idempotency_key(sender, idempotency_key),
            })
            .await?;

        info!(
            sender = %sender,
            recipient = %transfer.recipient_id,
            transfer_id = %sent.id,
            amount = %sent.amount,
            "Transfer sent"
        );
        Ok(sent)
    }
}
