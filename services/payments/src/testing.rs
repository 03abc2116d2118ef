//! In-memory payment processor for tests
//!
//! Records every request, hands out deterministic ids (`cs_test_1`,
//! `acct_test_1`, `tr_test_1`, ...), honours idempotency keys on checkout
//! sessions and transfers, and verifies webhooks with a real signature check.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use types::errors::PaymentError;
use types::ids::{CheckoutSessionId, ExternalAccountId};

use crate::event::WebhookEvent;
use crate::processor::{
    AccountLinkRequest, AccountRequest, CheckoutSession, CheckoutSessionRequest, PaymentProcessor,
    ProcessorAccount, Transfer, TransferRequest,
};
use crate::signature::WebhookVerifier;

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_fake_processor";

/// Number of calls per processor operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub create_checkout_session: usize,
    pub create_account: usize,
    pub retrieve_account: usize,
    pub create_transfer: usize,
    pub create_login_link: usize,
    pub create_account_link: usize,
}

#[derive(Default)]
struct FakeState {
    calls: CallCounts,
    next_id: u64,
    fail_next: Option<String>,
    checkout_requests: Vec<CheckoutSessionRequest>,
    account_requests: Vec<AccountRequest>,
    transfer_requests: Vec<TransferRequest>,
    sessions_by_key: HashMap<String, CheckoutSession>,
    transfers_by_key: HashMap<String, Transfer>,
    accounts: HashSet<ExternalAccountId>,
    onboarded: HashSet<ExternalAccountId>,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}_test_{}", prefix, self.next_id)
    }

    fn take_failure(&mut self) -> Result<(), PaymentError> {
        match self.fail_next.take() {
            Some(message) => Err(PaymentError::upstream(message)),
            None => Ok(()),
        }
    }
}

pub struct FakeProcessor {
    state: Mutex<FakeState>,
    verifier: WebhookVerifier,
    latency: Option<Duration>,
}

impl Default for FakeProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProcessor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            verifier: WebhookVerifier::new(TEST_WEBHOOK_SECRET),
            latency: None,
        }
    }

    /// Sleep this long inside every async call, to widen race windows.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next processor call with an upstream error carrying `message`.
    pub fn fail_next(&self, message: impl Into<String>) {
        self.state().fail_next = Some(message.into());
    }

    /// Mark an account as having submitted its onboarding details.
    pub fn complete_onboarding(&self, account: &ExternalAccountId) {
        self.state().onboarded.insert(account.clone());
    }

    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    pub fn checkout_requests(&self) -> Vec<CheckoutSessionRequest> {
        self.state().checkout_requests.clone()
    }

    pub fn account_requests(&self) -> Vec<AccountRequest> {
        self.state().account_requests.clone()
    }

    pub fn transfer_requests(&self) -> Vec<TransferRequest> {
        self.state().transfer_requests.clone()
    }

    /// Signature header for `payload`, valid now.
    pub fn sign(&self, payload: &[u8]) -> String {
        self.verifier
            .sign_now(payload)
            .unwrap_or_else(|e| panic!("signing with the test secret failed: {e}"))
    }

    /// Serialized `checkout.session.completed` event for `session_id`.
    pub fn completed_event(session_id: &CheckoutSessionId) -> Vec<u8> {
        serde_json::json!({
            "id": format!("evt_{}", session_id),
            "type": crate::event::CHECKOUT_SESSION_COMPLETED,
            "data": {"object": {"id": session_id.as_str(), "object": "checkout.session"}},
        })
        .to_string()
        .into_bytes()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn delay(&self) {
        match self.latency {
            Some(latency) => tokio::time::sleep(latency).await,
            None => tokio::task::yield_now().await,
        }
    }
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        self.delay().await;
        let mut state = self.state();
        state.calls.create_checkout_session += 1;
        state.take_failure()?;

        if let Some(existing) = request
            .idempotency_key
            .as_ref()
            .and_then(|key| state.sessions_by_key.get(key))
        {
            return Ok(existing.clone());
        }

        if let Some(transfer) = &request.transfer {
            if !state.accounts.contains(&transfer.destination) {
                return Err(PaymentError::upstream(format!(
                    "No such destination: '{}'",
                    transfer.destination
                )));
            }
        }

        let id = CheckoutSessionId::new(state.next_id("cs"));
        let session = CheckoutSession {
            url: format!("https://checkout.example.test/pay/{}", id),
            id,
        };
        if let Some(key) = &request.idempotency_key {
            state.sessions_by_key.insert(key.clone(), session.clone());
        }
        state.checkout_requests.push(request);
        Ok(session)
    }

    async fn create_account(&self, request: AccountRequest) -> Result<ProcessorAccount, PaymentError> {
        self.delay().await;
        let mut state = self.state();
        state.calls.create_account += 1;
        state.take_failure()?;

        let id = ExternalAccountId::new(state.next_id("acct"));
        state.accounts.insert(id.clone());
        state.account_requests.push(request);
        Ok(ProcessorAccount {
            id,
            details_submitted: false,
            charges_enabled: false,
            payouts_enabled: false,
        })
    }

    async fn retrieve_account(&self, account: &ExternalAccountId) -> Result<ProcessorAccount, PaymentError> {
        self.delay().await;
        let mut state = self.state();
        state.calls.retrieve_account += 1;
        state.take_failure()?;

        if !state.accounts.contains(account) {
            return Err(PaymentError::upstream(format!("No such account: '{}'", account)));
        }
        let onboarded = state.onboarded.contains(account);
        Ok(ProcessorAccount {
            id: account.clone(),
            details_submitted: onboarded,
            charges_enabled: onboarded,
            payouts_enabled: onboarded,
        })
    }

    async fn create_transfer(&self, request: TransferRequest) -> Result<Transfer, PaymentError> {
        self.delay().await;
        let mut state = self.state();
        state.calls.create_transfer += 1;
        state.take_failure()?;

        if let Some(existing) = request
            .idempotency_key
            .as_ref()
            .and_then(|key| state.transfers_by_key.get(key))
        {
            return Ok(existing.clone());
        }
        if !state.accounts.contains(&request.destination) {
            return Err(PaymentError::upstream(format!(
                "No such destination: '{}'",
                request.destination
            )));
        }

        let transfer = Transfer {
            id: state.next_id("tr"),
            amount: request.amount,
            destination: request.destination.clone(),
        };
        if let Some(key) = &request.idempotency_key {
            state.transfers_by_key.insert(key.clone(), transfer.clone());
        }
        state.transfer_requests.push(request);
        Ok(transfer)
    }

    async fn create_login_link(&self, account: &ExternalAccountId) -> Result<String, PaymentError> {
        self.delay().await;
        let mut state = self.state();
        state.calls.create_login_link += 1;
        state.take_failure()?;
        Ok(format!("https://connect.example.test/express/{}/login", account))
    }

    async fn create_account_link(&self, request: AccountLinkRequest) -> Result<String, PaymentError> {
        self.delay().await;
        let mut state = self.state();
        state.calls.create_account_link += 1;
        state.take_failure()?;
        Ok(format!("https://connect.example.test/setup/{}", request.account))
    }

    fn verify_webhook(&self, payload: &[u8], signature: Option<&str>) -> Result<WebhookEvent, PaymentError> {
        let header = signature.ok_or_else(|| PaymentError::invalid_signature("missing signature header"))?;
        self.verifier.verify(payload, header)?;
        WebhookEvent::parse(payload)
    }
}
