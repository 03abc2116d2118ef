//! Stripe REST client
//!
//! Form-encoded requests with bearer auth against the Stripe API. Error
//! bodies (`{"error": {"message": ...}}`) are surfaced verbatim as
//! [`PaymentError::Upstream`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};
use types::errors::PaymentError;
use types::ids::ExternalAccountId;

use crate::event::WebhookEvent;
use crate::processor::{
    AccountLinkRequest, AccountRequest, CheckoutSession, CheckoutSessionRequest, PaymentProcessor,
    ProcessorAccount, Transfer, TransferRequest, ACCOUNT_CAPABILITIES,
};
use crate::signature::WebhookVerifier;

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

type Form = Vec<(String, String)>;

#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl StripeConfig {
    pub fn new(secret_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            webhook_secret: webhook_secret.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct StripeClient {
    http: Client,
    api_base: String,
    secret_key: String,
    verifier: WebhookVerifier,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Deserialize)]
struct UrlObject {
    url: String,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Result<Self, PaymentError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PaymentError::upstream(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_key: config.secret_key,
            verifier: WebhookVerifier::new(config.webhook_secret),
        })
    }

    fn post(&self, path: &str, form: &Form, idempotency_key: Option<&str>) -> RequestBuilder {
        let mut request = self
            .http
            .post(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.secret_key)
            .form(form);
        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_HEADER, key);
        }
        request
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.http
            .get(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.secret_key)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, PaymentError> {
        let response = request
            .send()
            .await
            .map_err(|e| PaymentError::upstream(e.to_string()))?;
        parse_response(response).await
    }
}

async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T, PaymentError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| PaymentError::upstream(e.to_string()))?;

    if !status.is_success() {
        let message = error_message(status.as_u16(), &body);
        warn!(status = status.as_u16(), %message, "Stripe request failed");
        return Err(PaymentError::upstream(message));
    }

    serde_json::from_str(&body)
        .map_err(|e| PaymentError::upstream(format!("unexpected Stripe response: {}", e)))
}

fn error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope {
            error: ErrorBody {
                message: Some(message),
                ..
            },
        }) => message,
        Ok(ErrorEnvelope {
            error: ErrorBody { kind: Some(kind), .. },
        }) => format!("{} (HTTP {})", kind, status),
        _ => format!("HTTP {}", status),
    }
}

fn push(form: &mut Form, key: &str, value: impl ToString) {
    form.push((key.to_string(), value.to_string()));
}

pub(crate) fn checkout_form(request: &CheckoutSessionRequest) -> Form {
    let mut form = Form::new();
    push(&mut form, "mode", "payment");
    push(&mut form, "payment_method_types[0]", "card");
    push(&mut form, "line_items[0][price_data][currency]", &request.currency);
    push(
        &mut form,
        "line_items[0][price_data][product_data][name]",
        &request.line_item.name,
    );
    push(
        &mut form,
        "line_items[0][price_data][unit_amount]",
        request.line_item.unit_amount,
    );
    push(&mut form, "line_items[0][quantity]", request.line_item.quantity);
    push(&mut form, "success_url", &request.success_url);
    push(&mut form, "cancel_url", &request.cancel_url);
    if let Some(reference) = &request.client_reference_id {
        push(&mut form, "client_reference_id", reference);
    }
    if let Some(transfer) = &request.transfer {
        push(
            &mut form,
            "payment_intent_data[transfer_data][destination]",
            &transfer.destination,
        );
        push(
            &mut form,
            "payment_intent_data[transfer_data][amount]",
            transfer.amount,
        );
    }
    form
}

pub(crate) fn account_form(request: &AccountRequest) -> Form {
    let mut form = Form::new();
    push(&mut form, "type", "express");
    for capability in ACCOUNT_CAPABILITIES {
        push(&mut form, &format!("capabilities[{}][requested]", capability), true);
    }
    if let Some(email) = &request.email {
        push(&mut form, "email", email);
    }
    if let Some(country) = &request.country {
        push(&mut form, "country", country);
    }
    form
}

pub(crate) fn transfer_form(request: &TransferRequest) -> Form {
    let mut form = Form::new();
    push(&mut form, "amount", request.amount);
    push(&mut form, "currency", &request.currency);
    push(&mut form, "destination", &request.destination);
    if let Some(description) = &request.description {
        push(&mut form, "description", description);
    }
    form
}

pub(crate) fn account_link_form(request: &AccountLinkRequest) -> Form {
    let mut form = Form::new();
    push(&mut form, "account", &request.account);
    push(&mut form, "refresh_url", &request.refresh_url);
    push(&mut form, "return_url", &request.return_url);
    push(&mut form, "type", "account_onboarding");
    form
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let form = checkout_form(&request);
        let session: CheckoutSession = self
            .send(self.post(
                "/v1/checkout/sessions",
                &form,
                request.idempotency_key.as_deref(),
            ))
            .await?;
        debug!(session_id = %session.id, "Checkout session created");
        Ok(session)
    }

    async fn create_account(&self, request: AccountRequest) -> Result<ProcessorAccount, PaymentError> {
        self.send(self.post("/v1/accounts", &account_form(&request), None))
            .await
    }

    async fn retrieve_account(&self, account: &ExternalAccountId) -> Result<ProcessorAccount, PaymentError> {
        self.send(self.get(&format!("/v1/accounts/{}", account))).await
    }

    async fn create_transfer(&self, request: TransferRequest) -> Result<Transfer, PaymentError> {
        self.send(self.post(
            "/v1/transfers",
            &transfer_form(&request),
            request.idempotency_key.as_deref(),
        ))
        .await
    }

    async fn create_login_link(&self, account: &ExternalAccountId) -> Result<String, PaymentError> {
        let link: UrlObject = self
            .send(self.post(&format!("/v1/accounts/{}/login_links", account), &Form::new(), None))
            .await?;
        Ok(link.url)
    }

    async fn create_account_link(&self, request: AccountLinkRequest) -> Result<String, PaymentError> {
        let link: UrlObject = self
            .send(self.post("/v1/account_links", &account_link_form(&request), None))
            .await?;
        Ok(link.url)
    }

    fn verify_webhook(&self, payload: &[u8], signature: Option<&str>) -> Result<WebhookEvent, PaymentError> {
        let header = signature.ok_or_else(|| PaymentError::invalid_signature("missing signature header"))?;
        self.verifier.verify(payload, header)?;
        WebhookEvent::parse(payload)
    }
}
