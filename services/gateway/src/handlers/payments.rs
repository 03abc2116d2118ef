use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::handlers::{AppJson, idempotency_key};
use crate::models::{
    CheckoutResponse, CreatePaymentRequest, TransferPaymentRequest, TransferRequest,
    TransferResponse,
};
use crate::rate_limit;
use crate::state::AppState;
use axum::{extract::State, http::HeaderMap, Json};
use payments::checkout::{CheckoutOutcome, SplitCheckout};
use payments::transfer::SendTransfer;
use types::payment::PaymentSummary;

fn checkout_response(outcome: CheckoutOutcome) -> Json<CheckoutResponse> {
    Json(CheckoutResponse {
        session_id: outcome.session.id,
        checkout_url: outcome.session.url,
    })
}

/// `POST /create-payment/`
pub async fn create_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    AppJson(payload): AppJson<CreatePaymentRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    state
        .rate_limiter
        .check_rate_limit(&format!("{}:checkout", user.user_id), rate_limit::CHECKOUT)?;

    let outcome = state
        .checkout
        .simple_checkout(user.user_id, payload.into(), idempotency_key(&headers))
        .await?;
    Ok(checkout_response(outcome))
}

/// `POST /transfer-payment/`
pub async fn transfer_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    AppJson(payload): AppJson<TransferPaymentRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    state
        .rate_limiter
        .check_rate_limit(&format!("{}:checkout", user.user_id), rate_limit::CHECKOUT)?;

    let outcome = state
        .checkout
        .split_checkout(
            user.user_id,
            SplitCheckout {
                recipient_id: payload.recipient_id,
                amount: payload.amount,
                commission_pct: payload.commission_pct,
            },
            idempotency_key(&headers),
        )
        .await?;
    Ok(checkout_response(outcome))
}

/// `POST /transfer/`
pub async fn transfer(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    AppJson(payload): AppJson<TransferRequest>,
) -> Result<Json<TransferResponse>, AppError> {
    state
        .rate_limiter
        .check_rate_limit(&format!("{}:transfer", user.user_id), rate_limit::TRANSFER)?;

    let sent = state
        .transfers
        .send(
            user.user_id,
            SendTransfer {
                recipient_id: payload.recipient_id,
                amount: payload.amount,
                description: payload.description,
            },
            idempotency_key(&headers),
        )
        .await?;
    Ok(Json(TransferResponse {
        transfer_id: sent.id,
        amount: sent.amount,
        destination: sent.destination,
    }))
}

/// `GET /api/payments/`: the caller's ledger entries, newest first
pub async fn list_payments(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<PaymentSummary>>, AppError> {
    let entries = state.ledger.list_for_user(user.user_id).await?;
    Ok(Json(entries.iter().map(PaymentSummary::from).collect()))
}
