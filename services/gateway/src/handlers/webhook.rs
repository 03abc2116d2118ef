use crate::error::AppError;
use crate::models::WebhookAck;
use crate::state::AppState;
use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use payments::signature::SIGNATURE_HEADER;
use payments::webhook::WebhookOutcome;

/// `POST /webhook/`
///
/// Takes the raw body: the signature covers the exact bytes sent.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let outcome = state.webhooks.handle(&body, signature).await?;

    let outcome = match outcome {
        WebhookOutcome::Settled { .. } => "settled",
        WebhookOutcome::AlreadySettled { .. } => "already_settled",
        WebhookOutcome::Unmatched { .. } => "unmatched",
        WebhookOutcome::Ignored { .. } => "ignored",
    };
    Ok(Json(WebhookAck {
        status: "ok".to_string(),
        outcome: outcome.to_string(),
    }))
}
