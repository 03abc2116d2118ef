use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::models::{ConnectAccountRequest, ConnectAccountResponse, LinkResponse};
use crate::state::AppState;
use axum::{body::Bytes, extract::State, Json};
use payments::processor::AccountRequest;

/// `POST /connect-account/`; the JSON body is optional.
pub async fn create_connect_account(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Bytes,
) -> Result<Json<ConnectAccountResponse>, AppError> {
    let request: ConnectAccountRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ConnectAccountRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(e.to_string()))?
    };
    let account = state
        .accounts
        .ensure_account(
            user.user_id,
            AccountRequest {
                email: request.email,
                country: request.country,
            },
        )
        .await?;
    Ok(Json(account.into()))
}

/// `GET /connect-account/`
pub async fn get_connect_account(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ConnectAccountResponse>, AppError> {
    let account = state.accounts.status(user.user_id).await?;
    Ok(Json(account.into()))
}

/// `POST /connect-account/sync/`
pub async fn sync_connect_account(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ConnectAccountResponse>, AppError> {
    let account = state.accounts.sync_onboarding(user.user_id).await?;
    Ok(Json(account.into()))
}

/// `POST /onboarding-link/`
pub async fn onboarding_link(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<LinkResponse>, AppError> {
    let url = state.accounts.create_onboarding_link(user.user_id).await?;
    Ok(Json(LinkResponse { url }))
}

/// `POST /login-link/`
pub async fn login_link(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<LinkResponse>, AppError> {
    let url = state.accounts.create_login_link(user.user_id).await?;
    Ok(Json(LinkResponse { url }))
}
