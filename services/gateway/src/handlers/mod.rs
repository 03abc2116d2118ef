pub mod accounts;
pub mod health;
pub mod location;
pub mod pages;
pub mod payments;
pub mod webhook;
pub mod ws;

use crate::error::AppError;
use axum::extract::FromRequest;

/// `Json` extractor whose rejections use the gateway error body
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// Optional `Idempotency-Key` request header, forwarded to the processor
pub const IDEMPOTENCY_KEY: &str = "idempotency-key";

pub fn idempotency_key(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_KEY)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
