use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use types::errors::{ErrorKind, PaymentError, TrackingError};

/// Central error type for the Gateway application
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The resource exists but is not in a state that allows the operation
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment processor error: {0}")]
    Upstream(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    fn from_kind(kind: ErrorKind, message: String, source: anyhow::Error) -> Self {
        match kind {
            ErrorKind::NotFound => AppError::NotFound(message),
            ErrorKind::FailedPrecondition => AppError::Conflict(message),
            ErrorKind::InvalidArgument | ErrorKind::InvalidSignature => AppError::BadRequest(message),
            ErrorKind::Upstream => AppError::Upstream(message),
            ErrorKind::Storage => AppError::InternalError(source),
        }
    }
}

impl From<TrackingError> for AppError {
    fn from(err: TrackingError) -> Self {
        AppError::from_kind(err.kind(), err.to_string(), err.into())
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        // Upstream messages are passed through as the processor wrote them.
        let message = match &err {
            PaymentError::Upstream { message } => message.clone(),
            other => other.to_string(),
        };
        AppError::from_kind(err.kind(), message, err.into())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, code) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, "UNAUTHORIZED"),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, "FORBIDDEN"),
            AppError::RateLimitExceeded(msg) => {
                (StatusCode::TOO_MANY_REQUESTS, msg, "RATE_LIMIT_EXCEEDED")
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "BAD_REQUEST"),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "NOT_FOUND"),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg, "FAILED_PRECONDITION"),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg, "UPSTREAM_ERROR"),
            AppError::InternalError(err) => {
                tracing::error!(error = %err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    "INTERNAL_ERROR",
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
            "code": code
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::{DriverId, UserId};

    async fn render(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_driver_not_found_body() {
        let (status, body) = render(
            TrackingError::DriverNotFound {
                driver_id: DriverId::new(1),
            }
            .into(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Driver not found");
    }

    #[tokio::test]
    async fn test_payment_error_statuses() {
        let user_id = UserId::new(2);
        let cases = [
            (PaymentError::UserNotFound { user_id }, StatusCode::NOT_FOUND),
            (PaymentError::NoConnectedAccount { user_id }, StatusCode::CONFLICT),
            (PaymentError::InvalidArgument("x".into()), StatusCode::BAD_REQUEST),
            (PaymentError::invalid_signature("x"), StatusCode::BAD_REQUEST),
            (PaymentError::MalformedEvent { reason: "x".into() }, StatusCode::BAD_REQUEST),
            (PaymentError::upstream("declined"), StatusCode::BAD_GATEWAY),
            (PaymentError::storage("disk"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let (status, _) = render(err.into()).await;
            assert_eq!(status, expected);
        }
    }

    #[tokio::test]
    async fn test_internal_details_not_leaked() {
        let (_, body) = render(PaymentError::storage("/var/data/segment-000001.log: EIO").into()).await;
        assert_eq!(body["error"], "Internal server error");
        assert_eq!(body["code"], "INTERNAL_ERROR");

        let (_, body) = render(PaymentError::upstream("Your card was declined").into()).await;
        assert_eq!(body["error"], "Your card was declined");
    }
}
