//! Error types for tracking and payments
//!
//! Error taxonomy using thiserror. Each variant belongs to one of the kinds
//! in [`ErrorKind`], which the HTTP layer maps to a status code.

use crate::ids::{CheckoutSessionId, DriverId, UserId};
use thiserror::Error;

/// Coarse classification shared by all domain errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    FailedPrecondition,
    InvalidArgument,
    /// Webhook authenticity check failed
    InvalidSignature,
    /// The payment processor rejected or failed the call
    Upstream,
    Storage,
}

/// Location ingest and store errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackingError {
    #[error("Driver not found")]
    DriverNotFound { driver_id: DriverId },

    #[error("Invalid coordinates: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinates { latitude: f64, longitude: f64 },

    #[error("Location store error: {message}")]
    Storage { message: String },
}

impl TrackingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrackingError::DriverNotFound { .. } => ErrorKind::NotFound,
            TrackingError::InvalidCoordinates { .. } => ErrorKind::InvalidArgument,
            TrackingError::Storage { .. } => ErrorKind::Storage,
        }
    }
}

/// Checkout, ledger, webhook and connected-account errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PaymentError {
    #[error("User not found: {user_id}")]
    UserNotFound { user_id: UserId },

    #[error("No connected account for user {user_id}")]
    AccountNotFound { user_id: UserId },

    #[error("Recipient {user_id} has no connected account")]
    NoConnectedAccount { user_id: UserId },

    #[error("Connected account for user {user_id} has not been provisioned")]
    AccountNotProvisioned { user_id: UserId },

    #[error("Checkout session {session_id} is already recorded for a different payment")]
    SessionConflict { session_id: CheckoutSessionId },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid webhook signature: {reason}")]
    InvalidSignature { reason: String },

    #[error("Malformed webhook event: {reason}")]
    MalformedEvent { reason: String },

    #[error("Payment processor error: {message}")]
    Upstream { message: String },

    #[error("Payment store error: {message}")]
    Storage { message: String },
}

impl PaymentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::UserNotFound { .. } | PaymentError::AccountNotFound { .. } => {
                ErrorKind::NotFound
            }
            PaymentError::NoConnectedAccount { .. }
            | PaymentError::AccountNotProvisioned { .. }
            | PaymentError::SessionConflict { .. } => ErrorKind::FailedPrecondition,
            PaymentError::InvalidArgument(_) | PaymentError::MalformedEvent { .. } => {
                ErrorKind::InvalidArgument
            }
            PaymentError::InvalidSignature { .. } => ErrorKind::InvalidSignature,
            PaymentError::Upstream { .. } => ErrorKind::Upstream,
            PaymentError::Storage { .. } => ErrorKind::Storage,
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        PaymentError::Upstream {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        PaymentError::Storage {
            message: message.into(),
        }
    }

    pub fn invalid_signature(reason: impl Into<String>) -> Self {
        PaymentError::InvalidSignature {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_not_found_message() {
        let err = TrackingError::DriverNotFound {
            driver_id: DriverId::new(9),
        };
        assert_eq!(err.to_string(), "Driver not found");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_upstream_passes_message_through() {
        let err = PaymentError::upstream("No such destination: 'acct_x'");
        assert!(err.to_string().contains("No such destination"));
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }

    #[test]
    fn test_precondition_kinds() {
        let user_id = UserId::new(4);
        assert_eq!(
            PaymentError::NoConnectedAccount { user_id }.kind(),
            ErrorKind::FailedPrecondition
        );
        assert_eq!(
            PaymentError::AccountNotProvisioned { user_id }.kind(),
            ErrorKind::FailedPrecondition
        );
    }
}
