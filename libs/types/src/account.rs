//! User and connected-account types

use crate::ids::{ExternalAccountId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user record, owned by the external auth/registration system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// A user's account with the payment processor's connected-accounts product.
///
/// One per user. `external_account_id` is empty until provisioning succeeds
/// and is never replaced once set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedAccount {
    pub user_id: UserId,
    pub external_account_id: Option<ExternalAccountId>,
    pub is_onboarded: bool,
    pub created_at: DateTime<Utc>,
}

impl ConnectedAccount {
    pub fn new(user_id: UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            external_account_id: None,
            is_onboarded: false,
            created_at,
        }
    }

    /// Whether the account can receive transfers.
    pub fn is_provisioned(&self) -> bool {
        self.external_account_id.is_some()
    }
}
