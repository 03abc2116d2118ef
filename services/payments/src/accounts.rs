//! Connected-account manager
//!
//! Provisions and queries each user's account with the processor's
//! connected-accounts product.
//!
//! Invariants:
//! - At most one processor account is created per user. Calls for the same
//!   user are serialised by a per-user async lock, and the store refuses to
//!   replace an external id once set. A user's lock lives only while some
//!   call for that user is in flight
//! - Login and onboarding links are fetched fresh on every call and never
//!   stored

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};
use types::account::ConnectedAccount;
use types::errors::PaymentError;
use types::ids::{ExternalAccountId, UserId};

use crate::account_store::ConnectedAccountStore;
use crate::directory::UserDirectory;
use crate::processor::{AccountLinkRequest, AccountRequest, PaymentProcessor};

/// Where the processor sends the user after hosted onboarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingUrls {
    pub refresh_url: String,
    pub return_url: String,
}

#[derive(Clone)]
pub struct ConnectedAccountManager {
    processor: Arc<dyn PaymentProcessor>,
    store: Arc<dyn ConnectedAccountStore>,
    users: Arc<dyn UserDirectory>,
    onboarding: OnboardingUrls,
    provisioning: Arc<DashMap<UserId, Arc<Mutex<()>>>>,
}

impl ConnectedAccountManager {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        store: Arc<dyn ConnectedAccountStore>,
        users: Arc<dyn UserDirectory>,
        onboarding: OnboardingUrls,
    ) -> Self {
        Self {
            processor,
            store,
            users,
            onboarding,
            provisioning: Arc::new(DashMap::new()),
        }
    }

    /// Get or create the user's account, provisioning it with the processor
    /// if it has no external id yet.
    pub async fn ensure_account(
        &self,
        user_id: UserId,
        request: AccountRequest,
    ) -> Result<ConnectedAccount, PaymentError> {
        let user = self
            .users
            .find_user(user_id)
            .await?
            .ok_or(PaymentError::UserNotFound { user_id })?;

        let lock = self.provisioning.entry(user_id).or_default().clone();
        let result = {
            let _guard = lock.lock().await;
            self.provision(user_id, request.email.or(user.email), request.country)
                .await
        };
        drop(lock);
        self.provisioning
            .remove_if(&user_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn provision(
        &self,
        user_id: UserId,
        email: Option<String>,
        country: Option<String>,
    ) -> Result<ConnectedAccount, PaymentError> {
        let account = self.store.get_or_create(user_id).await?;
        if account.is_provisioned() {
            return Ok(account);
        }

        let request = AccountRequest { email, country };
        let created = self.processor.create_account(request).await?;
        let stored = self
            .store
            .set_external_id_if_unset(user_id, created.id.clone())
            .await?;

        if stored.external_account_id.as_ref() != Some(&created.id) {
            warn!(
                user_id = %user_id,
                discarded = %created.id,
                "Connected account already provisioned; keeping existing id"
            );
        } else {
            info!(user_id = %user_id, account_id = %created.id, "Connected account provisioned");
        }
        Ok(stored)
    }

    /// Dashboard login URL for the user's provisioned account.
    pub async fn create_login_link(&self, user_id: UserId) -> Result<String, PaymentError> {
        let account_id = self.provisioned_id(user_id).await?;
        self.processor.create_login_link(&account_id).await
    }

    /// Hosted onboarding URL for the user's provisioned account.
    pub async fn create_onboarding_link(&self, user_id: UserId) -> Result<String, PaymentError> {
        let account_id = self.provisioned_id(user_id).await?;
        self.processor
            .create_account_link(AccountLinkRequest {
                account: account_id,
                refresh_url: self.onboarding.refresh_url.clone(),
                return_url: self.onboarding.return_url.clone(),
            })
            .await
    }

    /// Refresh `is_onboarded` from the processor's view of the account.
    pub async fn sync_onboarding(&self, user_id: UserId) -> Result<ConnectedAccount, PaymentError> {
        let account_id = self.provisioned_id(user_id).await?;
        let remote = self.processor.retrieve_account(&account_id).await?;
        let account = self.store.set_onboarded(user_id, remote.details_submitted).await?;
        info!(
            user_id = %user_id,
            onboarded = account.is_onboarded,
            "Onboarding status synced"
        );
        Ok(account)
    }

    pub async fn status(&self, user_id: UserId) -> Result<ConnectedAccount, PaymentError> {
        self.store
            .get(user_id)
            .await?
            .ok_or(PaymentError::AccountNotFound { user_id })
    }

    /// External id of a payment recipient. The recipient must exist and own
    /// a provisioned account.
    pub async fn recipient_destination(&self, recipient: UserId) -> Result<ExternalAccountId, PaymentError> {
        self.users
            .find_user(recipient)
            .await?
            .ok_or(PaymentError::UserNotFound { user_id: recipient })?;

        self.store
            .get(recipient)
            .await?
            .and_then(|account| account.external_account_id)
            .ok_or(PaymentError::NoConnectedAccount { user_id: recipient })
    }

    async fn provisioned_id(&self, user_id: UserId) -> Result<ExternalAccountId, PaymentError> {
        self.store
            .get(user_id)
            .await?
            .and_then(|account| account.external_account_id)
            .ok_or(PaymentError::AccountNotProvisioned { user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account_store::AccountStore;
    use crate::directory::InMemoryUserDirectory;
    use crate::testing::FakeProcessor;
    use types::account::User;

    fn users() -> Arc<InMemoryUserDirectory> {
        Arc::new(
            [1, 2]
                .into_iter()
                .map(|id| User {
                    id: UserId::new(id),
                    username: format!("user{}", id),
                    email: Some(format!("user{}@example.com", id)),
                })
                .collect(),
        )
    }

    fn manager(processor: Arc<FakeProcessor>) -> ConnectedAccountManager {
        ConnectedAccountManager::new(
            processor,
            Arc::new(AccountStore::new()),
            users(),
            OnboardingUrls {
                refresh_url: "http://localhost/connect-refresh/".into(),
                return_url: "http://localhost/connect-success/".into(),
            },
        )
    }

    #[tokio::test]
    async fn test_ensure_account_provisions_once() {
        let processor = Arc::new(FakeProcessor::new());
        let accounts = manager(processor.clone());

        let first = accounts.ensure_account(UserId::new(1), AccountRequest::default()).await.unwrap();
        let second = accounts.ensure_account(UserId::new(1), AccountRequest::default()).await.unwrap();
        assert!(first.is_provisioned());
        assert_eq!(first.external_account_id, second.external_account_id);
        assert_eq!(processor.calls().create_account, 1);
        assert_eq!(
            processor.account_requests()[0].email.as_deref(),
            Some("user1@example.com")
        );
    }

    #[tokio::test]
    async fn test_provisioning_locks_are_released() {
        let processor = Arc::new(FakeProcessor::new());
        processor.fail_next("account creation disabled");
        let accounts = manager(processor);

        assert!(accounts.ensure_account(UserId::new(1), AccountRequest::default()).await.is_err());
        assert!(accounts.provisioning.is_empty());

        let calls: Vec<_> = (0..8)
            .map(|i| {
                let accounts = accounts.clone();
                tokio::spawn(async move {
                    accounts
                        .ensure_account(UserId::new(1 + i % 2), AccountRequest::default())
                        .await
                })
            })
            .collect();
        for call in calls {
            assert!(call.await.unwrap().unwrap().is_provisioned());
        }
        assert!(accounts.provisioning.is_empty());
    }

    #[tokio::test]
    async fn test_ensure_account_unknown_user() {
        let accounts = manager(Arc::new(FakeProcessor::new()));
        let err = accounts
            .ensure_account(UserId::new(42), AccountRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err, PaymentError::UserNotFound { user_id: UserId::new(42) });
    }

    #[tokio::test]
    async fn test_failed_provisioning_leaves_row_unprovisioned() {
        let processor = Arc::new(FakeProcessor::new());
        processor.fail_next("account creation disabled");
        let accounts = manager(processor.clone());

        let err = accounts
            .ensure_account(UserId::new(1), AccountRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Upstream { .. }));
        assert!(!accounts.status(UserId::new(1)).await.unwrap().is_provisioned());

        // A retry provisions normally.
        let account = accounts.ensure_account(UserId::new(1), AccountRequest::default()).await.unwrap();
        assert!(account.is_provisioned());
    }

    #[tokio::test]
    async fn test_links_require_provisioned_account() {
        let processor = Arc::new(FakeProcessor::new());
        let accounts = manager(processor.clone());
        let user = UserId::new(1);

        assert_eq!(
            accounts.create_login_link(user).await.unwrap_err(),
            PaymentError::AccountNotProvisioned { user_id: user }
        );
        assert!(accounts.create_onboarding_link(user).await.is_err());

        let account = accounts.ensure_account(user, AccountRequest::default()).await.unwrap();
        let id = account.external_account_id.unwrap();
        assert!(accounts.create_login_link(user).await.unwrap().contains(id.as_str()));
        assert!(accounts.create_onboarding_link(user).await.unwrap().contains(id.as_str()));
        assert_eq!(processor.calls().create_login_link, 1);
        assert_eq!(processor.calls().create_account_link, 1);
    }

    #[tokio::test]
    async fn test_sync_onboarding_follows_processor() {
        let processor = Arc::new(FakeProcessor::new());
        let accounts = manager(processor.clone());
        let user = UserId::new(2);

        let account = accounts.ensure_account(user, AccountRequest::default()).await.unwrap();
        assert!(!accounts.sync_onboarding(user).await.unwrap().is_onboarded);

        processor.complete_onboarding(account.external_account_id.as_ref().unwrap());
        assert!(accounts.sync_onboarding(user).await.unwrap().is_onboarded);
        assert!(accounts.status(user).await.unwrap().is_onboarded);
    }

    #[tokio::test]
    async fn test_recipient_destination() {
        let accounts = manager(Arc::new(FakeProcessor::new()));

        assert_eq!(
            accounts.recipient_destination(UserId::new(9)).await.unwrap_err(),
            PaymentError::UserNotFound { user_id: UserId::new(9) }
        );
        assert_eq!(
            accounts.recipient_destination(UserId::new(2)).await.unwrap_err(),
            PaymentError::NoConnectedAccount { user_id: UserId::new(2) }
        );

        let account = accounts.ensure_account(UserId::new(2), AccountRequest::default()).await.unwrap();
        assert_eq!(
            accounts.recipient_destination(UserId::new(2)).await.unwrap(),
            account.external_account_id.unwrap()
        );
    }
}
