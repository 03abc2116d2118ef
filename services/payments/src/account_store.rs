//! Connected-account storage
//!
//! One row per user. Rows are created lazily, the external account id is
//! set at most once, and only the onboarding flag changes afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use persistence::journal::JournalConfig;
use persistence::{decode, Journal, PersistenceError};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;
use types::account::ConnectedAccount;
use types::errors::PaymentError;
use types::ids::{ExternalAccountId, UserId};

#[async_trait]
pub trait ConnectedAccountStore: Send + Sync {
    async fn get(&self, user_id: UserId) -> Result<Option<ConnectedAccount>, PaymentError>;

    /// Return the user's row, creating an unprovisioned one if absent.
    async fn get_or_create(&self, user_id: UserId) -> Result<ConnectedAccount, PaymentError>;

    /// Store `external_id` unless the row already has one. Returns the row as
    /// stored afterwards, so a losing writer sees the winner's id.
    async fn set_external_id_if_unset(
        &self,
        user_id: UserId,
        external_id: ExternalAccountId,
    ) -> Result<ConnectedAccount, PaymentError>;

    async fn set_onboarded(&self, user_id: UserId, onboarded: bool) -> Result<ConnectedAccount, PaymentError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum AccountRecord {
    Created(ConnectedAccount),
    ExternalIdSet {
        user_id: UserId,
        external_account_id: ExternalAccountId,
    },
    Onboarded {
        user_id: UserId,
        is_onboarded: bool,
    },
}

impl AccountRecord {
    const KIND: &'static str = "account";
}

#[derive(Default)]
struct AccountTable {
    rows: HashMap<UserId, ConnectedAccount>,
}

impl AccountTable {
    fn row(&self, user_id: UserId) -> Result<&ConnectedAccount, PaymentError> {
        self.rows
            .get(&user_id)
            .ok_or(PaymentError::AccountNotFound { user_id })
    }

    /// The record `get_or_create` must write, if any.
    fn plan_create(&self, user_id: UserId) -> Option<AccountRecord> {
        (!self.rows.contains_key(&user_id))
            .then(|| AccountRecord::Created(ConnectedAccount::new(user_id, Utc::now())))
    }

    fn plan_external_id(
        &self,
        user_id: UserId,
        external_account_id: ExternalAccountId,
    ) -> Result<Option<AccountRecord>, PaymentError> {
        Ok(self
            .row(user_id)?
            .external_account_id
            .is_none()
            .then_some(AccountRecord::ExternalIdSet {
                user_id,
                external_account_id,
            }))
    }

    fn plan_onboarded(&self, user_id: UserId, is_onboarded: bool) -> Result<Option<AccountRecord>, PaymentError> {
        Ok((self.row(user_id)?.is_onboarded != is_onboarded).then_some(AccountRecord::Onboarded {
            user_id,
            is_onboarded,
        }))
    }

    fn apply(&mut self, record: AccountRecord) {
        match record {
            AccountRecord::Created(account) => {
                self.rows.entry(account.user_id).or_insert(account);
            }
            AccountRecord::ExternalIdSet {
                user_id,
                external_account_id,
            } => {
                if let Some(row) = self.rows.get_mut(&user_id) {
                    row.external_account_id.get_or_insert(external_account_id);
                }
            }
            AccountRecord::Onboarded { user_id, is_onboarded } => {
                if let Some(row) = self.rows.get_mut(&user_id) {
                    row.is_onboarded = is_onboarded;
                }
            }
        }
    }
}

/// Account store, in memory or backed by a journal.
///
/// Each mutation plans a record under the write lock, journals it when a
/// journal is attached, then applies it.
#[derive(Clone, Default)]
pub struct AccountStore {
    table: Arc<RwLock<AccountTable>>,
    journal: Option<Journal>,
}

impl AccountStore {
    /// In-memory store; nothing survives a restart.
    pub fn new() -> Self {
        Self::default()
    }

    /// Journaled store: replay `config.dir`, then journal every mutation.
    pub async fn open(config: JournalConfig) -> Result<Self, PaymentError> {
        let (journal, replay) = Journal::open(config).map_err(storage_error)?;
        let mut table = AccountTable::default();
        for entry in replay.entries.iter().filter(|e| e.kind == AccountRecord::KIND) {
            let record: AccountRecord = decode(entry).map_err(storage_error)?;
            table.apply(record);
        }
        info!(accounts = table.rows.len(), "Connected accounts replayed");

        Ok(Self {
            table: Arc::new(RwLock::new(table)),
            journal: Some(journal),
        })
    }

    async fn commit(
        &self,
        table: &mut AccountTable,
        record: Option<AccountRecord>,
    ) -> Result<(), PaymentError> {
        let Some(record) = record else {
            return Ok(());
        };
        if let Some(journal) = &self.journal {
            journal
                .append(AccountRecord::KIND, &record)
                .await
                .map_err(storage_error)?;
        }
        table.apply(record);
        Ok(())
    }
}

#[async_trait]
impl ConnectedAccountStore for AccountStore {
    async fn get(&self, user_id: UserId) -> Result<Option<ConnectedAccount>, PaymentError> {
        Ok(self.table.read().await.rows.get(&user_id).cloned())
    }

    async fn get_or_create(&self, user_id: UserId) -> Result<ConnectedAccount, PaymentError> {
        let mut table = self.table.write().await;
        let record = table.plan_create(user_id);
        self.commit(&mut table, record).await?;
        table.row(user_id).cloned()
    }

    async fn set_external_id_if_unset(
        &self,
        user_id: UserId,
        external_id: ExternalAccountId,
    ) -> Result<ConnectedAccount, PaymentError> {
        let mut table = self.table.write().await;
        let record = table.plan_external_id(user_id, external_id)?;
        self.commit(&mut table, record).await?;
        table.row(user_id).cloned()
    }

    async fn set_onboarded(&self, user_id: UserId, onboarded: bool) -> Result<ConnectedAccount, PaymentError> {
        let mut table = self.table.write().await;
        let record = table.plan_onboarded(user_id, onboarded)?;
        self.commit(&mut table, record).await?;
        table.row(user_id).cloned()
    }
}

fn storage_error(err: PersistenceError) -> PaymentError {
    PaymentError::storage(err.to_string())
}
