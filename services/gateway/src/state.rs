use crate::auth::JwtKeys;
use crate::config::GatewayConfig;
use crate::fixtures::DirectorySeed;
use crate::rate_limit::RateLimiter;
use payments::account_store::{AccountStore, ConnectedAccountStore};
use payments::accounts::{ConnectedAccountManager, OnboardingUrls};
use payments::checkout::{CheckoutOrchestrator, CheckoutSettings};
use payments::directory::{InMemoryUserDirectory, UserDirectory};
use payments::ledger::{InMemoryLedger, JournaledLedger, PaymentLedger};
use payments::processor::PaymentProcessor;
use payments::stripe::{StripeClient, StripeConfig};
use payments::transfer::TransferService;
use payments::webhook::WebhookReconciler;
use persistence::journal::JournalConfig;
use std::sync::Arc;
use tracking::directory::{DriverDirectory, InMemoryDriverDirectory};
use tracking::hub::{BroadcastHub, HubConfig};
use tracking::ingest::LocationIngest;
use tracking::store::{InMemoryLocationStore, JournaledLocationStore, LocationStore};

/// Collaborators and stores the gateway is wired from
pub struct Backends {
    pub processor: Arc<dyn PaymentProcessor>,
    pub users: Arc<dyn UserDirectory>,
    pub drivers: Arc<dyn DriverDirectory>,
    pub locations: Arc<dyn LocationStore>,
    pub ledger: Arc<dyn PaymentLedger>,
    pub accounts: Arc<dyn ConnectedAccountStore>,
}

impl Backends {
    /// Stripe client, seeded directories, and journaled stores when
    /// `data_dir` is set.
    pub async fn from_config(config: &GatewayConfig) -> anyhow::Result<Self> {
        let mut stripe = StripeConfig::new(&config.stripe_secret_key, &config.stripe_webhook_secret);
        stripe.api_base = config.stripe_api_base.clone();
        let processor = Arc::new(StripeClient::new(stripe)?);

        let seed = match &config.directory_file {
            Some(path) => DirectorySeed::load(path)?,
            None => DirectorySeed::default(),
        };
        tracing::info!(
            users = seed.users.len(),
            drivers = seed.drivers.len(),
            "Directories seeded"
        );
        let (users, drivers) = seed.into_directories();

        let (locations, ledger, accounts): (
            Arc<dyn LocationStore>,
            Arc<dyn PaymentLedger>,
            Arc<dyn ConnectedAccountStore>,
        ) = match &config.data_dir {
            Some(dir) => {
                tracing::info!(data_dir = %dir.display(), "Using journaled stores");
                (
                    Arc::new(JournaledLocationStore::open(JournalConfig::new(dir.join("locations"))).await?),
                    Arc::new(JournaledLedger::open(JournalConfig::new(dir.join("ledger"))).await?),
                    Arc::new(AccountStore::open(JournalConfig::new(dir.join("accounts"))).await?),
                )
            }
            None => {
                tracing::warn!("DATA_DIR not set; stores are in-memory only");
                (
                    Arc::new(InMemoryLocationStore::new()),
                    Arc::new(InMemoryLedger::new()),
                    Arc::new(AccountStore::new()),
                )
            }
        };

        Ok(Self {
            processor,
            users: Arc::new(users),
            drivers: Arc::new(drivers),
            locations,
            ledger,
            accounts,
        })
    }

    /// In-memory stores and empty directories around `processor`.
    pub fn in_memory(processor: Arc<dyn PaymentProcessor>) -> Self {
        Self {
            processor,
            users: Arc::new(InMemoryUserDirectory::new()),
            drivers: Arc::new(InMemoryDriverDirectory::new()),
            locations: Arc::new(InMemoryLocationStore::new()),
            ledger: Arc::new(InMemoryLedger::new()),
            accounts: Arc::new(AccountStore::new()),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub rate_limiter: Arc<RateLimiter>,
    pub jwt: Arc<JwtKeys>,
    pub hub: BroadcastHub,
    pub ingest: LocationIngest,
    pub checkout: CheckoutOrchestrator,
    pub webhooks: WebhookReconciler,
    pub accounts: ConnectedAccountManager,
    pub transfers: TransferService,
    pub ledger: Arc<dyn PaymentLedger>,
}

impl AppState {
    pub fn new(config: &GatewayConfig, backends: Backends) -> Self {
        let hub = BroadcastHub::new(HubConfig {
            queue_capacity: config.observer_queue_capacity,
            lag_policy: config.observer_lag_policy,
        });
        let ingest = LocationIngest::new(backends.drivers, backends.locations, hub.clone());

        let accounts = ConnectedAccountManager::new(
            backends.processor.clone(),
            backends.accounts,
            backends.users,
            OnboardingUrls {
                refresh_url: config.public_url("/connect-refresh/"),
                return_url: config.public_url("/connect-success/"),
            },
        );
        let checkout = CheckoutOrchestrator::new(
            backends.processor.clone(),
            backends.ledger.clone(),
            accounts.clone(),
            CheckoutSettings {
                currency: config.currency.clone(),
                success_url: config.public_url("/success/"),
                cancel_url: config.public_url("/cancel/"),
            },
        );
        let transfers = TransferService::new(
            backends.processor.clone(),
            accounts.clone(),
            config.currency.clone(),
        );
        let webhooks = WebhookReconciler::new(backends.processor, backends.ledger.clone());

        Self {
            rate_limiter: Arc::new(RateLimiter::new()),
            jwt: Arc::new(JwtKeys::new(&config.jwt_secret)),
            hub,
            ingest,
            checkout,
            webhooks,
            accounts,
            transfers,
            ledger: backends.ledger,
        }
    }
}
