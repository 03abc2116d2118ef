//! Payments service
//!
//! Checkout sessions, webhook reconciliation, connected accounts and direct
//! transfers against a Stripe-style payment processor.
//!
//! ```text
//!   client ──► CheckoutOrchestrator ──► PaymentProcessor (create session)
//!                      │
//!                      └──► PaymentLedger (pending)
//!
//!   processor ──► WebhookReconciler ──► verify ──► PaymentLedger (settled)
//!
//!   user ──► ConnectedAccountManager ──► PaymentProcessor (accounts, links)
//!                      │
//!                      └──► ConnectedAccountStore
//! ```
//!
//! The processor sits behind [`processor::PaymentProcessor`];
//! [`stripe::StripeClient`] talks to the real API and
//! `testing::FakeProcessor` (feature `testing`) backs the tests.

pub mod account_store;
pub mod accounts;
pub mod checkout;
pub mod directory;
pub mod event;
pub mod ledger;
pub mod processor;
pub mod signature;
pub mod stripe;
pub mod transfer;
pub mod webhook;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub const SERVICE_VERSION: &str = "0.1.0";
