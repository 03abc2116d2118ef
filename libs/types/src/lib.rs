//! Types library for the driver tracking and payments backend
//!
//! Core type definitions shared by the tracking, payments and gateway
//! services.
//!
//! # Modules
//! - `ids`: Identifiers (UserId, DriverId, PaymentId, ObserverId, processor ids)
//! - `money`: Minor-unit amounts and commission splits
//! - `location`: Driver positions, samples and broadcast events
//! - `payment`: Payment ledger entries
//! - `account`: Users and connected accounts
//! - `errors`: Error taxonomy

pub mod ids;
pub mod money;
pub mod location;
pub mod payment;
pub mod account;
pub mod errors;

pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::account::*;
    pub use crate::errors::*;
    pub use crate::ids::*;
    pub use crate::location::*;
    pub use crate::money::*;
    pub use crate::payment::*;
}
