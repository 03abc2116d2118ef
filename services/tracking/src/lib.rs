//! Driver Tracking Service
//!
//! Ingests driver position updates and fans them out to admin observers:
//! - Driver directory lookups
//! - Append-only location store (in-memory or journaled)
//! - Broadcast hub with bounded per-observer queues
//!
//! # Architecture
//!
//! ```text
//! Driver device
//!      │
//!  ┌───▼───┐
//!  │Ingest │  ← validates position, checks driver exists
//!  └───┬───┘
//!      │ 1. persist
//!  ┌───▼───┐
//!  │ Store │
//!  └───┬───┘
//!      │ 2. publish
//!  ┌───▼─────────────────────┐
//!  │ Broadcast Hub           │
//!  │ (admin_tracking group)  │
//!  └──┬──────────┬────────┬──┘
//!     ▼          ▼        ▼
//!  observer   observer  observer
//! ```

pub mod directory;
pub mod hub;
pub mod ingest;
pub mod store;

pub const SERVICE_VERSION: &str = "0.1.0";
