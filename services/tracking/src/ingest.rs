//! Location ingest
//!
//! Validates a driver's position update, persists it, then broadcasts it.
//!
//! Invariants:
//! - Nothing is persisted or broadcast for an unknown driver or an invalid
//!   position
//! - Persistence happens before broadcast; observers are never told about a
//!   sample that failed to persist
//! - Broadcast problems never fail the call and never roll back the write

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use types::errors::TrackingError;
use types::ids::DriverId;
use types::location::{Coordinates, Driver, DriverLocationSample, LocationUpdate};

use crate::directory::DriverDirectory;
use crate::hub::{BroadcastHub, PublishReport};
use crate::store::LocationStore;

/// Result of a successful ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReceipt {
    pub sample: DriverLocationSample,
    pub broadcast: PublishReport,
}

/// An update for a known driver with a valid position, ready to record.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmittedUpdate {
    driver: Driver,
    position: Coordinates,
}

impl AdmittedUpdate {
    pub fn driver_id(&self) -> DriverId {
        self.driver.id
    }
}

/// Ingest pipeline: directory check → store → hub.
#[derive(Clone)]
pub struct LocationIngest {
    drivers: Arc<dyn DriverDirectory>,
    store: Arc<dyn LocationStore>,
    hub: BroadcastHub,
}

impl LocationIngest {
    pub fn new(
        drivers: Arc<dyn DriverDirectory>,
        store: Arc<dyn LocationStore>,
        hub: BroadcastHub,
    ) -> Self {
        Self { drivers, store, hub }
    }

    pub async fn ingest(&self, update: LocationUpdate) -> Result<IngestReceipt, TrackingError> {
        let admitted = self.admit(update).await?;
        self.record(admitted).await
    }

    /// Validate the position and resolve the driver, without side effects.
    pub async fn admit(&self, update: LocationUpdate) -> Result<AdmittedUpdate, TrackingError> {
        let position = update.coordinates()?;

        let driver = self
            .drivers
            .find_driver(update.driver_id)
            .await?
            .ok_or(TrackingError::DriverNotFound {
                driver_id: update.driver_id,
            })?;

        Ok(AdmittedUpdate { driver, position })
    }

    /// Persist an admitted update, then broadcast it.
    pub async fn record(&self, admitted: AdmittedUpdate) -> Result<IngestReceipt, TrackingError> {
        let AdmittedUpdate { driver, position } = admitted;
        let sample = DriverLocationSample::new(driver.id, position, Utc::now());
        self.store.append(sample.clone()).await?;

        let broadcast = self.hub.publish(&sample.to_event());
        debug!(
            driver_id = %driver.id,
            delivered = broadcast.delivered,
            dropped = broadcast.dropped,
            evicted = broadcast.evicted,
            "Location broadcast"
        );
        info!(
            driver_id = %driver.id,
            latitude = sample.latitude,
            longitude = sample.longitude,
            "Location updated"
        );

        Ok(IngestReceipt { sample, broadcast })
    }
}
