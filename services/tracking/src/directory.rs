//! Driver directory
//!
//! Read-only lookup of driver records owned by the registration system.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use types::errors::TrackingError;
use types::ids::DriverId;
use types::location::Driver;

#[async_trait]
pub trait DriverDirectory: Send + Sync {
    async fn find_driver(&self, driver_id: DriverId) -> Result<Option<Driver>, TrackingError>;
}

#[derive(Default, Clone)]
pub struct InMemoryDriverDirectory {
    drivers: Arc<RwLock<HashMap<DriverId, Driver>>>,
}

impl InMemoryDriverDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, driver: Driver) {
        self.drivers.write().await.insert(driver.id, driver);
    }
}

impl FromIterator<Driver> for InMemoryDriverDirectory {
    fn from_iter<I: IntoIterator<Item = Driver>>(iter: I) -> Self {
        let drivers = iter.into_iter().map(|d| (d.id, d)).collect();
        Self {
            drivers: Arc::new(RwLock::new(drivers)),
        }
    }
}

#[async_trait]
impl DriverDirectory for InMemoryDriverDirectory {
    async fn find_driver(&self, driver_id: DriverId) -> Result<Option<Driver>, TrackingError> {
        Ok(self.drivers.read().await.get(&driver_id).cloned())
    }
}
