//! Location store
//!
//! Append-only storage of driver position samples. The in-memory store keeps
//! samples per driver in arrival order; the journaled store writes every
//! sample to a [`persistence::Journal`] before indexing it and rebuilds the
//! index from the journal on open.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use persistence::journal::JournalConfig;
use persistence::{decode, Journal, PersistenceError};
use tokio::sync::RwLock;
use types::errors::TrackingError;
use types::ids::DriverId;
use types::location::DriverLocationSample;

const APPENDED: &str = "location.appended";

#[async_trait]
pub trait LocationStore: Send + Sync {
    /// Persist one sample. Samples are never updated or removed.
    async fn append(&self, sample: DriverLocationSample) -> Result<(), TrackingError>;

    /// Most recent sample for a driver.
    async fn latest(&self, driver_id: DriverId) -> Result<Option<DriverLocationSample>, TrackingError>;

    /// Up to `limit` samples for a driver, newest first.
    async fn history(
        &self,
        driver_id: DriverId,
        limit: usize,
    ) -> Result<Vec<DriverLocationSample>, TrackingError>;

    /// Total number of samples across all drivers.
    async fn count(&self) -> Result<usize, TrackingError>;
}

/// Thread-safe in-memory location store.
#[derive(Default, Clone)]
pub struct InMemoryLocationStore {
    samples: Arc<RwLock<HashMap<DriverId, Vec<DriverLocationSample>>>>,
}

impl InMemoryLocationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocationStore for InMemoryLocationStore {
    async fn append(&self, sample: DriverLocationSample) -> Result<(), TrackingError> {
        let mut samples = self.samples.write().await;
        samples.entry(sample.driver_id).or_default().push(sample);
        Ok(())
    }

    async fn latest(&self, driver_id: DriverId) -> Result<Option<DriverLocationSample>, TrackingError> {
        let samples = self.samples.read().await;
        Ok(samples.get(&driver_id).and_then(|s| s.last()).cloned())
    }

    async fn history(
        &self,
        driver_id: DriverId,
        limit: usize,
    ) -> Result<Vec<DriverLocationSample>, TrackingError> {
        let samples = self.samples.read().await;
        Ok(samples
            .get(&driver_id)
            .map(|s| s.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn count(&self) -> Result<usize, TrackingError> {
        let samples = self.samples.read().await;
        Ok(samples.values().map(Vec::len).sum())
    }
}

/// Location store backed by an append-only journal.
#[derive(Clone)]
pub struct JournaledLocationStore {
    index: InMemoryLocationStore,
    journal: Journal,
}

impl JournaledLocationStore {
    /// Open the journal at `config.dir` and replay its samples.
    pub async fn open(config: JournalConfig) -> Result<Self, TrackingError> {
        let (journal, replay) = Journal::open(config).map_err(storage_error)?;
        let index = InMemoryLocationStore::new();

        for entry in replay.entries.iter().filter(|e| e.kind == APPENDED) {
            let sample: DriverLocationSample = decode(entry).map_err(storage_error)?;
            index.append(sample).await?;
        }
        tracing::info!(samples = index.count().await?, "Location store replayed");

        Ok(Self { index, journal })
    }
}

#[async_trait]
impl LocationStore for JournaledLocationStore {
    async fn append(&self, sample: DriverLocationSample) -> Result<(), TrackingError> {
        self.journal
            .append(APPENDED, &sample)
            .await
            .map_err(storage_error)?;
        self.index.append(sample).await
    }

    async fn latest(&self, driver_id: DriverId) -> Result<Option<DriverLocationSample>, TrackingError> {
        self.index.latest(driver_id).await
    }

    async fn history(
        &self,
        driver_id: DriverId,
        limit: usize,
    ) -> Result<Vec<DriverLocationSample>, TrackingError> {
        self.index.history(driver_id, limit).await
    }

    async fn count(&self) -> Result<usize, TrackingError> {
        self.index.count().await
    }
}

fn storage_error(err: PersistenceError) -> TrackingError {
    TrackingError::Storage {
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;
    use types::location::Coordinates;

    fn sample(driver: u64, lat: f64, secs: i64) -> DriverLocationSample {
        DriverLocationSample::new(
            DriverId::new(driver),
            Coordinates::new(lat, 10.0).unwrap(),
            Utc.timestamp_opt(1_760_000_000 + secs, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_in_memory_latest_and_history() {
        let store = InMemoryLocationStore::new();
        store.append(sample(1, 1.0, 0)).await.unwrap();
        store.append(sample(1, 2.0, 1)).await.unwrap();
        store.append(sample(1, 3.0, 2)).await.unwrap();
        store.append(sample(2, 9.0, 0)).await.unwrap();

        assert_eq!(store.latest(DriverId::new(1)).await.unwrap().unwrap().latitude, 3.0);
        let history = store.history(DriverId::new(1), 2).await.unwrap();
        assert_eq!(
            history.iter().map(|s| s.latitude).collect::<Vec<_>>(),
            vec![3.0, 2.0]
        );
        assert_eq!(store.count().await.unwrap(), 4);
        assert!(store.latest(DriverId::new(3)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_journaled_store_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let store = JournaledLocationStore::open(JournalConfig::new(tmp.path()))
                .await
                .unwrap();
            store.append(sample(7, 40.7, 0)).await.unwrap();
            store.append(sample(7, 40.8, 5)).await.unwrap();
        }

        let store = JournaledLocationStore::open(JournalConfig::new(tmp.path()))
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
        let latest = store.latest(DriverId::new(7)).await.unwrap().unwrap();
        assert_eq!(latest, sample(7, 40.8, 5));
    }
}
