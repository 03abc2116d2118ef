//! Directory seed file
//!
//! Users and drivers are owned by the registration system; the gateway only
//! reads them. A JSON seed of the form
//! `{"users": [{"id", "username", "email"?}], "drivers": [{"id", "user_id", "vehicle_number"}]}`
//! populates the in-memory directories at startup.

use anyhow::Context;
use payments::directory::InMemoryUserDirectory;
use serde::Deserialize;
use std::path::Path;
use tracking::directory::InMemoryDriverDirectory;
use types::account::User;
use types::location::Driver;

#[derive(Debug, Default, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub drivers: Vec<Driver>,
}

impl DirectorySeed {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading directory file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing directory file {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let seed: DirectorySeed = serde_json::from_str(raw)?;
        for driver in &seed.drivers {
            anyhow::ensure!(
                seed.users.iter().any(|u| u.id == driver.user_id),
                "driver {} references unknown user {}",
                driver.id,
                driver.user_id
            );
        }
        Ok(seed)
    }

    pub fn into_directories(self) -> (InMemoryUserDirectory, InMemoryDriverDirectory) {
        (
            self.users.into_iter().collect(),
            self.drivers.into_iter().collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seed() {
        let seed = DirectorySeed::parse(
            r#"{
                "users": [{"id": 1, "username": "ana"}, {"id": 2, "username": "raj", "email": "raj@example.com"}],
                "drivers": [{"id": 7, "user_id": 2, "vehicle_number": "KA-01-7"}]
            }"#,
        )
        .unwrap();
        assert_eq!(seed.users.len(), 2);
        assert_eq!(seed.drivers[0].vehicle_number, "KA-01-7");
    }

    #[test]
    fn test_driver_must_reference_user() {
        let err = DirectorySeed::parse(
            r#"{"drivers": [{"id": 7, "user_id": 9, "vehicle_number": "X"}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown user"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("directory.json");
        std::fs::write(&path, r#"{"users": [{"id": 1, "username": "ana"}]}"#).unwrap();
        assert_eq!(DirectorySeed::load(&path).unwrap().users.len(), 1);
        assert!(DirectorySeed::load(&dir.path().join("missing.json")).is_err());
    }
}
