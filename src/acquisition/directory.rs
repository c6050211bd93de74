//! Asset directory: device identity → vehicle/driver identity and vehicle info

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

use crate::config::AssetConfig;
use crate::types::VehicleInfo;

/// Who a device belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetIdentity {
    pub vehicle_id: String,
    pub driver_id: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DirectoryError {
    #[error("asset not found: {0}")]
    NotFound(String),
    #[error("asset directory unavailable: {0}")]
    Unavailable(String),
}

/// Lookup service for asset identity and vehicle descriptions.
///
/// Both calls may suspend (remote directories), so they are only ever made
/// from the pipeline worker, never from the router's dispatch path.
#[async_trait]
pub trait AssetDirectory: Send + Sync {
    async fn resolve_identity(
        &self,
        device_id: &str,
        device_type: &str,
    ) -> Result<AssetIdentity, DirectoryError>;

    async fn vehicle_info(&self, vehicle_id: &str) -> Result<VehicleInfo, DirectoryError>;
}

// ============================================================================
// Static Directory
// ============================================================================

/// In-memory directory built from the `[[assets]]` config table.
#[derive(Debug, Default)]
pub struct StaticAssetDirectory {
    identities: HashMap<(String, String), AssetIdentity>,
    vehicles: HashMap<String, VehicleInfo>,
}

impl StaticAssetDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(assets: &[AssetConfig]) -> Self {
        let mut directory = Self::new();
        for asset in assets {
            directory.insert(asset);
        }
        debug!(
            devices = directory.identities.len(),
            vehicles = directory.vehicles.len(),
            "Static asset directory loaded"
        );
        directory
    }

    /// Register one device. A later entry for the same device replaces the earlier one.
    pub fn insert(&mut self, asset: &AssetConfig) {
        self.identities.insert(
            (asset.device_type.clone(), asset.device_id.clone()),
            AssetIdentity {
                vehicle_id: asset.vehicle_id.clone(),
                driver_id: asset.driver_id.clone(),
            },
        );
        self.vehicles.insert(
            asset.vehicle_id.clone(),
            VehicleInfo {
                vendor: asset.vendor.clone(),
                properties: asset.properties.clone(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

#[async_trait]
impl AssetDirectory for StaticAssetDirectory {
    async fn resolve_identity(
        &self,
        device_id: &str,
        device_type: &str,
    ) -> Result<AssetIdentity, DirectoryError> {
        self.identities
            .get(&(device_type.to_string(), device_id.to_string()))
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(format!("{device_type} device {device_id}")))
    }

    async fn vehicle_info(&self, vehicle_id: &str) -> Result<VehicleInfo, DirectoryError> {
        self.vehicles
            .get(vehicle_id)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(format!("vehicle {vehicle_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn asset(device_id: &str, vehicle_id: &str) -> AssetConfig {
        AssetConfig {
            device_id: device_id.to_string(),
            device_type: "vehicle".to_string(),
            vehicle_id: vehicle_id.to_string(),
            driver_id: Some("driver-9".to_string()),
            vendor: Some("IBM".to_string()),
            properties: BTreeMap::from([("fueltank".to_string(), json!(60))]),
        }
    }

    #[tokio::test]
    async fn test_resolves_registered_device() {
        let directory = StaticAssetDirectory::from_config(&[asset("dev-1", "car-1")]);
        let identity = directory.resolve_identity("dev-1", "vehicle").await.unwrap();
        assert_eq!(identity.vehicle_id, "car-1");
        assert_eq!(identity.driver_id.as_deref(), Some("driver-9"));

        let info = directory.vehicle_info("car-1").await.unwrap();
        assert_eq!(info.fuel_tank(), Some(60.0));
        assert_eq!(info.vendor.as_deref(), Some("IBM"));
    }

    #[tokio::test]
    async fn test_device_type_is_part_of_the_key() {
        let directory = StaticAssetDirectory::from_config(&[asset("dev-1", "car-1")]);
        let err = directory.resolve_identity("dev-1", "gateway").await.unwrap_err();
        assert!(matches!(err, DirectoryError::NotFound(_)));
        assert!(directory.vehicle_info("car-2").await.is_err());
    }

    #[test]
    fn test_later_entry_replaces_earlier() {
        let mut directory = StaticAssetDirectory::from_config(&[asset("dev-1", "car-1")]);
        directory.insert(&asset("dev-1", "car-2"));
        assert_eq!(directory.len(), 1);

        let identity = tokio_test::block_on(directory.resolve_identity("dev-1", "vehicle")).unwrap();
        assert_eq!(identity.vehicle_id, "car-2");
    }
}
