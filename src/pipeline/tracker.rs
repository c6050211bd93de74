//! Per-vehicle state for rule evaluation

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::acquisition::{AssetDirectory, DirectoryError};
use crate::types::{Probe, Vehicle};

#[derive(Default)]
struct TrackedVehicle {
    vehicle: Vehicle,
    /// False until the directory has answered, found or not
    info_loaded: bool,
}

/// Owns each vehicle's info and previous probe.
///
/// Lives on the pipeline worker, which processes probes one at a time, so
/// evaluation of a given vehicle is never concurrent.
pub struct VehicleTracker {
    directory: Arc<dyn AssetDirectory>,
    vehicles: HashMap<String, TrackedVehicle>,
}

impl VehicleTracker {
    pub fn new(directory: Arc<dyn AssetDirectory>) -> Self {
        Self {
            directory,
            vehicles: HashMap::new(),
        }
    }

    /// State for `mo_id`, fetching vehicle info until the directory answers.
    ///
    /// Until then the vehicle evaluates with empty info, so rules that need
    /// vehicle properties (fuel tank capacity) simply cannot fire. A vehicle
    /// the directory does not know is not asked about again; an unavailable
    /// directory is retried on the vehicle's next probe.
    pub async fn vehicle(&mut self, mo_id: &str) -> &Vehicle {
        let loaded = self.vehicles.get(mo_id).is_some_and(|t| t.info_loaded);
        if !loaded {
            let (info, info_loaded) = match self.directory.vehicle_info(mo_id).await {
                Ok(info) => (Some(info), true),
                Err(e @ DirectoryError::NotFound(_)) => {
                    warn!(mo_id, error = %e, "Vehicle not in directory, using empty info");
                    (None, true)
                }
                Err(e @ DirectoryError::Unavailable(_)) => {
                    warn!(mo_id, error = %e, "Vehicle info unavailable, retrying on next probe");
                    (None, false)
                }
            };
            let tracked = self.vehicles.entry(mo_id.to_string()).or_insert_with(|| {
                debug!(mo_id, "Tracking new vehicle");
                TrackedVehicle::default()
            });
            tracked.vehicle.vehicle_info = info.unwrap_or_default();
            tracked.info_loaded = info_loaded;
        }
        &self
            .vehicles
            .entry(mo_id.to_string())
            .or_default()
            .vehicle
    }

    /// Store `probe` as its vehicle's previous probe.
    ///
    /// A probe older than the stored one is not stored, so late samples never
    /// rewind state. Returns whether the probe was stored.
    pub fn record_probe(&mut self, probe: Probe) -> bool {
        let vehicle = &mut self.vehicles.entry(probe.mo_id.clone()).or_default().vehicle;
        if let Some(prev) = &vehicle.prev_probe {
            if probe.is_older_than(prev) {
                debug!(mo_id = %probe.mo_id, ts = ?probe.ts, prev_ts = ?prev.ts, "Out-of-order probe not recorded");
                return false;
            }
        }
        vehicle.prev_probe = Some(probe);
        true
    }

    pub fn get(&self, mo_id: &str) -> Option<&Vehicle> {
        self.vehicles.get(mo_id).map(|t| &t.vehicle)
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{AssetIdentity, StaticAssetDirectory};
    use crate::config::AssetConfig;
    use crate::types::VehicleInfo;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tracker() -> VehicleTracker {
        VehicleTracker::new(Arc::new(StaticAssetDirectory::from_config(&[AssetConfig {
            device_id: "dev-1".to_string(),
            device_type: "vehicle".to_string(),
            vehicle_id: "car-1".to_string(),
            driver_id: None,
            vendor: Some("IBM".to_string()),
            properties: BTreeMap::from([("fueltank".to_string(), json!(60))]),
        }])))
    }

    fn probe(ts: i64) -> Probe {
        Probe {
            mo_id: "car-1".to_string(),
            trip_id: "t".to_string(),
            ts: Some(ts),
            latitude: 0.0,
            longitude: 0.0,
            matched_latitude: None,
            matched_longitude: None,
            speed: None,
            heading: 0.0,
            driver_id: None,
            props: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_loads_vehicle_info_once() {
        let mut tracker = tracker();
        let vehicle = tracker.vehicle("car-1").await;
        assert_eq!(vehicle.vehicle_info.fuel_tank(), Some(60.0));
        assert!(vehicle.prev_probe.is_none());

        // Unknown vehicles still get tracked with empty info
        let unknown = tracker.vehicle("car-404").await;
        assert_eq!(unknown.vehicle_info, VehicleInfo::default());
        assert_eq!(tracker.len(), 2);
    }

    #[tokio::test]
    async fn test_out_of_order_probe_does_not_rewind() {
        let mut tracker = tracker();
        tracker.vehicle("car-1").await;
        assert!(tracker.record_probe(probe(2_000)));
        assert!(!tracker.record_probe(probe(1_000)));
        assert!(tracker.record_probe(probe(2_000)));
        assert_eq!(tracker.get("car-1").unwrap().prev_probe.as_ref().unwrap().ts, Some(2_000));
        // Vehicle info survives probe updates
        assert_eq!(tracker.get("car-1").unwrap().vehicle_info.fuel_tank(), Some(60.0));
    }

    /// Unavailable for the first `outages` calls, then serves a 60 L tank.
    struct FlakyDirectory {
        outages: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AssetDirectory for FlakyDirectory {
        async fn resolve_identity(&self, device_id: &str, _device_type: &str) -> Result<AssetIdentity, DirectoryError> {
            Err(DirectoryError::NotFound(device_id.to_string()))
        }

        async fn vehicle_info(&self, vehicle_id: &str) -> Result<VehicleInfo, DirectoryError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.outages {
                return Err(DirectoryError::Unavailable(format!("{vehicle_id}: connection refused")));
            }
            Ok(VehicleInfo {
                vendor: None,
                properties: BTreeMap::from([("fueltank".to_string(), json!(60))]),
            })
        }
    }

    #[tokio::test]
    async fn test_unavailable_directory_is_retried() {
        let directory = Arc::new(FlakyDirectory {
            outages: 1,
            calls: AtomicUsize::new(0),
        });
        let mut tracker = VehicleTracker::new(directory.clone());

        assert_eq!(tracker.vehicle("car-1").await.vehicle_info.fuel_tank(), None);
        assert!(tracker.record_probe(probe(1_000)));

        let vehicle = tracker.vehicle("car-1").await;
        assert_eq!(vehicle.vehicle_info.fuel_tank(), Some(60.0));
        // The probe recorded during the outage is kept
        assert_eq!(vehicle.prev_probe.as_ref().unwrap().ts, Some(1_000));

        tracker.vehicle("car-1").await;
        assert_eq!(directory.calls.load(Ordering::SeqCst), 2);
    }
}
