//! Per-vehicle state read by alert rules

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::{value_as_f64, Probe};

/// Static vehicle description from the asset directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    /// Free-form vehicle properties (e.g. `fueltank` capacity)
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl VehicleInfo {
    /// Fuel tank capacity, when known and positive.
    pub fn fuel_tank(&self) -> Option<f64> {
        self.properties
            .get("fueltank")
            .and_then(value_as_f64)
            .filter(|capacity| *capacity > 0.0)
    }

    /// Whether this vehicle belongs to the designated simulation vendor.
    pub fn is_simulated(&self, simulation_vendor: &str) -> bool {
        self.vendor.as_deref() == Some(simulation_vendor)
    }
}

/// Aggregate vehicle state for one rule evaluation.
///
/// `prev_probe` is owned by the caller (the pipeline's vehicle tracker) and
/// replaced after each evaluation; rules only read it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub vehicle_info: VehicleInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_probe: Option<Probe>,
}

impl Vehicle {
    pub fn new(vehicle_info: VehicleInfo) -> Self {
        Self {
            vehicle_info,
            prev_probe: None,
        }
    }
}
