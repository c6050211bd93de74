//! High engine temperature: level check on `engineTemp`

use super::{close_with, AlertRule};
use crate::config::defaults::{HIGH_ENGINE_TEMP_LIMIT, SIMULATION_VENDOR};
use crate::types::{Alert, Probe, Severity, Vehicle};

const ENGINE_TEMP_PROP: &str = "engineTemp";

pub struct HighEngineTempRule {
    limit: f64,
    simulation_vendor: String,
}

impl HighEngineTempRule {
    pub const NAME: &'static str = "high_engine_temp";
    pub const DESCRIPTION: &'static str = "Engine temperature is too high.";

    pub fn new(limit: f64, simulation_vendor: &str) -> Self {
        Self {
            limit,
            simulation_vendor: simulation_vendor.to_string(),
        }
    }
}

impl Default for HighEngineTempRule {
    fn default() -> Self {
        Self::new(HIGH_ENGINE_TEMP_LIMIT, SIMULATION_VENDOR)
    }
}

impl AlertRule for HighEngineTempRule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        Self::DESCRIPTION
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn fire(&self, probe: &Probe, vehicle: &Vehicle) -> Vec<Alert> {
        match probe.prop_f64(ENGINE_TEMP_PROP) {
            Some(temp) if temp > self.limit => vec![Alert::for_rule(
                Self::NAME,
                Self::DESCRIPTION,
                self.severity(),
                probe,
                vehicle,
                &self.simulation_vendor,
            )],
            _ => Vec::new(),
        }
    }

    fn close(&self, alert: &Alert, probe: &Probe, _vehicle: &Vehicle) -> Option<Alert> {
        let temp = probe.prop_f64(ENGINE_TEMP_PROP)?;
        if temp <= self.limit {
            close_with(alert, probe)
        } else {
            None
        }
    }
}
