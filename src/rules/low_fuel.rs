//! Low fuel: fuel ratio drops through 10% of the tank

use super::{close_with, crossed_below, fuel_ratio, previous_fuel_ratio, AlertRule};
use crate::config::defaults::{LOW_FUEL_RATIO, SIMULATION_VENDOR};
use crate::types::{Alert, Probe, Severity, Vehicle};

pub struct LowFuelRule {
    threshold: f64,
    simulation_vendor: String,
}

impl LowFuelRule {
    pub const NAME: &'static str = "low_fuel";
    pub const DESCRIPTION: &'static str = "Fuel at 1/10 tank.";

    pub fn new(threshold: f64, simulation_vendor: &str) -> Self {
        Self {
            threshold,
            simulation_vendor: simulation_vendor.to_string(),
        }
    }
}

impl Default for LowFuelRule {
    fn default() -> Self {
        Self::new(LOW_FUEL_RATIO, SIMULATION_VENDOR)
    }
}

impl AlertRule for LowFuelRule {
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
        let current = fuel_ratio(probe, vehicle);
        if !crossed_below(previous_fuel_ratio(vehicle), current, self.threshold) {
            return Vec::new();
        }
        vec![Alert::for_rule(
            Self::NAME,
            Self::DESCRIPTION,
            self.severity(),
            probe,
            vehicle,
            &self.simulation_vendor,
        )]
    }

    fn close(&self, alert: &Alert, probe: &Probe, vehicle: &Vehicle) -> Option<Alert> {
        let current = fuel_ratio(probe, vehicle)?;
        if current >= self.threshold {
            close_with(alert, probe)
        } else {
            None
        }
    }
}
