//! Alert rules and the rule engine
//!
//! Each rule evaluates one condition per probe and owns the open/close
//! transitions of alerts of its own type. Transition conditions (fuel
//! dropping through a threshold) compare the current probe against
//! `vehicle.prev_probe`; level conditions (engine over temperature) look at
//! the current probe only.
//!
//! ## Rules
//!
//! 1. **low_fuel** (High) - fuel ratio drops below 10%
//! 2. **high_engine_temp** (High) - engine temperature above 120
//! 3. **half_fuel** (Medium, off by default) - fuel ratio drops below 50%
//!
//! Duplicate suppression is done by [`RuleEngine`], not by the rules: `fire`
//! is only called when no alert of the rule's type is open for the vehicle.

pub mod engine;
pub mod half_fuel;
pub mod high_engine_temp;
pub mod low_fuel;

pub use engine::{Evaluation, RuleEngine};
pub use half_fuel::HalfFuelRule;
pub use high_engine_temp::HighEngineTempRule;
pub use low_fuel::LowFuelRule;

use crate::config::RulesConfig;
use crate::types::{Alert, Probe, Severity, Vehicle};

/// A threshold rule registered into the [`RuleEngine`].
pub trait AlertRule: Send + Sync {
    /// Rule name, also the `type` of the alerts it produces
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn severity(&self) -> Severity;

    /// New alerts for this probe (usually zero or one).
    fn fire(&self, probe: &Probe, vehicle: &Vehicle) -> Vec<Alert>;

    /// A closed copy of `alert` if this probe ends its condition.
    ///
    /// Must return `None` for an alert that is already closed.
    fn close(&self, alert: &Alert, probe: &Probe, vehicle: &Vehicle) -> Option<Alert>;
}

/// Build the enabled rules in registration order: low_fuel, high_engine_temp, half_fuel.
pub fn default_rules(config: &RulesConfig) -> Vec<Box<dyn AlertRule>> {
    let mut rules: Vec<Box<dyn AlertRule>> = Vec::new();
    if config.low_fuel.enabled {
        rules.push(Box::new(LowFuelRule::new(
            config.low_fuel.threshold_ratio,
            &config.simulation_vendor,
        )));
    }
    if config.high_engine_temp.enabled {
        rules.push(Box::new(HighEngineTempRule::new(
            config.high_engine_temp.limit,
            &config.simulation_vendor,
        )));
    }
    if config.half_fuel.enabled {
        rules.push(Box::new(HalfFuelRule::new(
            config.half_fuel.threshold_ratio,
            &config.simulation_vendor,
        )));
    }
    rules
}

/// Close `alert` at the probe's time (or now, for probes without `ts`).
///
/// Already-closed alerts yield `None`, which makes re-closing a no-op.
pub fn close_with(alert: &Alert, probe: &Probe) -> Option<Alert> {
    if !alert.is_open() {
        return None;
    }
    let ts = probe
        .ts
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
    Some(alert.closed_at(ts))
}

/// Fuel remaining as a fraction of the tank.
///
/// `fuelLevel` is a percentage; otherwise `fuel` is divided by the vehicle's
/// `fueltank` capacity. `None` when neither can be derived.
pub fn fuel_ratio(probe: &Probe, vehicle: &Vehicle) -> Option<f64> {
    if let Some(level) = probe.prop_f64("fuelLevel") {
        return Some(level / 100.0);
    }
    let fuel = probe.prop_f64("fuel")?;
    let tank = vehicle.vehicle_info.fuel_tank()?;
    Some(fuel / tank)
}

/// Edge trigger for "dropped below `threshold`".
///
/// True iff `current` is in `[0, threshold)` and `previous` was undefined or
/// at/above the threshold.
pub fn crossed_below(previous: Option<f64>, current: Option<f64>, threshold: f64) -> bool {
    let Some(current) = current else {
        return false;
    };
    let was_above = previous.map_or(true, |p| p >= threshold);
    was_above && (0.0..threshold).contains(&current)
}

/// Fuel ratio of the vehicle's previous probe, evaluated against the same vehicle info.
fn previous_fuel_ratio(vehicle: &Vehicle) -> Option<f64> {
    vehicle
        .prev_probe
        .as_ref()
        .and_then(|prev| fuel_ratio(prev, vehicle))
}
