//! Rule engine: runs every registered rule against one probe

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error, warn};

use super::{default_rules, AlertRule};
use crate::config::RulesConfig;
use crate::queue::panic_message;
use crate::types::{Alert, Probe, Vehicle};

/// Alert transitions produced by one evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// Newly opened alerts, at most one per type
    pub fired: Vec<Alert>,
    /// Previously open alerts, now carrying `closed_ts`
    pub closed: Vec<Alert>,
    /// Rules that panicked during this evaluation
    pub failed_rules: Vec<String>,
}

impl Evaluation {
    pub fn is_empty(&self) -> bool {
        self.fired.is_empty() && self.closed.is_empty()
    }
}

/// Ordered set of alert rules.
///
/// Stateless per call: the caller supplies the vehicle's previous probe and
/// its open alerts, and persists the returned transitions. The engine owns the
/// one-open-alert-per-type invariant for every rule: `fire` is skipped while
/// an alert of the rule's type is open.
pub struct RuleEngine {
    rules: Vec<Box<dyn AlertRule>>,
}

impl RuleEngine {
    pub fn new(rules: Vec<Box<dyn AlertRule>>) -> Self {
        Self { rules }
    }

    pub fn from_config(config: &RulesConfig) -> Self {
        Self::new(default_rules(config))
    }

    /// Append a rule; it runs after the rules already registered.
    pub fn register(&mut self, rule: Box<dyn AlertRule>) {
        self.rules.push(rule);
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate `probe` against every rule in registration order.
    ///
    /// `open_alerts` is the vehicle's current open set; entries for other
    /// vehicles or already closed are ignored. A `prev_probe` that belongs to
    /// another vehicle is ignored as if absent.
    pub fn evaluate(&self, probe: &Probe, vehicle: &Vehicle, open_alerts: &[Alert]) -> Evaluation {
        let sanitized;
        let vehicle = match &vehicle.prev_probe {
            Some(prev) if prev.mo_id != probe.mo_id => {
                warn!(
                    mo_id = %probe.mo_id,
                    prev_mo_id = %prev.mo_id,
                    "Previous probe belongs to another vehicle, ignoring it"
                );
                sanitized = Vehicle::new(vehicle.vehicle_info.clone());
                &sanitized
            }
            _ => vehicle,
        };

        let open: Vec<&Alert> = open_alerts
            .iter()
            .filter(|a| a.is_open() && a.mo_id == probe.mo_id)
            .collect();
        let open_types: HashSet<&str> = open.iter().map(|a| a.alert_type.as_str()).collect();
        let mut evaluation = Evaluation::default();

        // Only registered rules close alerts. An open alert whose type has no
        // rule (disabled or retired since it fired) stays open and untouched.
        for rule in &self.rules {
            let name = rule.name();
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                let fired = if open_types.contains(name) {
                    Vec::new()
                } else {
                    rule.fire(probe, vehicle)
                };
                let closed: Vec<Alert> = open
                    .iter()
                    .filter(|a| a.alert_type == name)
                    .filter_map(|a| rule.close(a, probe, vehicle))
                    .collect();
                (fired, closed)
            }));

            let (fired, closed) = match result {
                Ok(transitions) => transitions,
                Err(panic) => {
                    error!(
                        rule = name,
                        mo_id = %probe.mo_id,
                        panic = %panic_message(panic.as_ref()),
                        "Alert rule panicked, skipping it for this probe"
                    );
                    evaluation.failed_rules.push(name.to_string());
                    continue;
                }
            };

            for alert in fired {
                if open_types.contains(alert.alert_type.as_str())
                    || evaluation.fired.iter().any(|f| f.alert_type == alert.alert_type)
                {
                    warn!(rule = name, alert_type = %alert.alert_type, mo_id = %probe.mo_id, "Dropping duplicate alert");
                    continue;
                }
                debug!(rule = name, mo_id = %probe.mo_id, "Alert fired");
                evaluation.fired.push(alert);
            }

            for alert in closed {
                if alert.is_open() {
                    warn!(rule = name, mo_id = %probe.mo_id, "Rule returned an unclosed alert from close, ignoring it");
                    continue;
                }
                debug!(rule = name, mo_id = %probe.mo_id, "Alert closed");
                evaluation.closed.push(alert);
            }
        }

        evaluation
    }
}
