//! Alert domain event with an open/close lifecycle

use serde::{Deserialize, Serialize};

use super::{Probe, Vehicle};

/// Alert severity, most severe first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "Critical"),
            Severity::High => write!(f, "High"),
            Severity::Medium => write!(f, "Medium"),
            Severity::Low => write!(f, "Low"),
        }
    }
}

/// What produced an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSource {
    /// Producer kind; rule-generated alerts use `"script"`
    #[serde(rename = "type")]
    pub kind: String,
    /// Producer identifier (the rule name for rule-generated alerts)
    pub id: String,
}

/// A per-vehicle alert.
///
/// Created open by a rule's `fire`, transitioned by a rule's `close` (which
/// sets `closed_ts` exactly once). Alerts are never deleted by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub source: AlertSource,
    /// Rule name
    #[serde(rename = "type")]
    pub alert_type: String,
    pub description: String,
    pub severity: Severity,
    pub mo_id: String,
    /// Fire time (epoch millis), copied from the triggering probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub simulated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_ts: Option<i64>,
}

impl Alert {
    /// Build an open alert for `rule_name` from the triggering probe.
    pub fn for_rule(
        rule_name: &str,
        description: &str,
        severity: Severity,
        probe: &Probe,
        vehicle: &Vehicle,
        simulation_vendor: &str,
    ) -> Self {
        let (latitude, longitude) = probe.position();
        Self {
            source: AlertSource {
                kind: "script".to_string(),
                id: rule_name.to_string(),
            },
            alert_type: rule_name.to_string(),
            description: description.to_string(),
            severity,
            mo_id: probe.mo_id.clone(),
            ts: probe.ts,
            latitude,
            longitude,
            simulated: vehicle.vehicle_info.is_simulated(simulation_vendor),
            closed_ts: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.closed_ts.is_none()
    }

    /// Return a closed copy of this alert.
    ///
    /// An already-closed alert keeps its original `closed_ts`.
    pub fn closed_at(&self, ts: i64) -> Self {
        let mut closed = self.clone();
        if closed.closed_ts.is_none() {
            closed.closed_ts = Some(ts);
        }
        closed
    }
}
