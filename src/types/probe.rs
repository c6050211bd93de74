//! Canonical telemetry sample

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One telemetry sample for a vehicle.
///
/// Built once per inbound device event by the probe normalizer and never
/// mutated afterwards (the pipeline only stamps a missing `ts` before
/// evaluation). Timestamps are epoch milliseconds and are not guaranteed to be
/// monotonic per vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Probe {
    /// Vehicle (moving object) identifier
    pub mo_id: String,
    pub trip_id: String,
    /// Sample time (epoch millis), absent when the device did not send one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    pub latitude: f64,
    pub longitude: f64,
    /// Map-matched position, preferred over the raw position when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default)]
    pub heading: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
    /// Open sensor map, copied verbatim from the device payload
    #[serde(default)]
    pub props: BTreeMap<String, Value>,
}

impl Probe {
    /// Read a sensor value as a number.
    ///
    /// Numeric strings are accepted because devices are inconsistent about
    /// quoting. Returns `None` when the key is absent or not numeric.
    pub fn prop_f64(&self, name: &str) -> Option<f64> {
        self.props.get(name).and_then(value_as_f64)
    }

    /// Position to report for this sample: matched coordinates when both are
    /// present, raw coordinates otherwise.
    pub fn position(&self) -> (f64, f64) {
        match (self.matched_latitude, self.matched_longitude) {
            (Some(lat), Some(lng)) => (lat, lng),
            _ => (self.latitude, self.longitude),
        }
    }

    /// True when `self` is strictly older than `other`.
    ///
    /// Samples without a timestamp are never considered older.
    pub fn is_older_than(&self, other: &Probe) -> bool {
        match (self.ts, other.ts) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        }
    }
}

/// Interpret a JSON scalar as a finite number.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn probe_with_props(props: Value) -> Probe {
        Probe {
            mo_id: "car-1".to_string(),
            trip_id: "trip-1".to_string(),
            ts: Some(1_000),
            latitude: 35.0,
            longitude: 139.0,
            matched_latitude: None,
            matched_longitude: None,
            speed: None,
            heading: 0.0,
            driver_id: None,
            props: serde_json::from_value(props).unwrap(),
        }
    }

    #[test]
    fn test_prop_f64_accepts_numbers_and_numeric_strings() {
        let probe = probe_with_props(json!({"fuel": 12.5, "engineTemp": "98.2", "state": "on"}));
        assert_eq!(probe.prop_f64("fuel"), Some(12.5));
        assert_eq!(probe.prop_f64("engineTemp"), Some(98.2));
        assert_eq!(probe.prop_f64("state"), None);
        assert_eq!(probe.prop_f64("missing"), None);
    }

    #[test]
    fn test_position_prefers_matched() {
        let mut probe = probe_with_props(json!({}));
        assert_eq!(probe.position(), (35.0, 139.0));
        probe.matched_latitude = Some(35.1);
        // Half a matched position is not usable
        assert_eq!(probe.position(), (35.0, 139.0));
        probe.matched_longitude = Some(139.1);
        assert_eq!(probe.position(), (35.1, 139.1));
    }

    #[test]
    fn test_is_older_than_ignores_missing_ts() {
        let a = probe_with_props(json!({}));
        let mut b = a.clone();
        b.ts = Some(2_000);
        assert!(a.is_older_than(&b));
        assert!(!b.is_older_than(&a));
        b.ts = None;
        assert!(!a.is_older_than(&b));
    }
}
