//! Probe normalizer: raw telemetry payload → canonical [`Probe`]

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use super::directory::{AssetDirectory, DirectoryError};
use crate::types::{value_as_f64, Payload, Probe};

/// Why a payload was not turned into a probe. Skips are expected traffic,
/// not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("device type is not the vehicle device type")]
    UnknownDeviceType,
    #[error("missing or non-numeric lat/lng")]
    MissingPosition,
    #[error("missing trip_id")]
    MissingTripId,
}

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("skipped: {0}")]
    Skip(#[from] SkipReason),
    #[error("identity lookup failed: {0}")]
    Lookup(#[from] DirectoryError),
}

/// Converts telemetry from the configured vehicle device type into probes.
///
/// Payload fields: `lat`, `lng`, `trip_id` (required), `matched_lat`,
/// `matched_lng`, `speed`, `heading`, `ts` (epoch millis or RFC 3339), and
/// `props` (copied verbatim).
pub struct ProbeNormalizer {
    vehicle_device_type: String,
    directory: Arc<dyn AssetDirectory>,
}

impl ProbeNormalizer {
    pub fn new(vehicle_device_type: impl Into<String>, directory: Arc<dyn AssetDirectory>) -> Self {
        Self {
            vehicle_device_type: vehicle_device_type.into(),
            directory,
        }
    }

    pub fn vehicle_device_type(&self) -> &str {
        &self.vehicle_device_type
    }

    /// Validate the payload, resolve the device owner, and build a probe.
    ///
    /// Checks run in order (device type, position, trip) and all happen before
    /// the directory is consulted.
    pub async fn normalize(
        &self,
        device_type: &str,
        device_id: &str,
        payload: &Payload,
    ) -> Result<Probe, NormalizeError> {
        if device_type != self.vehicle_device_type {
            return Err(SkipReason::UnknownDeviceType.into());
        }
        let empty = Map::new();
        let fields = payload
            .as_json()
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        let (Some(longitude), Some(latitude)) = (number(fields, "lng"), number(fields, "lat")) else {
            return Err(SkipReason::MissingPosition.into());
        };
        let trip_id = trip_id(fields).ok_or(SkipReason::MissingTripId)?;

        let identity = self.directory.resolve_identity(device_id, device_type).await?;
        debug!(device_id, mo_id = %identity.vehicle_id, "Resolved device identity");

        let props = fields
            .get("props")
            .and_then(Value::as_object)
            .map(|p| p.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        Ok(Probe {
            mo_id: identity.vehicle_id,
            trip_id,
            ts: fields.get("ts").and_then(timestamp_millis),
            latitude,
            longitude,
            matched_latitude: number(fields, "matched_lat"),
            matched_longitude: number(fields, "matched_lng"),
            speed: number(fields, "speed"),
            heading: number(fields, "heading").unwrap_or(0.0),
            driver_id: identity.driver_id,
            props,
        })
    }
}

fn number(fields: &Map<String, Value>, key: &str) -> Option<f64> {
    fields.get(key).and_then(value_as_f64)
}

fn trip_id(fields: &Map<String, Value>) -> Option<String> {
    match fields.get("trip_id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Epoch millis from a number, a numeric string, or an RFC 3339 string.
#[allow(clippy::cast_possible_truncation)]
fn timestamp_millis(value: &Value) -> Option<i64> {
    if let Some(n) = value_as_f64(value) {
        return Some(n as i64);
    }
    let s = value.as_str()?;
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp_millis())
}
